use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Entry type tags written by the ledger
pub mod kinds {
    pub const ORDER_SUBMITTED: &str = "order_submitted";
    pub const ORDER_CANCELLED: &str = "order_cancelled";
    pub const POSITION_OPENED: &str = "position_opened";
    pub const POSITION_CLOSED: &str = "position_closed";
}

/// One durable record in a journal segment.
///
/// Serialized as a single JSON line: `{"seq":1,"type":"...","ts":"...","data":{...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in the segment's total order, starting at 1
    #[serde(rename = "seq")]
    pub sequence: u64,
    /// Type tag
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    /// Opaque payload, decoded by whoever understands `kind`
    #[serde(rename = "data")]
    pub payload: serde_json::Value,
}

impl LogEntry {
    /// Decode the payload into a concrete type
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

/// Observability snapshot of the active segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStats {
    pub segment: PathBuf,
    pub size_bytes: u64,
    /// Last sequence number assigned
    pub sequence: u64,
}
