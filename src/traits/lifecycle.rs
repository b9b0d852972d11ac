use async_trait::async_trait;

use crate::core::Position;
use crate::error::ExecutionError;

/// Closes positions on behalf of the health monitor.
///
/// Implemented by the execution ledger.
#[async_trait]
pub trait PositionCloser: Send + Sync {
    async fn close_position(&self, position: &Position, reason: &str)
        -> Result<(), ExecutionError>;
}

/// Receives position lifecycle notifications from the ledger.
///
/// Implemented by the health monitor. Both calls are idempotent. A position
/// is identified by its symbol and open time, so a late `untrack` for a
/// closed position never drops a newer position on the same symbol.
#[async_trait]
pub trait PositionTracker: Send + Sync {
    /// Start watching a freshly opened position
    async fn track(&self, position: Position);

    /// Stop watching a position that has been closed
    async fn untrack(&self, position: &Position);
}
