//! Durable write-ahead event log

pub mod entry;
pub mod event_log;

pub use entry::{kinds, LogEntry, LogStats};
pub use event_log::{EventLog, HandlerError, JournalError};
