pub mod ledger;

pub use ledger::{ExecutionLedger, OrderCancelled, PositionClosed};
