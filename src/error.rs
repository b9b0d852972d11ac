use rust_decimal::Decimal;
use thiserror::Error;

use crate::config::ConfigError;
use crate::journal::JournalError;

/// Opaque error returned by external collaborators (venue, price feed)
pub type VenueError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the ledger, the health monitor and the strategy registry.
///
/// Validation and admission failures are deterministic and returned as-is;
/// upstream failures carry the operation that was being attempted.
#[derive(Debug, Error)]
pub enum ExecutionError {
    // -- Validation / admission ---------------------------------------------
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("maximum positions reached ({max})")]
    MaxPositionsReached { max: usize },

    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    #[error("position already open for {0}")]
    PositionAlreadyOpen(String),

    // -- Lookup -------------------------------------------------------------
    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("position not found: {0}")]
    PositionNotFound(String),

    #[error("close already in progress for {0}")]
    CloseInProgress(String),

    #[error("unknown strategy type: {0}")]
    UnknownStrategy(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    // -- Upstream -----------------------------------------------------------
    #[error("venue error while {context}: {source}")]
    Venue {
        context: String,
        #[source]
        source: VenueError,
    },

    #[error(transparent)]
    Journal(#[from] JournalError),
}

impl ExecutionError {
    /// Wrap a venue failure with the operation that triggered it
    pub fn venue(context: impl Into<String>, source: VenueError) -> Self {
        ExecutionError::Venue {
            context: context.into(),
            source,
        }
    }

    /// True for failures that may succeed on a caller-driven retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExecutionError::Venue { .. } | ExecutionError::CloseInProgress(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_venue_error_keeps_source() {
        let err = ExecutionError::venue("fetching balance", "connection reset".into());
        assert_eq!(
            err.to_string(),
            "venue error while fetching balance: connection reset"
        );
        assert!(err.source().is_some());
        assert!(err.is_transient());
    }

    #[test]
    fn test_admission_errors_are_not_transient() {
        assert!(!ExecutionError::MaxPositionsReached { max: 5 }.is_transient());
        assert!(!ExecutionError::InvalidOrder("x".into()).is_transient());
    }
}
