use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::core::{Order, Position};
use crate::error::VenueError;
use crate::types::{Price, Symbol};

/// Trait for the trading venue the ledger executes against.
///
/// A failed call means no state change happened on the venue side.
#[async_trait]
pub trait Venue: Send + Sync {
    /// Submit an order and return the venue's view of it
    async fn submit_order(&self, order: &Order) -> Result<Order, VenueError>;

    /// Cancel an existing order
    async fn cancel_order(&self, order_id: &str) -> Result<(), VenueError>;

    /// Get the venue's view of an order
    async fn get_order(&self, order_id: &str) -> Result<Order, VenueError>;

    /// Get the live position snapshot for a symbol
    async fn get_position(&self, symbol: &Symbol) -> Result<Position, VenueError>;

    /// Get the available quote balance
    async fn get_balance(&self) -> Result<Decimal, VenueError>;

    /// Flatten an open position
    async fn close_position(&self, position: &Position) -> Result<(), VenueError>;
}

/// Trait for last-price lookups used by the health monitor
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn price(&self, symbol: &Symbol) -> Result<Price, VenueError>;
}
