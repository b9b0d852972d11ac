use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;
use crate::types::{Price, Size, Symbol};

/// Order identifier, assigned locally and echoed back by the venue
pub type OrderId = String;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

/// Order status
///
/// Only ever advanced after the venue has confirmed the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    Filled,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
    }
}

/// An order as submitted to, and confirmed by, the venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Order ID
    pub id: OrderId,
    /// Symbol
    pub symbol: Symbol,
    /// Order side
    pub side: OrderSide,
    /// Quantity
    pub quantity: Size,
    /// Limit or expected fill price
    pub price: Price,
    /// Stop-loss level computed by the caller's strategy
    pub stop_loss: Option<Price>,
    /// Take-profit level computed by the caller's strategy
    pub take_profit: Option<Price>,
    /// Order status
    pub status: OrderStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a new order with a fresh ID and `New` status
    pub fn new(symbol: impl Into<Symbol>, side: OrderSide, quantity: Size, price: Price) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            side,
            quantity,
            price,
            stop_loss: None,
            take_profit: None,
            status: OrderStatus::New,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a buy order
    pub fn buy(symbol: impl Into<Symbol>, quantity: Size, price: Price) -> Self {
        Self::new(symbol, OrderSide::Buy, quantity, price)
    }

    /// Create a sell order
    pub fn sell(symbol: impl Into<Symbol>, quantity: Size, price: Price) -> Self {
        Self::new(symbol, OrderSide::Sell, quantity, price)
    }

    pub fn with_stop_loss(mut self, stop_loss: Price) -> Self {
        self.stop_loss = Some(stop_loss);
        self
    }

    pub fn with_take_profit(mut self, take_profit: Price) -> Self {
        self.take_profit = Some(take_profit);
        self
    }

    /// Check the order shape before it is admitted
    pub fn validate(&self) -> Result<(), ExecutionError> {
        if self.symbol.is_blank() {
            return Err(ExecutionError::InvalidOrder("symbol is required".into()));
        }
        if !self.quantity.is_positive() {
            return Err(ExecutionError::InvalidOrder(
                "quantity must be positive".into(),
            ));
        }
        if !self.price.is_positive() {
            return Err(ExecutionError::InvalidOrder("price must be positive".into()));
        }
        Ok(())
    }

    /// Quote value required to fill this order (`quantity * price`)
    pub fn notional(&self) -> Decimal {
        self.quantity.notional(self.price)
    }

    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }

    pub(crate) fn set_status(&mut self, status: OrderStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}
