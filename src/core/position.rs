use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::order::{Order, OrderSide};
use crate::types::{Price, Size, Symbol};

/// An open position, keyed by symbol in the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub side: OrderSide,
    pub quantity: Size,
    pub entry_price: Price,
    pub current_price: Price,
    /// Unrealized P&L in quote currency
    pub pnl: Decimal,
    /// Unrealized P&L relative to entry, in percent
    pub pnl_percent: Decimal,
    pub stop_loss: Option<Price>,
    pub take_profit: Option<Price>,
    pub trailing_stop: Option<Price>,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Build a position from a venue-confirmed fill
    pub fn from_fill(order: &Order) -> Self {
        Self {
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            entry_price: order.price,
            current_price: order.price,
            pnl: Decimal::ZERO,
            pnl_percent: Decimal::ZERO,
            stop_loss: order.stop_loss,
            take_profit: order.take_profit,
            trailing_stop: None,
            opened_at: order.created_at,
            updated_at: order.updated_at,
        }
    }

    /// Re-mark the position at `price` and recompute P&L
    pub fn update_pnl(&mut self, price: Price) {
        self.current_price = price;
        self.updated_at = Utc::now();

        let move_pct = price.percent_from(self.entry_price);
        let move_abs = (price - self.entry_price).value() * self.quantity.value();

        match self.side {
            OrderSide::Buy => {
                self.pnl = move_abs;
                self.pnl_percent = move_pct;
            }
            OrderSide::Sell => {
                self.pnl = -move_abs;
                self.pnl_percent = -move_pct;
            }
        }
    }

    /// Copy live mark and P&L from a venue snapshot of the same position
    pub fn refresh_from(&mut self, live: &Position) {
        self.update_pnl(live.current_price);
    }

    /// Whether `other` is the same opening of this symbol, not a later one
    pub fn is_same_position(&self, other: &Position) -> bool {
        self.symbol == other.symbol && self.opened_at == other.opened_at
    }

    /// Entry value of the position in quote currency
    pub fn notional(&self) -> Decimal {
        self.quantity.notional(self.entry_price)
    }
}
