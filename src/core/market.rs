use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Price, Symbol};

/// Point-in-time market view handed to strategies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: Symbol,
    pub price: Price,
    pub high_24h: Price,
    pub low_24h: Price,
    pub volume_24h: Decimal,
    /// Realized volatility, in percent
    pub volatility: Decimal,
    pub rsi: Decimal,
    pub ema_fast: Decimal,
    pub ema_slow: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Snapshot with only a price; indicators are neutral
    pub fn at_price(symbol: impl Into<Symbol>, price: Price) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            high_24h: price,
            low_24h: price,
            volume_24h: Decimal::ZERO,
            volatility: Decimal::ZERO,
            rsi: Decimal::from(50),
            ema_fast: price.value(),
            ema_slow: price.value(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_uptrend(&self) -> bool {
        self.ema_fast > self.ema_slow
    }
}
