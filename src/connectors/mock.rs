use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::core::{Order, OrderId, OrderSide, OrderStatus, Position};
use crate::error::VenueError;
use crate::traits::{PriceSource, Venue};
use crate::types::{Price, Symbol};

/// Mock error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MockError {
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),
    #[error("Position not found: {0}")]
    PositionNotFound(String),
    #[error("No price for {0}")]
    PriceUnavailable(String),
    #[error("Injected failure: {0}")]
    Injected(&'static str),
}

/// In-memory venue and price feed for tests and dry runs.
///
/// Orders fill immediately at their limit price unless filling is switched
/// off. Filled buys open a venue-side position that is marked at the
/// configured price for its symbol.
#[derive(Debug)]
pub struct MockVenue {
    balance: RwLock<Decimal>,
    prices: RwLock<HashMap<Symbol, Price>>,
    orders: RwLock<HashMap<OrderId, Order>>,
    positions: RwLock<HashMap<Symbol, Position>>,
    fill_orders: AtomicBool,
    fail_submits: AtomicBool,
    fail_balance: AtomicBool,
    failing_closes: AtomicUsize,
    price_outages: RwLock<HashSet<Symbol>>,
    submit_calls: AtomicUsize,
    close_calls: AtomicUsize,
}

impl MockVenue {
    pub fn new(balance: Decimal) -> Self {
        Self {
            balance: RwLock::new(balance),
            prices: RwLock::new(HashMap::new()),
            orders: RwLock::new(HashMap::new()),
            positions: RwLock::new(HashMap::new()),
            fill_orders: AtomicBool::new(true),
            fail_submits: AtomicBool::new(false),
            fail_balance: AtomicBool::new(false),
            failing_closes: AtomicUsize::new(0),
            price_outages: RwLock::new(HashSet::new()),
            submit_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
        }
    }

    pub async fn set_balance(&self, balance: Decimal) {
        *self.balance.write().await = balance;
    }

    pub async fn set_price(&self, symbol: impl Into<Symbol>, price: Price) {
        self.prices.write().await.insert(symbol.into(), price);
    }

    /// Leave submitted orders resting instead of filling them
    pub fn set_fill_orders(&self, fill: bool) {
        self.fill_orders.store(fill, Ordering::SeqCst);
    }

    pub fn set_fail_submits(&self, fail: bool) {
        self.fail_submits.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_balance(&self, fail: bool) {
        self.fail_balance.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `count` close requests
    pub fn fail_next_closes(&self, count: usize) {
        self.failing_closes.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_close(&self) {
        self.fail_next_closes(1);
    }

    /// Make price lookups for `symbol` fail until cleared
    pub async fn set_price_outage(&self, symbol: impl Into<Symbol>, down: bool) {
        let symbol = symbol.into();
        let mut outages = self.price_outages.write().await;
        if down {
            outages.insert(symbol);
        } else {
            outages.remove(&symbol);
        }
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub async fn has_position(&self, symbol: &str) -> bool {
        self.positions.read().await.contains_key(symbol)
    }

    async fn mark(&self, symbol: &Symbol) -> Option<Price> {
        self.prices.read().await.get(symbol).copied()
    }
}

#[async_trait]
impl Venue for MockVenue {
    async fn submit_order(&self, order: &Order) -> Result<Order, VenueError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_submits.load(Ordering::SeqCst) {
            return Err(MockError::Injected("submit").into());
        }

        let mut confirmed = order.clone();
        confirmed.updated_at = Utc::now();
        if self.fill_orders.load(Ordering::SeqCst) {
            confirmed.status = OrderStatus::Filled;

            let notional = confirmed.notional();
            let mut balance = self.balance.write().await;
            match confirmed.side {
                OrderSide::Buy => {
                    *balance -= notional;
                    self.positions
                        .write()
                        .await
                        .insert(confirmed.symbol.clone(), Position::from_fill(&confirmed));
                }
                OrderSide::Sell => *balance += notional,
            }
        }

        debug!("Mock venue accepted order {} as {:?}", confirmed.id, confirmed.status);
        self.orders
            .write()
            .await
            .insert(confirmed.id.clone(), confirmed.clone());
        Ok(confirmed)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), VenueError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| MockError::OrderNotFound(order_id.to_string()))?;
        order.status = OrderStatus::Cancelled;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn get_order(&self, order_id: &str) -> Result<Order, VenueError> {
        self.orders
            .read()
            .await
            .get(order_id)
            .cloned()
            .ok_or_else(|| MockError::OrderNotFound(order_id.to_string()).into())
    }

    async fn get_position(&self, symbol: &Symbol) -> Result<Position, VenueError> {
        let mut position = self
            .positions
            .read()
            .await
            .get(symbol)
            .cloned()
            .ok_or_else(|| MockError::PositionNotFound(symbol.to_string()))?;
        let price = self.mark(symbol).await.unwrap_or(position.entry_price);
        position.update_pnl(price);
        Ok(position)
    }

    async fn get_balance(&self) -> Result<Decimal, VenueError> {
        if self.fail_balance.load(Ordering::SeqCst) {
            return Err(MockError::Injected("balance").into());
        }
        Ok(*self.balance.read().await)
    }

    async fn close_position(&self, position: &Position) -> Result<(), VenueError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .failing_closes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(MockError::Injected("close").into());
        }

        self.positions.write().await.remove(&position.symbol);
        *self.balance.write().await += position.quantity.notional(position.current_price);
        debug!("Mock venue closed {}", position.symbol);
        Ok(())
    }
}

#[async_trait]
impl PriceSource for MockVenue {
    async fn price(&self, symbol: &Symbol) -> Result<Price, VenueError> {
        if self.price_outages.read().await.contains(symbol) {
            return Err(MockError::PriceUnavailable(symbol.to_string()).into());
        }
        self.mark(symbol)
            .await
            .ok_or_else(|| MockError::PriceUnavailable(symbol.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Size;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_filled_buy_moves_balance_and_opens_position() {
        let venue = MockVenue::new(dec!(1000));
        let order = Order::buy("BTCUSDT", Size::new(dec!(2)), Price::new(dec!(100)));

        let confirmed = venue.submit_order(&order).await.unwrap();
        assert_eq!(confirmed.status, OrderStatus::Filled);
        assert_eq!(venue.get_balance().await.unwrap(), dec!(800));

        venue.set_price("BTCUSDT", Price::new(dec!(110))).await;
        let live = venue.get_position(&Symbol::new("BTCUSDT")).await.unwrap();
        assert_eq!(live.pnl, dec!(20));

        venue.close_position(&live).await.unwrap();
        assert_eq!(venue.get_balance().await.unwrap(), dec!(1020));
        assert!(!venue.has_position("BTCUSDT").await);
    }

    #[tokio::test]
    async fn test_resting_orders_can_be_cancelled() {
        let venue = MockVenue::new(dec!(1000));
        venue.set_fill_orders(false);
        let order = Order::buy("BTCUSDT", Size::new(dec!(1)), Price::new(dec!(100)));

        let confirmed = venue.submit_order(&order).await.unwrap();
        assert_eq!(confirmed.status, OrderStatus::New);
        venue.cancel_order(&confirmed.id).await.unwrap();
        assert_eq!(
            venue.get_order(&confirmed.id).await.unwrap().status,
            OrderStatus::Cancelled
        );
        assert!(venue.cancel_order("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let venue = MockVenue::new(dec!(1000));
        venue.set_price("BTCUSDT", Price::new(dec!(100))).await;
        venue.set_price_outage("BTCUSDT", true).await;
        assert!(venue.price(&Symbol::new("BTCUSDT")).await.is_err());
        venue.set_price_outage("BTCUSDT", false).await;
        assert_eq!(
            venue.price(&Symbol::new("BTCUSDT")).await.unwrap(),
            Price::new(dec!(100))
        );

        let position =
            Position::from_fill(&Order::buy("BTCUSDT", Size::new(dec!(1)), Price::new(dec!(100))));
        venue.fail_next_closes(2);
        assert!(venue.close_position(&position).await.is_err());
        assert!(venue.close_position(&position).await.is_err());
        assert!(venue.close_position(&position).await.is_ok());
        assert_eq!(venue.close_calls(), 3);
    }
}
