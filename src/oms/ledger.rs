use async_trait::async_trait;
use dashmap::DashSet;
use log::{debug, error, info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::LedgerConfig;
use crate::core::{Order, OrderId, OrderSide, OrderStatus, Position};
use crate::error::ExecutionError;
use crate::journal::{kinds, EventLog, LogEntry};
use crate::traits::{PositionCloser, PositionTracker, Venue};
use crate::types::{Price, Symbol};

/// Journal payload for `order_cancelled`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
}

/// Journal payload for `position_closed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionClosed {
    pub symbol: Symbol,
    pub reason: String,
    pub exit_price: Price,
    pub pnl: Decimal,
    pub pnl_percent: Decimal,
}

#[derive(Debug, Default)]
struct LedgerState {
    orders: HashMap<OrderId, Order>,
    positions: HashMap<Symbol, Position>,
}

impl LedgerState {
    fn apply(&mut self, entry: &LogEntry) -> Result<(), serde_json::Error> {
        match entry.kind.as_str() {
            kinds::ORDER_SUBMITTED => {
                let order: Order = entry.decode()?;
                self.orders.insert(order.id.clone(), order);
            }
            kinds::ORDER_CANCELLED => {
                let cancelled: OrderCancelled = entry.decode()?;
                if let Some(order) = self.orders.get_mut(&cancelled.order_id) {
                    order.status = OrderStatus::Cancelled;
                    order.updated_at = entry.timestamp;
                }
            }
            kinds::POSITION_OPENED => {
                let position: Position = entry.decode()?;
                self.positions.insert(position.symbol.clone(), position);
            }
            kinds::POSITION_CLOSED => {
                let closed: PositionClosed = entry.decode()?;
                self.positions.remove(&closed.symbol);
            }
            other => debug!("Ignoring journal entry type {} during restore", other),
        }
        Ok(())
    }
}

/// Releases a symbol's close slot however the close ends
struct CloseGuard<'a> {
    closing: &'a DashSet<Symbol>,
    symbol: Symbol,
}

impl Drop for CloseGuard<'_> {
    fn drop(&mut self) {
        self.closing.remove(&self.symbol);
    }
}

/// Owns orders and open positions, enforces admission control and keeps
/// local state in step with confirmed venue state.
///
/// Every state change is journalled before it is applied locally; a failed
/// venue call or journal append leaves local state untouched.
pub struct ExecutionLedger {
    config: LedgerConfig,
    venue: Arc<dyn Venue>,
    journal: Arc<EventLog>,
    state: Mutex<LedgerState>,
    /// Serializes cap check, balance query, submission and recording
    admission: Mutex<()>,
    closing: DashSet<Symbol>,
    tracker: OnceLock<Weak<dyn PositionTracker>>,
}

impl ExecutionLedger {
    pub fn new(config: LedgerConfig, venue: Arc<dyn Venue>, journal: Arc<EventLog>) -> Self {
        Self {
            config,
            venue,
            journal,
            state: Mutex::new(LedgerState::default()),
            admission: Mutex::new(()),
            closing: DashSet::new(),
            tracker: OnceLock::new(),
        }
    }

    /// Register the component notified when positions open and close.
    ///
    /// Only the first call has an effect; returns whether it was accepted.
    pub fn attach_tracker<T>(&self, tracker: &Arc<T>) -> bool
    where
        T: PositionTracker + 'static,
    {
        let weak = Arc::downgrade(tracker);
        let weak: Weak<dyn PositionTracker> = weak;
        self.tracker.set(weak).is_ok()
    }

    fn tracker(&self) -> Option<Arc<dyn PositionTracker>> {
        self.tracker.get().and_then(Weak::upgrade)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn journal(&self) -> &Arc<EventLog> {
        &self.journal
    }

    /// Admit and submit an order.
    ///
    /// A buy confirmed as filled opens a position for its symbol, carrying the
    /// caller's stop-loss and take-profit levels.
    pub async fn execute(&self, order: Order) -> Result<Order, ExecutionError> {
        order.validate()?;

        let admission = self.admission.lock().await;

        {
            let state = self.state.lock().await;
            if order.side == OrderSide::Buy && state.positions.contains_key(&order.symbol) {
                return Err(ExecutionError::PositionAlreadyOpen(order.symbol.to_string()));
            }
            if state.positions.len() >= self.config.max_positions {
                return Err(ExecutionError::MaxPositionsReached {
                    max: self.config.max_positions,
                });
            }
        }

        let available = self
            .venue
            .get_balance()
            .await
            .map_err(|e| ExecutionError::venue("fetching balance", e))?;
        let required = order.notional();
        if required > available {
            warn!(
                "Rejecting order {} for {}: requires {} but only {} available",
                order.id, order.symbol, required, available
            );
            return Err(ExecutionError::InsufficientBalance {
                required,
                available,
            });
        }

        let confirmed = self.venue.submit_order(&order).await.map_err(|e| {
            error!("Venue rejected order {} for {}: {}", order.id, order.symbol, e);
            ExecutionError::venue("submitting order", e)
        })?;

        self.journal
            .append(kinds::ORDER_SUBMITTED, &confirmed)
            .await
            .map_err(|e| {
                error!("Failed to journal order {}: {}", confirmed.id, e);
                e
            })?;

        let opened = if confirmed.side == OrderSide::Buy && confirmed.is_filled() {
            let mut position = Position::from_fill(&confirmed);
            position.stop_loss = order.stop_loss;
            position.take_profit = order.take_profit;

            self.journal
                .append(kinds::POSITION_OPENED, &position)
                .await
                .map_err(|e| {
                    error!("Failed to journal position for {}: {}", position.symbol, e);
                    e
                })?;
            Some(position)
        } else {
            None
        };

        {
            let mut state = self.state.lock().await;
            state.orders.insert(confirmed.id.clone(), confirmed.clone());
            if let Some(position) = &opened {
                state
                    .positions
                    .insert(position.symbol.clone(), position.clone());
            }
        }
        drop(admission);

        info!(
            "Order {} {:?} {} {} @ {} -> {:?}",
            confirmed.id,
            confirmed.side,
            confirmed.quantity,
            confirmed.symbol,
            confirmed.price,
            confirmed.status
        );

        if let Some(position) = opened {
            info!(
                "Opened position {} qty {} @ {}",
                position.symbol, position.quantity, position.entry_price
            );
            if let Some(tracker) = self.tracker() {
                tracker.track(position).await;
            }
        }

        Ok(confirmed)
    }

    /// Cancel a known order
    pub async fn cancel(&self, order_id: &str) -> Result<(), ExecutionError> {
        if !self.state.lock().await.orders.contains_key(order_id) {
            return Err(ExecutionError::OrderNotFound(order_id.to_string()));
        }

        self.venue.cancel_order(order_id).await.map_err(|e| {
            error!("Venue failed to cancel order {}: {}", order_id, e);
            ExecutionError::venue("cancelling order", e)
        })?;

        self.journal
            .append(
                kinds::ORDER_CANCELLED,
                &OrderCancelled {
                    order_id: order_id.to_string(),
                },
            )
            .await?;

        if let Some(order) = self.state.lock().await.orders.get_mut(order_id) {
            order.set_status(OrderStatus::Cancelled);
        }
        info!("Cancelled order {}", order_id);
        Ok(())
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Order, ExecutionError> {
        self.state
            .lock()
            .await
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| ExecutionError::OrderNotFound(order_id.to_string()))
    }

    pub async fn get_balance(&self) -> Result<Decimal, ExecutionError> {
        self.venue
            .get_balance()
            .await
            .map_err(|e| ExecutionError::venue("fetching balance", e))
    }

    /// Tracked position for `symbol`, refreshed with the venue's live view
    pub async fn get_position(&self, symbol: &Symbol) -> Result<Position, ExecutionError> {
        let mut position = self
            .state
            .lock()
            .await
            .positions
            .get(symbol)
            .cloned()
            .ok_or_else(|| ExecutionError::PositionNotFound(symbol.to_string()))?;

        let live = self
            .venue
            .get_position(symbol)
            .await
            .map_err(|e| ExecutionError::venue("fetching position", e))?;

        if let Some(tracked) = self.state.lock().await.positions.get_mut(symbol) {
            tracked.refresh_from(&live);
            position = tracked.clone();
        } else {
            position.refresh_from(&live);
        }
        Ok(position)
    }

    /// All tracked positions, refreshed, ordered by symbol
    pub async fn get_positions(&self) -> Result<Vec<Position>, ExecutionError> {
        let mut symbols: Vec<Symbol> = self.state.lock().await.positions.keys().cloned().collect();
        symbols.sort();

        let mut positions = Vec::with_capacity(symbols.len());
        for symbol in &symbols {
            match self.get_position(symbol).await {
                Ok(position) => positions.push(position),
                // closed while we were refreshing
                Err(ExecutionError::PositionNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(positions)
    }

    /// Local view of open positions without a venue refresh, ordered by symbol
    pub async fn positions_snapshot(&self) -> Vec<Position> {
        let mut positions: Vec<Position> =
            self.state.lock().await.positions.values().cloned().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        positions
    }

    pub async fn open_positions_count(&self) -> usize {
        self.state.lock().await.positions.len()
    }

    /// Close a tracked position through the venue.
    ///
    /// The position stays tracked unless the venue confirmed the close and
    /// the closure was journalled.
    pub async fn close_position(
        &self,
        position: &Position,
        reason: &str,
    ) -> Result<(), ExecutionError> {
        let symbol = position.symbol.clone();
        let mut target = self
            .state
            .lock()
            .await
            .positions
            .get(&symbol)
            .cloned()
            .ok_or_else(|| ExecutionError::PositionNotFound(symbol.to_string()))?;

        if !self.closing.insert(symbol.clone()) {
            return Err(ExecutionError::CloseInProgress(symbol.to_string()));
        }
        let _guard = CloseGuard {
            closing: &self.closing,
            symbol: symbol.clone(),
        };

        if position.current_price.is_positive() {
            target.update_pnl(position.current_price);
        }

        self.venue.close_position(&target).await.map_err(|e| {
            error!("Venue failed to close {}: {}", symbol, e);
            ExecutionError::venue("closing position", e)
        })?;

        let closed = PositionClosed {
            symbol: symbol.clone(),
            reason: reason.to_string(),
            exit_price: target.current_price,
            pnl: target.pnl,
            pnl_percent: target.pnl_percent,
        };
        self.journal
            .append(kinds::POSITION_CLOSED, &closed)
            .await
            .map_err(|e| {
                error!("Failed to journal close of {}: {}", symbol, e);
                e
            })?;

        let removed = self.state.lock().await.positions.remove(&symbol);
        info!(
            "Closed position {} @ {} pnl {} ({}%): {}",
            symbol, closed.exit_price, closed.pnl, closed.pnl_percent, reason
        );

        if let (Some(tracker), Some(removed)) = (self.tracker(), removed) {
            tracker.untrack(&removed).await;
        }
        Ok(())
    }

    /// Rebuild orders and open positions from the journal's current segment.
    ///
    /// Replaces local state and re-registers every restored position with the
    /// tracker. Returns the number of open positions.
    pub async fn restore(&self, cancel: &CancellationToken) -> Result<usize, ExecutionError> {
        let mut rebuilt = LedgerState::default();
        let replayed = self
            .journal
            .replay_all(cancel, |entry| rebuilt.apply(&entry).map_err(Into::into))
            .await?;

        let positions: Vec<Position> = rebuilt.positions.values().cloned().collect();
        {
            let mut state = self.state.lock().await;
            *state = rebuilt;
        }

        info!(
            "Restored {} open positions from {} journal entries",
            positions.len(),
            replayed
        );

        if let Some(tracker) = self.tracker() {
            for position in &positions {
                tracker.track(position.clone()).await;
            }
        }
        Ok(positions.len())
    }
}

#[async_trait]
impl PositionCloser for ExecutionLedger {
    async fn close_position(&self, position: &Position, reason: &str) -> Result<(), ExecutionError> {
        ExecutionLedger::close_position(self, position, reason).await
    }
}

impl std::fmt::Debug for ExecutionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionLedger")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::MockVenue;
    use crate::types::Size;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    async fn ledger(balance: Decimal) -> (tempfile::TempDir, Arc<MockVenue>, ExecutionLedger) {
        let dir = tempdir().unwrap();
        let journal = Arc::new(EventLog::create(dir.path()).await.unwrap());
        let venue = Arc::new(MockVenue::new(balance));
        let ledger = ExecutionLedger::new(LedgerConfig::default(), venue.clone(), journal);
        (dir, venue, ledger)
    }

    fn buy(symbol: &str, qty: Decimal, price: Decimal) -> Order {
        Order::buy(symbol, Size::new(qty), Price::new(price))
    }

    #[tokio::test]
    async fn test_filled_buy_opens_position_and_journals() {
        let (_dir, _venue, ledger) = ledger(dec!(10000)).await;
        let order = buy("BTCUSDT", dec!(1), dec!(100)).with_stop_loss(Price::new(dec!(99)));

        let confirmed = ledger.execute(order).await.unwrap();
        assert_eq!(confirmed.status, OrderStatus::Filled);
        assert_eq!(ledger.open_positions_count().await, 1);

        let mut kinds_seen = Vec::new();
        ledger
            .journal()
            .replay_all(&CancellationToken::new(), |entry| {
                kinds_seen.push(entry.kind);
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(kinds_seen, vec![kinds::ORDER_SUBMITTED, kinds::POSITION_OPENED]);
    }

    #[tokio::test]
    async fn test_sell_does_not_open_position() {
        let (_dir, _venue, ledger) = ledger(dec!(10000)).await;
        let order = Order::sell("BTCUSDT", Size::new(dec!(1)), Price::new(dec!(100)));
        ledger.execute(order).await.unwrap();
        assert_eq!(ledger.open_positions_count().await, 0);
    }

    #[tokio::test]
    async fn test_journal_failure_leaves_state_untouched() {
        let (_dir, _venue, ledger) = ledger(dec!(10000)).await;
        ledger.journal().close().await.unwrap();

        let err = ledger
            .execute(buy("BTCUSDT", dec!(1), dec!(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Journal(_)));
        assert_eq!(ledger.open_positions_count().await, 0);
    }

    #[tokio::test]
    async fn test_close_guard_released_after_failure() {
        let (_dir, venue, ledger) = ledger(dec!(10000)).await;
        ledger.execute(buy("BTCUSDT", dec!(1), dec!(100))).await.unwrap();
        let position = ledger
            .get_position(&Symbol::new("BTCUSDT"))
            .await
            .unwrap();

        venue.fail_next_close();
        assert!(ledger.close_position(&position, "test").await.is_err());
        assert_eq!(ledger.open_positions_count().await, 1);

        ledger.close_position(&position, "test").await.unwrap();
        assert_eq!(ledger.open_positions_count().await, 0);
    }

    #[tokio::test]
    async fn test_restore_rebuilds_open_positions() {
        let (_dir, _venue, ledger) = ledger(dec!(10000)).await;
        ledger.execute(buy("BTCUSDT", dec!(1), dec!(100))).await.unwrap();
        ledger.execute(buy("ETHUSDT", dec!(2), dec!(50))).await.unwrap();
        let btc = ledger.get_position(&Symbol::new("BTCUSDT")).await.unwrap();
        ledger.close_position(&btc, "manual").await.unwrap();

        let restored = ExecutionLedger::new(
            LedgerConfig::default(),
            Arc::new(MockVenue::new(dec!(10000))),
            Arc::clone(ledger.journal()),
        );
        let open = restored.restore(&CancellationToken::new()).await.unwrap();
        assert_eq!(open, 1);
        assert_eq!(restored.open_positions_count().await, 1);
        assert!(restored
            .state
            .lock()
            .await
            .positions
            .contains_key("ETHUSDT"));
    }
}
