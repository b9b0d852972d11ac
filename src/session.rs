use log::{debug, info};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::CoreConfig;
use crate::core::{MarketSnapshot, Order, Position};
use crate::error::ExecutionError;
use crate::journal::EventLog;
use crate::monitoring::HealthMonitor;
use crate::oms::ExecutionLedger;
use crate::strategies::StrategyRegistry;
use crate::traits::{PriceSource, StrategyKind, Venue};

/// One trading session: the journal, the ledger writing to it, the health
/// monitor watching the ledger's positions, and the strategies driving entries.
pub struct TradingSession {
    config: CoreConfig,
    journal: Arc<EventLog>,
    ledger: Arc<ExecutionLedger>,
    monitor: Arc<HealthMonitor>,
    strategies: StrategyRegistry,
    shutdown: CancellationToken,
}

impl TradingSession {
    /// Wire up a session against `venue`.
    ///
    /// With `journal.resume` set, the newest segment in the journal directory
    /// is reopened and the ledger state rebuilt from it.
    pub async fn open(
        config: CoreConfig,
        venue: Arc<dyn Venue>,
        prices: Arc<dyn PriceSource>,
    ) -> Result<Self, ExecutionError> {
        config.validate()?;

        let existing = if config.journal.resume {
            EventLog::latest_segment(&config.journal.dir).await?
        } else {
            None
        };
        let journal = match &existing {
            Some(path) => EventLog::resume(path).await?,
            None => EventLog::create(&config.journal.dir).await?,
        };
        let journal = Arc::new(journal);

        let ledger = Arc::new(ExecutionLedger::new(
            config.ledger.clone(),
            venue,
            Arc::clone(&journal),
        ));
        let monitor = Arc::new(HealthMonitor::new(
            config.monitor.clone(),
            prices,
            ledger.clone(),
        ));
        ledger.attach_tracker(&monitor);

        let shutdown = CancellationToken::new();
        if existing.is_some() {
            let restored = ledger.restore(&shutdown).await?;
            info!("Session resumed with {} open positions", restored);
        }

        Ok(Self {
            config,
            journal,
            ledger,
            monitor,
            strategies: StrategyRegistry::with_builtin(),
            shutdown,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn journal(&self) -> &Arc<EventLog> {
        &self.journal
    }

    pub fn ledger(&self) -> &Arc<ExecutionLedger> {
        &self.ledger
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    /// Token cancelled on shutdown; hand it to anything that should stop with the session
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Start background monitoring
    pub async fn start(&self) -> bool {
        self.monitor.start(&self.shutdown).await
    }

    /// Stop monitoring and close the journal
    pub async fn shutdown(&self) -> Result<(), ExecutionError> {
        self.shutdown.cancel();
        self.monitor.stop().await;
        self.journal.close().await?;
        info!("Trading session shut down");
        Ok(())
    }

    /// Run one entry decision for the active strategy of `kind`.
    ///
    /// Returns the confirmed order, or `None` if the strategy passed or the
    /// balance supports no size.
    pub async fn enter(
        &self,
        kind: StrategyKind,
        market: &MarketSnapshot,
    ) -> Result<Option<Order>, ExecutionError> {
        let strategy = self
            .strategies
            .get(kind)
            .await
            .ok_or_else(|| ExecutionError::UnknownStrategy(kind.to_string()))?;

        let decision = strategy.should_enter(market);
        if !decision.act {
            debug!("{} passed on {}: {}", strategy.name(), market.symbol, decision.reason);
            return Ok(None);
        }

        let balance = self.ledger.get_balance().await?;
        let size = strategy.position_size(market, balance);
        if size.is_zero() {
            info!(
                "{} wanted {} but balance {} supports no size",
                strategy.name(),
                market.symbol,
                balance
            );
            return Ok(None);
        }

        let order = Order::buy(market.symbol.clone(), size, market.price)
            .with_stop_loss(strategy.stop_loss(market.price, market))
            .with_take_profit(strategy.take_profit(market.price, market));
        info!(
            "{} entering {} ({}): {} @ {}",
            strategy.name(),
            market.symbol,
            decision.reason,
            size,
            market.price
        );

        let confirmed = self.ledger.execute(order).await?;
        if confirmed.is_filled() {
            strategy.on_order_fill(&confirmed, &Position::from_fill(&confirmed));
        }
        Ok(Some(confirmed))
    }

    /// Ask the active strategy of `kind` whether the open position in
    /// `market.symbol` should be exited, and close it if so.
    ///
    /// Returns whether the position was closed.
    pub async fn review(
        &self,
        kind: StrategyKind,
        market: &MarketSnapshot,
    ) -> Result<bool, ExecutionError> {
        let strategy = self
            .strategies
            .get(kind)
            .await
            .ok_or_else(|| ExecutionError::UnknownStrategy(kind.to_string()))?;

        let mut position = self.ledger.get_position(&market.symbol).await?;
        position.update_pnl(market.price);
        strategy.on_tick(&position, market);

        let decision = strategy.should_exit(&position, market);
        if !decision.act {
            return Ok(false);
        }

        self.ledger.close_position(&position, &decision.reason).await?;
        strategy.on_position_close(&position, &decision.reason);
        Ok(true)
    }
}

impl std::fmt::Debug for TradingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingSession")
            .field("config", &self.config)
            .field("strategies", &self.strategies)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JournalConfig, StrategyConfig};
    use crate::connectors::MockVenue;
    use crate::types::Price;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    async fn session(dir: &std::path::Path, resume: bool) -> (Arc<MockVenue>, TradingSession) {
        let venue = Arc::new(MockVenue::new(dec!(10000)));
        let config = CoreConfig {
            journal: JournalConfig {
                dir: dir.to_path_buf(),
                resume,
            },
            ..CoreConfig::default()
        };
        let session = TradingSession::open(config, venue.clone(), venue.clone())
            .await
            .unwrap();
        (venue, session)
    }

    fn bullish(symbol: &str, price: Decimal) -> MarketSnapshot {
        let mut market = MarketSnapshot::at_price(symbol, Price::new(price));
        market.rsi = dec!(55);
        market.ema_fast = price * dec!(1.02);
        market.ema_slow = price;
        market
    }

    #[tokio::test]
    async fn test_enter_requires_active_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let (_venue, session) = session(dir.path(), false).await;
        let err = session
            .enter(StrategyKind::Scalper, &bullish("BTCUSDT", dec!(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::UnknownStrategy(_)));
    }

    #[tokio::test]
    async fn test_enter_opens_tracked_position_with_levels() {
        let dir = tempfile::tempdir().unwrap();
        let (_venue, session) = session(dir.path(), false).await;
        session
            .strategies()
            .create(StrategyConfig::new(StrategyKind::Scalper))
            .await
            .unwrap();

        let order = session
            .enter(StrategyKind::Scalper, &bullish("BTCUSDT", dec!(100)))
            .await
            .unwrap()
            .unwrap();
        assert!(order.is_filled());
        assert_eq!(order.stop_loss, Some(Price::new(dec!(99.5))));
        assert_eq!(order.take_profit, Some(Price::new(dec!(101.5))));
        assert_eq!(session.monitor().positions_count().await, 1);

        let mut flat = MarketSnapshot::at_price("ETHUSDT", Price::new(dec!(100)));
        flat.rsi = dec!(90);
        assert!(session
            .enter(StrategyKind::Scalper, &flat)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_review_closes_on_stop() {
        let dir = tempfile::tempdir().unwrap();
        let (venue, session) = session(dir.path(), false).await;
        session
            .strategies()
            .create(StrategyConfig::new(StrategyKind::Scalper))
            .await
            .unwrap();
        session
            .enter(StrategyKind::Scalper, &bullish("BTCUSDT", dec!(100)))
            .await
            .unwrap();

        venue.set_price("BTCUSDT", Price::new(dec!(99))).await;
        let closed = session
            .review(StrategyKind::Scalper, &bullish("BTCUSDT", dec!(99)))
            .await
            .unwrap();
        assert!(closed);
        assert_eq!(session.ledger().open_positions_count().await, 0);
        assert_eq!(session.monitor().positions_count().await, 0);
    }

    #[tokio::test]
    async fn test_resume_restores_positions() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (_venue, session) = session(dir.path(), false).await;
            session
                .strategies()
                .create(StrategyConfig::new(StrategyKind::Scalper))
                .await
                .unwrap();
            session
                .enter(StrategyKind::Scalper, &bullish("BTCUSDT", dec!(100)))
                .await
                .unwrap();
            session.shutdown().await.unwrap();
        }

        let (_venue, session) = session(dir.path(), true).await;
        assert_eq!(session.ledger().open_positions_count().await, 1);
        assert_eq!(session.monitor().positions_count().await, 1);
        assert_eq!(session.journal().sequence().await, 2);
    }
}
