use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::MonitorConfig;
use crate::core::Position;
use crate::error::ExecutionError;
use crate::traits::{PositionCloser, PositionTracker, PriceSource};
use crate::types::Symbol;

/// Checks a position must accumulate before it can be auto-closed
pub const MIN_CHECKS_BEFORE_CLOSE: u64 = 3;

const INITIAL_HEALTH: u8 = 50;
const INITIAL_REASON: &str = "Initial check pending";

/// Health band of a tracked position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn from_score(score: u8) -> Self {
        match score {
            60.. => HealthStatus::Healthy,
            35..=59 => HealthStatus::Degraded,
            _ => HealthStatus::Unhealthy,
        }
    }
}

/// Score a position from its unrealized P&L percent.
///
/// Thresholds are strict and the first match wins, so exactly +5% scores 70.
pub fn score_health(pnl_percent: Decimal) -> (u8, &'static str) {
    if pnl_percent > dec!(5) {
        (85, "Strong profit momentum")
    } else if pnl_percent > dec!(2) {
        (70, "Healthy profit")
    } else if pnl_percent > Decimal::ZERO {
        (60, "Slight profit")
    } else if pnl_percent > dec!(-2) {
        (50, "Small loss - holding")
    } else if pnl_percent > dec!(-5) {
        (35, "Significant loss - monitor closely")
    } else if pnl_percent > dec!(-10) {
        (20, "Large loss - consider exit")
    } else {
        (10, "Critical loss - exit recommended")
    }
}

/// A position under watch, with its latest health assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedPosition {
    pub position: Position,
    pub last_check: Option<DateTime<Utc>>,
    pub health: u8,
    pub reason: String,
    /// Completed checks; never decreases
    pub checks: u64,
}

impl TrackedPosition {
    fn new(position: Position) -> Self {
        Self {
            position,
            last_check: None,
            health: INITIAL_HEALTH,
            reason: INITIAL_REASON.to_string(),
            checks: 0,
        }
    }

    pub fn status(&self) -> HealthStatus {
        HealthStatus::from_score(self.health)
    }
}

struct Sweeper {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodically re-scores tracked positions and, when enabled, closes the
/// ones that stay unhealthy.
///
/// The position map lock is never held across a price lookup or a close.
pub struct HealthMonitor {
    config: MonitorConfig,
    prices: Arc<dyn PriceSource>,
    closer: Arc<dyn PositionCloser>,
    positions: RwLock<HashMap<Symbol, TrackedPosition>>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl HealthMonitor {
    pub fn new(
        config: MonitorConfig,
        prices: Arc<dyn PriceSource>,
        closer: Arc<dyn PositionCloser>,
    ) -> Self {
        Self {
            config,
            prices,
            closer,
            positions: RwLock::new(HashMap::new()),
            sweeper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Spawn the sweep loop. Returns `false` if it is already running or
    /// `shutdown` has already fired.
    ///
    /// The loop ends on `stop` or when `shutdown` is cancelled. The first
    /// sweep happens one interval after start.
    pub async fn start(self: &Arc<Self>, shutdown: &CancellationToken) -> bool {
        if shutdown.is_cancelled() {
            warn!("Health monitor not started: shutdown already requested");
            return false;
        }
        let mut sweeper = self.sweeper.lock().await;
        if sweeper.as_ref().is_some_and(|s| !s.handle.is_finished()) {
            return false;
        }

        let token = shutdown.child_token();
        let period = self.config.check_interval;
        let monitor = Arc::downgrade(self);
        let loop_token = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(monitor) = Weak::upgrade(&monitor) else {
                            break;
                        };
                        monitor.check_all().await;
                    }
                }
            }
            debug!("Health monitor loop exited");
        });

        *sweeper = Some(Sweeper { token, handle });
        info!(
            "Health monitor started (interval {:?}, threshold {}, auto-close {})",
            period, self.config.health_threshold, self.config.auto_close
        );
        true
    }

    /// Stop the sweep loop and wait for it to exit. Returns `false` if it was
    /// not running.
    pub async fn stop(&self) -> bool {
        let Some(sweeper) = self.sweeper.lock().await.take() else {
            return false;
        };
        let was_running = !sweeper.handle.is_finished();
        sweeper.token.cancel();
        if let Err(e) = sweeper.handle.await {
            warn!("Health monitor loop ended abnormally: {}", e);
        }
        info!("Health monitor stopped");
        was_running
    }

    pub async fn is_running(&self) -> bool {
        self.sweeper
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }

    /// Start tracking a position.
    ///
    /// Re-adding the position already tracked is a no-op. A newer position on
    /// a tracked symbol replaces the stale entry and starts from scratch.
    pub async fn add_position(&self, position: Position) {
        let mut positions = self.positions.write().await;
        let symbol = position.symbol.clone();
        if let Some(tracked) = positions.get(&symbol) {
            if tracked.position.is_same_position(&position) {
                return;
            }
            debug!("Replacing stale health entry for {}", symbol);
        }
        positions.insert(symbol.clone(), TrackedPosition::new(position));
        info!("Tracking {} ({} positions)", symbol, positions.len());
    }

    /// Stop tracking `position`, leaving any newer position on its symbol alone
    async fn remove_if_same(&self, position: &Position) {
        let mut positions = self.positions.write().await;
        let same = positions
            .get(&position.symbol)
            .is_some_and(|tracked| tracked.position.is_same_position(position));
        if same {
            positions.remove(&position.symbol);
            info!("Stopped tracking {}", position.symbol);
        }
    }

    pub async fn remove_position(&self, symbol: &Symbol) {
        if self.positions.write().await.remove(symbol).is_some() {
            info!("Stopped tracking {}", symbol);
        }
    }

    pub async fn get_health(&self, symbol: &Symbol) -> Result<TrackedPosition, ExecutionError> {
        self.positions
            .read()
            .await
            .get(symbol)
            .cloned()
            .ok_or_else(|| ExecutionError::PositionNotFound(symbol.to_string()))
    }

    /// Every tracked position, ordered by symbol
    pub async fn get_all_health(&self) -> Vec<TrackedPosition> {
        let mut all: Vec<_> = self.positions.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.position.symbol.cmp(&b.position.symbol));
        all
    }

    pub async fn positions_count(&self) -> usize {
        self.positions.read().await.len()
    }

    /// One sequential sweep over all tracked positions.
    ///
    /// Returns how many positions were scored. A position whose price cannot
    /// be fetched is skipped and its check counter is left alone.
    pub async fn check_all(&self) -> usize {
        let snapshot: Vec<Position> = self
            .positions
            .read()
            .await
            .values()
            .map(|t| t.position.clone())
            .collect();

        let mut scored = 0;
        for position in snapshot {
            if self.check_position(position).await {
                scored += 1;
            }
        }
        debug!("Health sweep scored {} positions", scored);
        scored
    }

    async fn check_position(&self, mut position: Position) -> bool {
        let symbol = position.symbol.clone();
        let price = match self.prices.price(&symbol).await {
            Ok(price) => price,
            Err(e) => {
                warn!("Skipping health check for {}: {}", symbol, e);
                return false;
            }
        };

        position.update_pnl(price);
        let (health, reason) = score_health(position.pnl_percent);

        let checks = {
            let mut positions = self.positions.write().await;
            let Some(tracked) = positions
                .get_mut(&symbol)
                .filter(|tracked| tracked.position.is_same_position(&position))
            else {
                // closed or replaced while the price was in flight
                return false;
            };
            tracked.position = position.clone();
            tracked.health = health;
            tracked.reason = reason.to_string();
            tracked.last_check = Some(Utc::now());
            tracked.checks += 1;
            tracked.checks
        };

        debug!(
            "{} @ {} pnl {}% -> health {} ({}), check #{}",
            symbol, price, position.pnl_percent, health, reason, checks
        );

        if self.config.auto_close
            && health < self.config.health_threshold
            && checks >= MIN_CHECKS_BEFORE_CLOSE
        {
            self.auto_close(&position, health, reason).await;
        }
        true
    }

    async fn auto_close(&self, position: &Position, health: u8, reason: &str) {
        let symbol = &position.symbol;
        let close_reason = format!("Auto-close: health {} ({})", health, reason);
        // the ledger untracks the position itself once the close is confirmed
        match self.closer.close_position(position, &close_reason).await {
            Ok(()) => {
                info!("Auto-closed {}: {}", symbol, close_reason);
            }
            Err(e) => {
                warn!("Auto-close of {} failed, retrying next sweep: {}", symbol, e);
            }
        }
    }
}

#[async_trait]
impl PositionTracker for HealthMonitor {
    async fn track(&self, position: Position) {
        self.add_position(position).await;
    }

    async fn untrack(&self, position: &Position) {
        self.remove_if_same(position).await;
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("config", &self.config)
            .finish()
    }
}
