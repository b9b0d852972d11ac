//! Runtime configuration
//!
//! Every section has a `Default` matching the production deployment and a
//! `from_env()` constructor that overrides individual fields from the
//! environment. Unparseable values fall back to the default.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::traits::StrategyKind;

/// Invalid configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Execution ledger settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Open positions allowed at admission time
    pub max_positions: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { max_positions: 5 }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_positions: env_parse("LEDGER_MAX_POSITIONS", default.max_positions),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_positions == 0 {
            return Err(ConfigError::invalid("max_positions", "must be at least 1"));
        }
        Ok(())
    }
}

/// Health monitor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Time between sweeps
    pub check_interval: Duration,
    /// Positions scoring below this are eligible for auto-close
    pub health_threshold: u8,
    pub auto_close: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            health_threshold: 45,
            auto_close: false,
        }
    }
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            check_interval: Duration::from_secs(env_parse(
                "MONITOR_CHECK_INTERVAL_SECS",
                default.check_interval.as_secs(),
            )),
            health_threshold: env_parse("MONITOR_HEALTH_THRESHOLD", default.health_threshold),
            auto_close: env_parse("MONITOR_AUTO_CLOSE", default.auto_close),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.check_interval.is_zero() {
            return Err(ConfigError::invalid("check_interval", "must be non-zero"));
        }
        if self.health_threshold > 100 {
            return Err(ConfigError::invalid(
                "health_threshold",
                format!("{} is outside 0..=100", self.health_threshold),
            ));
        }
        Ok(())
    }
}

/// Event log settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Directory holding `wal_*.log` segments
    pub dir: PathBuf,
    /// Reopen the newest existing segment instead of starting a fresh one
    pub resume: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/wal"),
            resume: false,
        }
    }
}

impl JournalConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            dir: std::env::var("JOURNAL_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.dir),
            resume: env_parse("JOURNAL_RESUME", default.resume),
        }
    }
}

/// Top-level configuration for a trading session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    pub ledger: LedgerConfig,
    pub monitor: MonitorConfig,
    pub journal: JournalConfig,
}

impl CoreConfig {
    pub fn from_env() -> Self {
        Self {
            ledger: LedgerConfig::from_env(),
            monitor: MonitorConfig::from_env(),
            journal: JournalConfig::from_env(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ledger.validate()?;
        self.monitor.validate()
    }
}

/// Per-strategy risk parameters. Percentages are fractions (0.005 = 0.5%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Upper bound on a single position's quantity (zero = unbounded)
    pub max_position_size: Decimal,
    /// Upper bound on a single order's notional (zero = unbounded)
    pub max_order_value: Decimal,
    pub stop_loss_percent: Decimal,
    pub take_profit_percent: Decimal,
    /// Zero lets the strategy pick its own trailing distance
    pub trailing_stop_percent: Decimal,
    pub max_leverage: Decimal,
    /// Fraction of balance put at risk per trade
    pub risk_per_trade: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_size: Decimal::ZERO,
            max_order_value: Decimal::ZERO,
            stop_loss_percent: dec!(0.005),
            take_profit_percent: dec!(0.015),
            trailing_stop_percent: Decimal::ZERO,
            max_leverage: Decimal::ONE,
            risk_per_trade: dec!(0.01),
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fractions = [
            ("stop_loss_percent", self.stop_loss_percent),
            ("take_profit_percent", self.take_profit_percent),
            ("risk_per_trade", self.risk_per_trade),
        ];
        for (field, value) in fractions {
            if value <= Decimal::ZERO || value >= Decimal::ONE {
                return Err(ConfigError::invalid(
                    field,
                    format!("{value} must be between 0 and 1"),
                ));
            }
        }
        if self.trailing_stop_percent < Decimal::ZERO || self.trailing_stop_percent >= Decimal::ONE
        {
            return Err(ConfigError::invalid(
                "trailing_stop_percent",
                format!("{} must be in [0, 1)", self.trailing_stop_percent),
            ));
        }
        if self.max_position_size < Decimal::ZERO || self.max_order_value < Decimal::ZERO {
            return Err(ConfigError::invalid("limits", "must not be negative"));
        }
        Ok(())
    }
}

/// Configuration a strategy is instantiated with; fixed for the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(rename = "type")]
    pub kind: StrategyKind,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Free-form numeric tuning knobs
    #[serde(default)]
    pub parameters: BTreeMap<String, Decimal>,
    #[serde(default, rename = "risk_parameters")]
    pub risk: RiskConfig,
    #[serde(default)]
    pub timeframes: Vec<String>,
    #[serde(default)]
    pub max_positions: usize,
    #[serde(default)]
    pub max_drawdown: Decimal,
    #[serde(default)]
    pub daily_loss_limit: Decimal,
}

fn enabled_by_default() -> bool {
    true
}

impl StrategyConfig {
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            kind,
            name: kind.to_string(),
            version: String::new(),
            enabled: true,
            parameters: BTreeMap::new(),
            risk: RiskConfig::default(),
            timeframes: Vec::new(),
            max_positions: 0,
            max_drawdown: Decimal::ZERO,
            daily_loss_limit: Decimal::ZERO,
        }
    }

    pub fn with_risk(mut self, risk: RiskConfig) -> Self {
        self.risk = risk;
        self
    }

    pub fn parameter(&self, key: &str) -> Option<Decimal> {
        self.parameters.get(key).copied()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.risk.validate()
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
