use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::config::{ConfigError, StrategyConfig};
use crate::core::{MarketSnapshot, Order, Position};
use crate::types::{Price, Size};

/// Strategy family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Scalper,
    Momentum,
    Swing,
    Grid,
    AiAutomated,
    Custom,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Scalper => "scalper",
            StrategyKind::Momentum => "momentum",
            StrategyKind::Swing => "swing",
            StrategyKind::Grid => "grid",
            StrategyKind::AiAutomated => "ai_automated",
            StrategyKind::Custom => "custom",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scalper" => Ok(StrategyKind::Scalper),
            "momentum" => Ok(StrategyKind::Momentum),
            "swing" => Ok(StrategyKind::Swing),
            "grid" => Ok(StrategyKind::Grid),
            "ai_automated" => Ok(StrategyKind::AiAutomated),
            "custom" => Ok(StrategyKind::Custom),
            other => Err(format!("unknown strategy type: {other}")),
        }
    }
}

/// Yes/no answer from a strategy, with the reason it gave
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub act: bool,
    pub reason: String,
}

impl Decision {
    pub fn act(reason: impl Into<String>) -> Self {
        Self {
            act: true,
            reason: reason.into(),
        }
    }

    pub fn hold(reason: impl Into<String>) -> Self {
        Self {
            act: false,
            reason: reason.into(),
        }
    }
}

/// Main strategy trait
///
/// Implementations are stateless: every method is a pure function of the
/// session configuration, the market snapshot and (where given) the position.
pub trait Strategy: Send + Sync + fmt::Debug {
    fn kind(&self) -> StrategyKind;

    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Configuration the strategy was created with
    fn config(&self) -> &StrategyConfig;

    fn validate(&self) -> Result<(), ConfigError> {
        self.config().validate()
    }

    /// Decide whether to open a position
    fn should_enter(&self, market: &MarketSnapshot) -> Decision;

    /// Decide whether to close an open position
    fn should_exit(&self, position: &Position, market: &MarketSnapshot) -> Decision;

    /// Quantity to buy given the available quote balance
    fn position_size(&self, market: &MarketSnapshot, balance: Decimal) -> Size;

    fn stop_loss(&self, entry: Price, market: &MarketSnapshot) -> Price;

    fn take_profit(&self, entry: Price, market: &MarketSnapshot) -> Price;

    fn trailing_stop(&self, position: &Position, market: &MarketSnapshot) -> Price;

    fn on_tick(&self, _position: &Position, _market: &MarketSnapshot) {}

    fn on_order_fill(&self, _order: &Order, _position: &Position) {}

    fn on_position_close(&self, _position: &Position, _reason: &str) {}

    /// Effective parameters, for display and audit
    fn parameters(&self) -> BTreeMap<String, Decimal>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in [
            StrategyKind::Scalper,
            StrategyKind::Momentum,
            StrategyKind::AiAutomated,
        ] {
            assert_eq!(kind.as_str().parse::<StrategyKind>(), Ok(kind));
        }
        assert!("martingale".parse::<StrategyKind>().is_err());
        assert_eq!(
            serde_json::to_string(&StrategyKind::AiAutomated).unwrap(),
            "\"ai_automated\""
        );
    }

    #[test]
    fn test_decision_constructors() {
        assert!(Decision::act("go").act);
        assert!(!Decision::hold("wait").act);
        assert_eq!(Decision::hold("wait").reason, "wait");
    }
}
