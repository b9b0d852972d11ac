use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use tracing::info;

use crate::config::StrategyConfig;
use crate::core::{MarketSnapshot, Position};
use crate::strategies::{risk_sized, trailing_level};
use crate::traits::{Decision, Strategy, StrategyKind};
use crate::types::{Price, Size};

const DEFAULT_TRAILING: Decimal = dec!(0.005);
/// Momentum trades sit behind a wider stop than the configured one
const STOP_MULTIPLIER: Decimal = dec!(1.5);
const TARGET_MULTIPLIER: Decimal = dec!(2);

/// Trend-following strategy: rides strong EMA separation, exits on a 3%
/// gain, a 1.5% loss, extreme RSI or a trend reversal.
#[derive(Debug, Clone)]
pub struct MomentumStrategy {
    config: StrategyConfig,
}

impl MomentumStrategy {
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    fn stop_percent(&self) -> Decimal {
        self.config.risk.stop_loss_percent * STOP_MULTIPLIER
    }

    fn target_percent(&self) -> Decimal {
        self.config.risk.take_profit_percent * TARGET_MULTIPLIER
    }

    fn trailing_percent(&self) -> Decimal {
        if self.config.risk.trailing_stop_percent > Decimal::ZERO {
            self.config.risk.trailing_stop_percent
        } else {
            DEFAULT_TRAILING
        }
    }
}

impl Strategy for MomentumStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Momentum
    }

    fn name(&self) -> &str {
        "momentum_strategy"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn config(&self) -> &StrategyConfig {
        &self.config
    }

    fn should_enter(&self, market: &MarketSnapshot) -> Decision {
        if market.rsi > dec!(50)
            && market.rsi < dec!(80)
            && market.ema_fast > market.ema_slow * dec!(1.01)
        {
            return Decision::act("Strong bullish momentum");
        }
        if market.rsi > dec!(70) {
            return Decision::act("Overbought but strong momentum");
        }
        Decision::hold("No momentum signal")
    }

    fn should_exit(&self, position: &Position, market: &MarketSnapshot) -> Decision {
        if position.pnl_percent >= dec!(3.0) {
            return Decision::act("Take profit target reached");
        }
        if position.pnl_percent <= dec!(-1.5) {
            return Decision::act("Stop loss triggered");
        }
        if market.rsi > dec!(85) {
            return Decision::act("Overbought - taking profits");
        }
        if market.ema_fast < market.ema_slow {
            return Decision::act("Trend reversal detected");
        }
        Decision::hold("")
    }

    fn position_size(&self, market: &MarketSnapshot, balance: Decimal) -> Size {
        risk_sized(&self.config.risk, market.price, balance, STOP_MULTIPLIER)
    }

    fn stop_loss(&self, entry: Price, _market: &MarketSnapshot) -> Price {
        entry.offset_by(-self.stop_percent())
    }

    fn take_profit(&self, entry: Price, _market: &MarketSnapshot) -> Price {
        entry.offset_by(self.target_percent())
    }

    fn trailing_stop(&self, position: &Position, market: &MarketSnapshot) -> Price {
        trailing_level(position, market.price, self.trailing_percent())
    }

    fn on_position_close(&self, position: &Position, reason: &str) {
        info!(
            strategy = self.name(),
            symbol = %position.symbol,
            reason,
            "position closed"
        );
    }

    fn parameters(&self) -> BTreeMap<String, Decimal> {
        BTreeMap::from([
            ("risk_per_trade".to_string(), self.config.risk.risk_per_trade),
            ("stop_loss_percent".to_string(), self.stop_percent()),
            ("take_profit_percent".to_string(), self.target_percent()),
            ("trailing_stop_percent".to_string(), self.trailing_percent()),
        ])
    }
}
