use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::StrategyConfig;
use crate::core::{MarketSnapshot, Order, Position};
use crate::strategies::{risk_sized, trailing_level};
use crate::traits::{Decision, Strategy, StrategyKind};
use crate::types::{Price, Size};

/// Trailing distance used when the risk config leaves it unset
const DEFAULT_TRAILING: Decimal = dec!(0.003);

/// Short-horizon strategy: enters on neutral RSI with a bullish EMA cross, or
/// on moderate volatility; exits at +1% / -0.5%.
#[derive(Debug, Clone)]
pub struct ScalperStrategy {
    config: StrategyConfig,
}

impl ScalperStrategy {
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    fn trailing_percent(&self) -> Decimal {
        if self.config.risk.trailing_stop_percent > Decimal::ZERO {
            self.config.risk.trailing_stop_percent
        } else {
            DEFAULT_TRAILING
        }
    }
}

impl Strategy for ScalperStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Scalper
    }

    fn name(&self) -> &str {
        "scalper_strategy"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn config(&self) -> &StrategyConfig {
        &self.config
    }

    fn should_enter(&self, market: &MarketSnapshot) -> Decision {
        if market.rsi > dec!(30) && market.rsi < dec!(70) && market.is_uptrend() {
            return Decision::act("RSI in range with bullish trend");
        }
        if market.volatility > dec!(0.5) && market.volatility < dec!(3.0) {
            return Decision::act("Good volatility for scalping");
        }
        Decision::hold("Conditions not met")
    }

    fn should_exit(&self, position: &Position, _market: &MarketSnapshot) -> Decision {
        if position.pnl_percent >= dec!(1.0) {
            return Decision::act("Take profit target reached");
        }
        if position.pnl_percent <= dec!(-0.5) {
            return Decision::act("Stop loss triggered");
        }
        Decision::hold("")
    }

    fn position_size(&self, market: &MarketSnapshot, balance: Decimal) -> Size {
        risk_sized(&self.config.risk, market.price, balance, Decimal::ONE)
    }

    fn stop_loss(&self, entry: Price, _market: &MarketSnapshot) -> Price {
        entry.offset_by(-self.config.risk.stop_loss_percent)
    }

    fn take_profit(&self, entry: Price, _market: &MarketSnapshot) -> Price {
        entry.offset_by(self.config.risk.take_profit_percent)
    }

    fn trailing_stop(&self, position: &Position, market: &MarketSnapshot) -> Price {
        trailing_level(position, market.price, self.trailing_percent())
    }

    fn on_order_fill(&self, order: &Order, position: &Position) {
        debug!(
            strategy = self.name(),
            order_id = %order.id,
            symbol = %position.symbol,
            "order filled"
        );
    }

    fn on_position_close(&self, position: &Position, reason: &str) {
        info!(
            strategy = self.name(),
            symbol = %position.symbol,
            pnl_percent = %position.pnl_percent,
            reason,
            "position closed"
        );
    }

    fn parameters(&self) -> BTreeMap<String, Decimal> {
        let risk = &self.config.risk;
        BTreeMap::from([
            ("risk_per_trade".to_string(), risk.risk_per_trade),
            ("stop_loss_percent".to_string(), risk.stop_loss_percent),
            ("take_profit_percent".to_string(), risk.take_profit_percent),
            ("trailing_stop_percent".to_string(), self.trailing_percent()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalper() -> ScalperStrategy {
        ScalperStrategy::new(StrategyConfig::new(StrategyKind::Scalper))
    }

    fn market(rsi: Decimal, fast: Decimal, slow: Decimal, volatility: Decimal) -> MarketSnapshot {
        let mut market = MarketSnapshot::at_price("BTCUSDT", Price::new(dec!(100)));
        market.rsi = rsi;
        market.ema_fast = fast;
        market.ema_slow = slow;
        market.volatility = volatility;
        market
    }

    #[test]
    fn test_entry_signals() {
        let s = scalper();
        let bullish = s.should_enter(&market(dec!(50), dec!(101), dec!(100), dec!(0)));
        assert!(bullish.act);
        assert_eq!(bullish.reason, "RSI in range with bullish trend");

        let volatile = s.should_enter(&market(dec!(80), dec!(99), dec!(100), dec!(1.2)));
        assert!(volatile.act);
        assert_eq!(volatile.reason, "Good volatility for scalping");

        let flat = s.should_enter(&market(dec!(80), dec!(99), dec!(100), dec!(0.1)));
        assert!(!flat.act);
    }

    #[test]
    fn test_exit_thresholds_are_inclusive() {
        let s = scalper();
        let snapshot = market(dec!(50), dec!(1), dec!(1), dec!(0));
        let mut position =
            Position::from_fill(&Order::buy("BTCUSDT", Size::new(dec!(1)), Price::new(dec!(100))));

        position.update_pnl(Price::new(dec!(101)));
        assert_eq!(s.should_exit(&position, &snapshot).reason, "Take profit target reached");

        position.update_pnl(Price::new(dec!(99.5)));
        assert_eq!(s.should_exit(&position, &snapshot).reason, "Stop loss triggered");

        position.update_pnl(Price::new(dec!(100.2)));
        assert!(!s.should_exit(&position, &snapshot).act);
    }

    #[test]
    fn test_levels() {
        let s = scalper();
        let snapshot = market(dec!(50), dec!(1), dec!(1), dec!(0));
        let entry = Price::new(dec!(100));
        assert_eq!(s.stop_loss(entry, &snapshot), Price::new(dec!(99.5)));
        assert_eq!(s.take_profit(entry, &snapshot), Price::new(dec!(101.5)));

        let position = Position::from_fill(&Order::buy("BTCUSDT", Size::new(dec!(1)), entry));
        assert_eq!(s.trailing_stop(&position, &snapshot), Price::new(dec!(99.7)));
        assert_eq!(s.parameters()["trailing_stop_percent"], dec!(0.003));
    }
}
