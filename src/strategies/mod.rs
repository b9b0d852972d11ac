pub mod momentum;
pub mod registry;
pub mod scalper;

pub use momentum::MomentumStrategy;
pub use registry::{StrategyFactory, StrategyRegistry};
pub use scalper::ScalperStrategy;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::config::RiskConfig;
use crate::core::{OrderSide, Position};
use crate::types::{Price, Size};

/// Quantity decimals sent to the venue
const QUANTITY_DP: u32 = 8;

/// Size a position so that hitting the stop loses `risk_per_trade` of balance.
///
/// The result never needs more quote than `balance` (or `max_order_value`
/// when set) and never exceeds `max_position_size` when set.
pub(crate) fn risk_sized(
    risk: &RiskConfig,
    price: Price,
    balance: Decimal,
    stop_multiplier: Decimal,
) -> Size {
    let distance = price.value() * risk.stop_loss_percent * stop_multiplier;
    if distance <= Decimal::ZERO || balance <= Decimal::ZERO {
        return Size::ZERO;
    }

    let mut quantity = balance * risk.risk_per_trade / distance;

    let mut budget = balance;
    if risk.max_order_value > Decimal::ZERO {
        budget = budget.min(risk.max_order_value);
    }
    quantity = quantity.min(budget / price.value());

    if risk.max_position_size > Decimal::ZERO {
        quantity = quantity.min(risk.max_position_size);
    }

    Size::new(quantity.round_dp_with_strategy(QUANTITY_DP, RoundingStrategy::ToZero))
}

/// Trailing level `pct` away from the current price, on the losing side
pub(crate) fn trailing_level(position: &Position, current: Price, pct: Decimal) -> Price {
    match position.side {
        OrderSide::Buy => current.offset_by(-pct),
        OrderSide::Sell => current.offset_by(pct),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Order;
    use rust_decimal_macros::dec;

    #[test]
    fn test_risk_sized_caps_at_balance() {
        // 1% risk over a 0.5% stop would be 2x the balance
        let size = risk_sized(
            &RiskConfig::default(),
            Price::new(dec!(100)),
            dec!(1000),
            Decimal::ONE,
        );
        assert_eq!(size, Size::new(dec!(10)));
    }

    #[test]
    fn test_risk_sized_uses_risk_when_smaller() {
        let risk = RiskConfig {
            risk_per_trade: dec!(0.001),
            stop_loss_percent: dec!(0.01),
            ..RiskConfig::default()
        };
        // 1000 * 0.001 / (100 * 0.01) = 1
        let size = risk_sized(&risk, Price::new(dec!(100)), dec!(1000), Decimal::ONE);
        assert_eq!(size, Size::new(dec!(1)));
    }

    #[test]
    fn test_risk_sized_respects_limits() {
        let risk = RiskConfig {
            max_order_value: dec!(250),
            ..RiskConfig::default()
        };
        let size = risk_sized(&risk, Price::new(dec!(100)), dec!(1000), Decimal::ONE);
        assert_eq!(size, Size::new(dec!(2.5)));

        let risk = RiskConfig {
            max_position_size: dec!(0.5),
            ..RiskConfig::default()
        };
        let size = risk_sized(&risk, Price::new(dec!(100)), dec!(1000), Decimal::ONE);
        assert_eq!(size, Size::new(dec!(0.5)));

        assert!(risk_sized(&risk, Price::new(dec!(100)), Decimal::ZERO, Decimal::ONE).is_zero());
    }

    #[test]
    fn test_trailing_level_by_side() {
        let long = Position::from_fill(&Order::buy("BTCUSDT", Size::new(dec!(1)), Price::new(dec!(100))));
        let short = Position::from_fill(&Order::sell("BTCUSDT", Size::new(dec!(1)), Price::new(dec!(100))));
        let current = Price::new(dec!(200));
        assert_eq!(trailing_level(&long, current, dec!(0.01)), Price::new(dec!(198)));
        assert_eq!(trailing_level(&short, current, dec!(0.01)), Price::new(dec!(202)));
    }
}
