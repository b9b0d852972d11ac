use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Price type using NewType pattern for type safety
/// Prevents accidental mixing with quantities
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Price = Price(Decimal::ZERO);

    /// Create a new Price from a Decimal
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Get the underlying Decimal value
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Parse a price from its decimal string form
    pub fn parse(s: &str) -> Result<Self, rust_decimal::Error> {
        s.parse()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Signed move from `reference` to `self`, in percent of `reference`.
    ///
    /// Returns zero when the reference price is zero.
    pub fn percent_from(&self, reference: Price) -> Decimal {
        if reference.0.is_zero() {
            return Decimal::ZERO;
        }
        (self.0 - reference.0) / reference.0 * Decimal::ONE_HUNDRED
    }

    /// Scale the price by `(1 + pct)`, where `pct` is a fraction (0.01 = 1%)
    pub fn offset_by(&self, pct: Decimal) -> Self {
        Self(self.0 * (Decimal::ONE + pct))
    }
}

impl FromStr for Price {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Decimal::from_str(s)?))
    }
}

impl From<Decimal> for Price {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Serialized as a string so journal entries keep full precision
impl Serialize for Price {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let decimal = Decimal::from_str(&s).map_err(serde::de::Error::custom)?;
        Ok(Price(decimal))
    }
}

impl std::ops::Add for Price {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl std::ops::Sub for Price {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

impl std::ops::Mul<Decimal> for Price {
    type Output = Self;

    fn mul(self, rhs: Decimal) -> Self {
        Self(self.0 * rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_parse() {
        let price = Price::parse("100.50").unwrap();
        assert_eq!(price.value(), Decimal::new(10050, 2));
        assert!(Price::parse("not-a-price").is_err());
    }

    #[test]
    fn test_percent_from() {
        let entry = Price::new(dec!(100));
        assert_eq!(Price::new(dec!(105)).percent_from(entry), dec!(5));
        assert_eq!(Price::new(dec!(94)).percent_from(entry), dec!(-6));
        assert_eq!(entry.percent_from(Price::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_offset_by() {
        let entry = Price::new(dec!(200));
        assert_eq!(entry.offset_by(dec!(-0.005)).value(), dec!(199.000));
        assert_eq!(entry.offset_by(dec!(0.015)).value(), dec!(203.000));
    }

    #[test]
    fn test_price_serialization() {
        let price = Price::new(Decimal::new(10050, 2));

        let json = serde_json::to_string(&price).unwrap();
        assert_eq!(json, "\"100.50\"");

        let deserialized: Price = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, price);
    }
}
