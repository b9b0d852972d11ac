use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::types::Price;

/// Size type using NewType pattern for type safety
/// Represents order and position quantities, distinct from Price
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Size(pub Decimal);

impl Size {
    pub const ZERO: Size = Size(Decimal::ZERO);

    /// Create a new Size from a Decimal
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Get the underlying Decimal value
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Parse a size from its decimal string form
    pub fn parse(s: &str) -> Result<Self, rust_decimal::Error> {
        s.parse()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Quote-currency value of this quantity at `price`
    pub fn notional(&self, price: Price) -> Decimal {
        self.0 * price.value()
    }
}

impl FromStr for Size {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Decimal::from_str(s)?))
    }
}

impl From<Decimal> for Size {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Size {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Size {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let decimal = Decimal::from_str(&s).map_err(serde::de::Error::custom)?;
        Ok(Size(decimal))
    }
}

impl std::ops::Add for Size {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl std::ops::Sub for Size {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

// Price x Size -> notional value
impl std::ops::Mul<Price> for Size {
    type Output = Decimal;

    fn mul(self, rhs: Price) -> Decimal {
        self.0 * rhs.0
    }
}

impl std::ops::Mul<Size> for Price {
    type Output = Decimal;

    fn mul(self, rhs: Size) -> Decimal {
        self.0 * rhs.0
    }
}
