//! Precision-safe decimal types for forecast and price arithmetic.
//!
//! Uses `rust_decimal` for exact decimal arithmetic, the same way the rest
//! of this workspace avoids floating-point rounding error in anything that
//! ends up compared against a threshold or fed to a sizing formula.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};
use std::str::FromStr;

/// A temperature, always canonicalized to degrees Fahrenheit before it is
/// compared against a market threshold (see `wx-core::units`).
///
/// Wraps `Decimal` to prevent accidentally mixing a raw forecast value with
/// a probability or a market price in arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Temperature(pub Decimal);

impl Temperature {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    /// Absolute difference between this and another temperature.
    #[inline]
    pub fn abs_diff(&self, other: Temperature) -> Decimal {
        (self.0 - other.0).abs()
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Temperature {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Temperature {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Add for Temperature {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Temperature {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Mul<Decimal> for Temperature {
    type Output = Self;
    fn mul(self, rhs: Decimal) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Div<Decimal> for Temperature {
    type Output = Self;
    fn div(self, rhs: Decimal) -> Self::Output {
        Self(self.0 / rhs)
    }
}

/// A market-implied or model-implied probability in `[0, 1]`.
///
/// Construction does not clamp; callers that compute a probability (the
/// Bayesian combiner, the market's YES price) are responsible for clamping
/// at the point they derive the value, so that an out-of-range value is a
/// visible bug rather than silently absorbed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Probability(pub Decimal);

impl Probability {
    pub const ZERO: Self = Self(Decimal::ZERO);
    pub const ONE: Self = Self(Decimal::ONE);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    /// Clamp to the valid `[0, 1]` range.
    #[inline]
    pub fn clamped(value: Decimal) -> Self {
        Self(value.clamp(Decimal::ZERO, Decimal::ONE))
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for Probability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Decimal> for Probability {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Sub for Probability {
    type Output = Decimal;
    fn sub(self, rhs: Self) -> Decimal {
        self.0 - rhs.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn temperature_abs_diff() {
        let a = Temperature::new(dec!(60.8));
        let b = Temperature::new(dec!(57.2));
        assert_eq!(a.abs_diff(b), dec!(3.6));
    }

    #[test]
    fn probability_clamps() {
        assert_eq!(Probability::clamped(dec!(1.4)).inner(), Decimal::ONE);
        assert_eq!(Probability::clamped(dec!(-0.2)).inner(), Decimal::ZERO);
        assert_eq!(Probability::clamped(dec!(0.5)).inner(), dec!(0.5));
    }

    #[test]
    fn probability_edge_is_signed_difference() {
        let p = Probability::new(dec!(0.62));
        let market = Probability::new(dec!(0.55));
        assert_eq!(p - market, dec!(0.07));
    }
}
