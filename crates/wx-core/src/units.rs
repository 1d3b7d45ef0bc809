//! Unit handling for temperature and precipitation values.
//!
//! Per SPEC_FULL §3, thresholds and forecast values are normalized to a
//! canonical unit at ingestion (degrees Fahrenheit for temperature,
//! millimeters for precipitation); the original unit is retained on
//! `Market` for display only.

use crate::decimal::Temperature;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// A display unit for a market's threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    #[serde(rename = "F")]
    Fahrenheit,
    #[serde(rename = "C")]
    Celsius,
    Inches,
    #[serde(rename = "mm")]
    Millimeters,
}

impl Unit {
    /// Convert a temperature value in this unit to the canonical Fahrenheit
    /// representation used everywhere downstream of ingestion.
    pub fn to_canonical_temp(&self, value: Temperature) -> Temperature {
        match self {
            Unit::Fahrenheit => value,
            Unit::Celsius => celsius_to_fahrenheit(value),
            // Non-temperature units passed here are a caller bug; returning
            // the value unchanged keeps this infallible rather than adding
            // a Result for a case that never occurs in correctly-typed
            // call sites (metric family and unit are paired at parse time).
            Unit::Inches | Unit::Millimeters => value,
        }
    }

    /// Convert a precipitation amount in this unit to canonical millimeters.
    pub fn to_canonical_precip(&self, value: Decimal) -> Decimal {
        match self {
            Unit::Millimeters => value,
            Unit::Inches => value * dec!(25.4),
            Unit::Fahrenheit | Unit::Celsius => value,
        }
    }
}

/// `°F = °C * 9/5 + 32`
pub fn celsius_to_fahrenheit(c: Temperature) -> Temperature {
    Temperature::new(c.inner() * dec!(9) / dec!(5) + dec!(32))
}

/// `°C = (°F - 32) * 5/9`
pub fn fahrenheit_to_celsius(f: Temperature) -> Temperature {
    Temperature::new((f.inner() - dec!(32)) * dec!(5) / dec!(9))
}
