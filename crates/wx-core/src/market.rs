//! Market identity and specification types.
//!
//! A `Market` is a single binary weather-derivative contract: "will the
//! high in city C exceed/fall below/fall within threshold(s) T on date D".

use crate::decimal::{Probability, Temperature};
use crate::units::Unit;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique market identifier.
///
/// This is the primary key used by `DataStore`/`wx-store` and by the
/// strategies; it is cheap to copy and hash, the same way `MarketKey` is in
/// the teacher's `hip3-core`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarketId(pub String);

impl MarketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which weather variable a market settles on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    TempHigh,
    TempLow,
    TempThreshold,
    TempRange,
    Precipitation,
    Snowfall,
    Unknown,
}

impl MetricType {
    /// Dead-band epsilon used by `valueChanged`/threshold-position
    /// classification (SPEC_FULL §3, §4.10).
    pub fn change_epsilon(&self) -> rust_decimal::Decimal {
        use rust_decimal_macros::dec;
        match self {
            MetricType::TempHigh | MetricType::TempLow | MetricType::TempThreshold
            | MetricType::TempRange => dec!(0.5),
            MetricType::Precipitation | MetricType::Snowfall => dec!(0.05),
            MetricType::Unknown => dec!(0.5),
        }
    }

    pub fn is_temperature(&self) -> bool {
        matches!(
            self,
            MetricType::TempHigh
                | MetricType::TempLow
                | MetricType::TempThreshold
                | MetricType::TempRange
        )
    }
}

/// How a market's value is compared against its threshold(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Above,
    Below,
    Range,
}

/// A single binary weather-derivative market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub market_id: MarketId,
    pub city: String,
    pub metric_type: MetricType,
    pub comparison: Comparison,
    /// Canonicalized threshold (°F for temperature, mm for precipitation).
    /// Unused when `comparison == Range`.
    pub threshold: Option<Temperature>,
    /// Canonicalized lower bound, used only when `comparison == Range`.
    pub min_threshold: Option<Temperature>,
    /// Canonicalized upper bound, used only when `comparison == Range`.
    pub max_threshold: Option<Temperature>,
    /// Original display unit (threshold above is always canonical).
    pub unit: Unit,
    pub target_date: NaiveDate,
    pub yes_token_id: String,
    pub no_token_id: String,
    pub active: bool,
    pub closed: bool,
    /// Last observed YES price, used for edge computation and slippage
    /// checks without round-tripping through `PriceHistory`.
    pub yes_price: Probability,
    pub no_price: Probability,
}

impl Market {
    /// A market whose price has settled to near-certainty is excluded from
    /// signal generation (SPEC_FULL §3).
    pub fn is_effectively_resolved(&self) -> bool {
        use rust_decimal_macros::dec;
        self.yes_price.inner() <= dec!(0.01) || self.yes_price.inner() >= dec!(0.99)
    }

    pub fn is_tradeable(&self) -> bool {
        self.active && !self.closed && !self.is_effectively_resolved()
    }

    /// Hours until the market's target date resolves, measured from `now`
    /// at UTC midnight of `target_date`.
    pub fn hours_until_target(&self, now: DateTime<Utc>) -> f64 {
        let target_midnight = self
            .target_date
            .and_hms_opt(0, 0, 0)
            .expect("valid time components")
            .and_utc();
        (target_midnight - now).num_seconds() as f64 / 3600.0
    }

    pub fn days_until_target(&self, now: DateTime<Utc>) -> f64 {
        self.hours_until_target(now) / 24.0
    }
}
