//! Forecast snapshots and dead-banded threshold-position classification.

use crate::decimal::Temperature;
use crate::market::{Comparison, MetricType};
use crate::run_record::RunSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the most recent forecast value sits relative to a market's
/// threshold(s), with a dead-band around the boundary so that noise near
/// the threshold doesn't flip-flop the classification (SPEC_FULL §3,
/// §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdPosition {
    /// Clearly on the YES side of the threshold.
    InFavor,
    /// Clearly on the NO side of the threshold.
    AgainstFavor,
    /// Within `MetricType::change_epsilon()` of the boundary; neither
    /// strategy should treat this as a confident signal.
    NearBoundary,
}

/// The latest decoded forecast value for a single market, plus enough
/// history to detect whether the value actually moved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastSnapshot {
    pub model: String,
    pub cycle_hour: u8,
    pub value: Temperature,
    pub previous_value: Option<Temperature>,
    pub value_changed: bool,
    pub change_timestamp: Option<DateTime<Utc>>,
    pub threshold_position: ThresholdPosition,
    pub received_at: DateTime<Utc>,
    /// `FILE` or `API` — carried straight onto `FORECAST_UPDATED` as
    /// `confidence` by the arbiter (`HIGH` iff `File`).
    pub source: RunSource,
}

impl ForecastSnapshot {
    /// Build a snapshot from a new decoded value, the previous snapshot (if
    /// any), and the market it applies to. Dead-bands both the
    /// `value_changed` flag and the threshold classification by
    /// `metric_type.change_epsilon()`.
    pub fn new(
        model: impl Into<String>,
        cycle_hour: u8,
        value: Temperature,
        previous: Option<&ForecastSnapshot>,
        comparison: Comparison,
        threshold: Option<Temperature>,
        min_threshold: Option<Temperature>,
        max_threshold: Option<Temperature>,
        metric_type: MetricType,
        now: DateTime<Utc>,
        source: RunSource,
    ) -> Self {
        let epsilon = metric_type.change_epsilon();
        let previous_value = previous.map(|p| p.value);
        let value_changed = match previous_value {
            Some(prev) => value.abs_diff(prev) > epsilon,
            None => true,
        };
        let change_timestamp = if value_changed {
            Some(now)
        } else {
            previous.and_then(|p| p.change_timestamp)
        };

        let threshold_position = classify_threshold_position(
            value,
            comparison,
            threshold,
            min_threshold,
            max_threshold,
            epsilon,
        );

        Self {
            model: model.into(),
            cycle_hour,
            value,
            previous_value,
            value_changed,
            change_timestamp,
            threshold_position,
            received_at: now,
            source,
        }
    }
}

fn classify_threshold_position(
    value: Temperature,
    comparison: Comparison,
    threshold: Option<Temperature>,
    min_threshold: Option<Temperature>,
    max_threshold: Option<Temperature>,
    epsilon: rust_decimal::Decimal,
) -> ThresholdPosition {
    match comparison {
        Comparison::Above => {
            let Some(t) = threshold else {
                return ThresholdPosition::NearBoundary;
            };
            let diff = value.inner() - t.inner();
            if diff.abs() <= epsilon {
                ThresholdPosition::NearBoundary
            } else if diff > rust_decimal::Decimal::ZERO {
                ThresholdPosition::InFavor
            } else {
                ThresholdPosition::AgainstFavor
            }
        }
        Comparison::Below => {
            let Some(t) = threshold else {
                return ThresholdPosition::NearBoundary;
            };
            let diff = t.inner() - value.inner();
            if diff.abs() <= epsilon {
                ThresholdPosition::NearBoundary
            } else if diff > rust_decimal::Decimal::ZERO {
                ThresholdPosition::InFavor
            } else {
                ThresholdPosition::AgainstFavor
            }
        }
        Comparison::Range => {
            let (Some(min), Some(max)) = (min_threshold, max_threshold) else {
                return ThresholdPosition::NearBoundary;
            };
            let near_min = (value.inner() - min.inner()).abs() <= epsilon;
            let near_max = (value.inner() - max.inner()).abs() <= epsilon;
            if near_min || near_max {
                ThresholdPosition::NearBoundary
            } else if value.inner() > min.inner() && value.inner() < max.inner() {
                ThresholdPosition::InFavor
            } else {
                ThresholdPosition::AgainstFavor
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_record::RunSource;
    use rust_decimal_macros::dec;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + chrono::Duration::seconds(secs)
    }

    #[test]
    fn first_snapshot_always_counts_as_changed() {
        let snap = ForecastSnapshot::new(
            "hrrr",
            12,
            Temperature::new(dec!(62.0)),
            None,
            Comparison::Above,
            Some(Temperature::new(dec!(60.8))),
            None,
            None,
            MetricType::TempHigh,
            t(0),
            RunSource::File,
        );
        assert!(snap.value_changed);
        assert_eq!(snap.threshold_position, ThresholdPosition::InFavor);
    }

    #[test]
    fn small_movement_within_epsilon_is_not_a_change() {
        let first = ForecastSnapshot::new(
            "hrrr",
            12,
            Temperature::new(dec!(62.0)),
            None,
            Comparison::Above,
            Some(Temperature::new(dec!(60.8))),
            None,
            None,
            MetricType::TempHigh,
            t(0),
            RunSource::File,
        );
        let second = ForecastSnapshot::new(
            "hrrr",
            12,
            Temperature::new(dec!(62.2)),
            Some(&first),
            Comparison::Above,
            Some(Temperature::new(dec!(60.8))),
            None,
            None,
            MetricType::TempHigh,
            t(3600),
            RunSource::File,
        );
        assert!(!second.value_changed);
        assert_eq!(second.change_timestamp, None);
    }

    #[test]
    fn value_at_threshold_is_near_boundary() {
        let snap = ForecastSnapshot::new(
            "hrrr",
            12,
            Temperature::new(dec!(61.0)),
            None,
            Comparison::Above,
            Some(Temperature::new(dec!(60.8))),
            None,
            None,
            MetricType::TempHigh,
            t(0),
            RunSource::File,
        );
        assert_eq!(snap.threshold_position, ThresholdPosition::NearBoundary);
    }

    #[test]
    fn range_comparison_in_favor_when_strictly_inside() {
        let snap = ForecastSnapshot::new(
            "gfs",
            0,
            Temperature::new(dec!(65.0)),
            None,
            Comparison::Range,
            None,
            Some(Temperature::new(dec!(60.0))),
            Some(Temperature::new(dec!(70.0))),
            MetricType::TempRange,
            t(0),
            RunSource::File,
        );
        assert_eq!(snap.threshold_position, ThresholdPosition::InFavor);
    }

    #[test]
    fn value_change_after_dead_band_updates_timestamp() {
        let first = ForecastSnapshot::new(
            "hrrr",
            12,
            Temperature::new(dec!(62.0)),
            None,
            Comparison::Above,
            Some(Temperature::new(dec!(60.8))),
            None,
            None,
            MetricType::TempHigh,
            t(0),
            RunSource::File,
        );
        let second = ForecastSnapshot::new(
            "hrrr",
            12,
            Temperature::new(dec!(64.0)),
            Some(&first),
            Comparison::Above,
            Some(Temperature::new(dec!(60.8))),
            None,
            None,
            MetricType::TempHigh,
            t(3600),
            RunSource::File,
        );
        assert!(second.value_changed);
        assert_eq!(second.change_timestamp, Some(t(3600)));
    }
}
