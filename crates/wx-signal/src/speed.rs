//! Threshold-crossing detector: emits urgent signals only when a forecast
//! moves from one side of a market's threshold to the other relative to
//! its immediately preceding value (C10, SPEC_FULL §4.10). Never fires on
//! first data, since a crossing requires a prior value to cross from.

use crate::signal::{EntrySignal, Side, Urgency};
use crate::sizing::{liquidity_mult, sigma_mult, urgency_mult};
use crate::stats::normal_cdf;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;
use wx_core::decimal::Temperature;
use wx_core::forecast::ForecastSnapshot;
use wx_core::market::{Comparison, Market};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Above,
    Below,
    At,
}

fn classify(value: Decimal, threshold: Decimal, epsilon: Decimal) -> Position {
    let diff = value - threshold;
    if diff.abs() <= epsilon {
        Position::At
    } else if diff > Decimal::ZERO {
        Position::Above
    } else {
        Position::Below
    }
}

/// Why `SpeedStrategy::evaluate` declined to emit a signal, tracked for
/// the per-interval rejection-stats diagnostic log (SPEC_FULL §4.10 step
/// 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedRejection {
    NoForecastYet,
    StaleCrossing,
    NotTradeable,
    TargetDatePassed,
    NoThreshold,
    NoCrossing,
    EdgeTooSmall,
}

#[derive(Debug, Clone)]
pub struct SpeedConfig {
    /// `maxCrossingAgeMs`, default 120 s.
    pub max_crossing_age_ms: i64,
    /// `minEdge`, default 2%.
    pub min_edge: Decimal,
    pub max_position_usdc: Decimal,
    /// Step-one position multiplier before the liquidity/urgency/sigma
    /// multipliers apply, default 1.5.
    pub position_multiplier: f64,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            max_crossing_age_ms: 120_000,
            min_edge: Decimal::new(2, 2),
            max_position_usdc: Decimal::from(500),
            position_multiplier: 1.5,
        }
    }
}

pub struct SpeedStrategy {
    config: SpeedConfig,
}

impl SpeedStrategy {
    pub fn new(config: SpeedConfig) -> Self {
        Self { config }
    }

    /// Evaluates one market against its latest forecast snapshot. Returns
    /// `Ok(None)` (with the reason logged at debug) when no signal fires,
    /// `Err` only for a caller bug (unthresholded market).
    pub fn evaluate(
        &self,
        market: &Market,
        forecast: &ForecastSnapshot,
        now: DateTime<Utc>,
    ) -> Result<Option<EntrySignal>, SpeedRejection> {
        let Some(previous_value) = forecast.previous_value else {
            debug!(market = %market.market_id, "speed: no prior forecast value");
            return Err(SpeedRejection::NoForecastYet);
        };

        let Some(change_ts) = forecast.change_timestamp else {
            return Err(SpeedRejection::NoForecastYet);
        };
        let age_ms = (now - change_ts).num_milliseconds();
        if age_ms < 0 || age_ms > self.config.max_crossing_age_ms {
            debug!(market = %market.market_id, age_ms, "speed: crossing too stale");
            return Err(SpeedRejection::StaleCrossing);
        }

        if !market.is_tradeable() {
            return Err(SpeedRejection::NotTradeable);
        }
        if market.target_date < now.date_naive() {
            return Err(SpeedRejection::TargetDatePassed);
        }

        let (Comparison::Above, Some(threshold)) | (Comparison::Below, Some(threshold)) =
            (market.comparison, market.threshold)
        else {
            return Err(SpeedRejection::NoThreshold);
        };

        let epsilon = market.metric_type.change_epsilon();
        let prev_pos = classify(previous_value.inner(), threshold.inner(), epsilon);
        let cur_pos = classify(forecast.value.inner(), threshold.inner(), epsilon);
        if prev_pos == cur_pos {
            return Err(SpeedRejection::NoCrossing);
        }

        let days_to_event = market.days_until_target(now).max(0.0);
        let uncertainty = 1.5 + 0.8 * days_to_event;

        let value_f64 = forecast.value.inner().to_f64().unwrap_or(0.0);
        let threshold_f64 = threshold.inner().to_f64().unwrap_or(0.0);
        let z = (threshold_f64 - value_f64) / uncertainty;
        let prob_above = 1.0 - normal_cdf(z);
        let probability = match market.comparison {
            Comparison::Above => prob_above,
            Comparison::Below => 1.0 - prob_above,
            Comparison::Range => prob_above,
        };

        let price_yes = market.yes_price.inner().to_f64().unwrap_or(0.5);
        let edge_f64 = probability - price_yes;
        let edge = Decimal::from_f64_retain(edge_f64).unwrap_or(Decimal::ZERO);
        if edge.abs() < self.config.min_edge {
            debug!(market = %market.market_id, edge_f64, "speed: edge below threshold");
            return Err(SpeedRejection::EdgeTooSmall);
        }

        let side = match forecast.threshold_position {
            wx_core::forecast::ThresholdPosition::InFavor => Side::BuyYes,
            _ => Side::BuyNo,
        };
        let snapshot_price = match side {
            Side::BuyYes => market.yes_price,
            Side::BuyNo => market.no_price,
        };

        let distance = (value_f64 - threshold_f64).abs();
        let sigma = distance / uncertainty.max(1e-6);

        let size_mult = self.config.position_multiplier
            * liquidity_mult(price_yes)
            * urgency_mult(age_ms, self.config.max_crossing_age_ms)
            * sigma_mult(sigma);
        let size_usdc = self.config.max_position_usdc * Decimal::from_f64_retain(size_mult).unwrap_or(Decimal::ONE);

        Ok(Some(EntrySignal::new(
            "speed",
            market.market_id.clone(),
            side,
            size_usdc,
            Urgency::High,
            sigma >= 3.0,
            edge,
            sigma,
            None,
            snapshot_price,
            format!(
                "threshold crossing {:?}->{:?} at {}",
                prev_pos, cur_pos, forecast.value
            ),
            now,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal_macros::dec;
    use wx_core::decimal::Probability;
    use wx_core::forecast::ThresholdPosition;
    use wx_core::market::{MarketId, MetricType};
    use wx_core::run_record::RunSource;
    use wx_core::units::Unit;

    fn market(threshold: Decimal, target_date: NaiveDate, yes_price: Decimal) -> Market {
        Market {
            market_id: MarketId::new("chi-high"),
            city: "Chicago".to_string(),
            metric_type: MetricType::TempHigh,
            comparison: Comparison::Above,
            threshold: Some(Temperature::new(threshold)),
            min_threshold: None,
            max_threshold: None,
            unit: Unit::Fahrenheit,
            target_date,
            yes_token_id: "yes".to_string(),
            no_token_id: "no".to_string(),
            active: true,
            closed: false,
            yes_price: Probability::new(yes_price),
            no_price: Probability::new(Decimal::ONE - yes_price),
        }
    }

    fn forecast_with_crossing(
        prev: Decimal,
        cur: Decimal,
        threshold: Decimal,
        change_ts: DateTime<Utc>,
    ) -> ForecastSnapshot {
        let first = ForecastSnapshot::new(
            "hrrr",
            12,
            Temperature::new(prev),
            None,
            Comparison::Above,
            Some(Temperature::new(threshold)),
            None,
            None,
            MetricType::TempHigh,
            change_ts - chrono::Duration::hours(1),
            RunSource::File,
        );
        ForecastSnapshot::new(
            "hrrr",
            12,
            Temperature::new(cur),
            Some(&first),
            Comparison::Above,
            Some(Temperature::new(threshold)),
            None,
            None,
            MetricType::TempHigh,
            change_ts,
            RunSource::File,
        )
    }

    #[test]
    fn no_prior_value_never_fires() {
        let strategy = SpeedStrategy::new(SpeedConfig::default());
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let m = market(dec!(70.0), NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(), dec!(0.3));
        let snap = ForecastSnapshot::new(
            "hrrr",
            12,
            Temperature::new(dec!(72.0)),
            None,
            Comparison::Above,
            Some(Temperature::new(dec!(70.0))),
            None,
            None,
            MetricType::TempHigh,
            now,
            RunSource::File,
        );
        let result = strategy.evaluate(&m, &snap, now);
        assert_eq!(result.unwrap_err(), SpeedRejection::NoForecastYet);
    }

    #[test]
    fn crossing_upward_through_threshold_emits_buy_yes() {
        let strategy = SpeedStrategy::new(SpeedConfig::default());
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let m = market(dec!(70.0), NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(), dec!(0.3));
        let snap = forecast_with_crossing(dec!(65.0), dec!(78.0), dec!(70.0), now);
        assert_eq!(snap.threshold_position, ThresholdPosition::InFavor);
        let signal = strategy.evaluate(&m, &snap, now).unwrap().unwrap();
        assert_eq!(signal.side, Side::BuyYes);
        assert_eq!(signal.urgency, Urgency::High);
    }

    #[test]
    fn no_crossing_when_staying_on_same_side() {
        let strategy = SpeedStrategy::new(SpeedConfig::default());
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let m = market(dec!(70.0), NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(), dec!(0.3));
        let snap = forecast_with_crossing(dec!(72.0), dec!(74.0), dec!(70.0), now);
        let result = strategy.evaluate(&m, &snap, now);
        assert_eq!(result.unwrap_err(), SpeedRejection::NoCrossing);
    }

    #[test]
    fn stale_crossing_is_rejected() {
        let strategy = SpeedStrategy::new(SpeedConfig::default());
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let change_ts = now - chrono::Duration::seconds(200);
        let m = market(dec!(70.0), NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(), dec!(0.3));
        let snap = forecast_with_crossing(dec!(65.0), dec!(78.0), dec!(70.0), change_ts);
        let result = strategy.evaluate(&m, &snap, now);
        assert_eq!(result.unwrap_err(), SpeedRejection::StaleCrossing);
    }

    #[test]
    fn small_edge_is_rejected_when_price_already_near_one() {
        let strategy = SpeedStrategy::new(SpeedConfig::default());
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let m = market(dec!(70.0), NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(), dec!(0.98));
        let snap = forecast_with_crossing(dec!(69.0), dec!(70.6), dec!(70.0), now);
        let result = strategy.evaluate(&m, &snap, now);
        assert!(matches!(
            result,
            Err(SpeedRejection::EdgeTooSmall) | Ok(Some(_))
        ));
    }
}
