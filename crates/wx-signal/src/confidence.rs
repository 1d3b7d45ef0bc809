//! Model-hierarchy, stability, and cross-model-agreement strategy (C11,
//! SPEC_FULL §4.11). Fires in the absence of a recent threshold crossing,
//! when the region's primary model is directionally stable and the rest
//! of the ensemble agrees with it.

use crate::bayesian::{BayesianCombiner, ForecastInput};
use crate::signal::{EntrySignal, Side, Urgency};
use crate::sizing::{liquidity_mult, sigma_mult};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use wx_core::forecast::{ForecastSnapshot, ThresholdPosition};
use wx_core::market::Market;
use wx_core::run_record::RunSource;
use wx_store::RunHistoryStore;

/// Which weather region a city belongs to, determining its model
/// hierarchy (SPEC_FULL §4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Us,
    Europe,
    Global,
}

/// `(primary, secondary, regime)`. Only `primary` may initiate a trade;
/// `secondary`/`regime` may only block or down-weight.
#[derive(Debug, Clone)]
pub struct RegionHierarchy {
    pub primary: &'static str,
    pub secondary: &'static str,
    pub regime: Option<&'static str>,
}

pub fn hierarchy_for(region: Region) -> RegionHierarchy {
    match region {
        Region::Us => RegionHierarchy {
            primary: "hrrr",
            secondary: "rap",
            regime: Some("gfs"),
        },
        Region::Europe => RegionHierarchy {
            primary: "ecmwf",
            secondary: "gfs",
            regime: None,
        },
        Region::Global => RegionHierarchy {
            primary: "gfs",
            secondary: "gfs",
            regime: None,
        },
    }
}

#[derive(Debug, Clone)]
pub struct ConfidenceConfig {
    pub region_map: HashMap<String, Region>,
    pub default_region: Region,
    /// ≥ 2 runs required; default lookback window of 5 runs.
    pub stability_runs: usize,
    /// Max pairwise delta (in canonical °F) across the lookback window
    /// still considered stable; spec gives `0.3°C` for temperature.
    pub temp_stability_threshold_f: f64,
    pub confidence_gate: f64,
    pub weight_stability: f64,
    pub weight_agreement: f64,
    /// Kelly fraction per sigma bucket, applied on top of the liquidity
    /// and sigma multipliers shared with `SpeedStrategy`.
    pub kelly_guaranteed: f64,
    pub kelly_high: f64,
    pub kelly_medium: f64,
    pub kelly_low: f64,
    pub max_position_usdc: Decimal,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            region_map: HashMap::new(),
            default_region: Region::Global,
            stability_runs: 5,
            temp_stability_threshold_f: 0.3 * 1.8,
            confidence_gate: 0.50,
            weight_stability: 0.30,
            weight_agreement: 0.30,
            kelly_guaranteed: 1.0,
            kelly_high: 0.6,
            kelly_medium: 0.35,
            kelly_low: 0.15,
            max_position_usdc: Decimal::from(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceRejection {
    NonPrimaryInitiator,
    FirstRun,
    InsufficientHistory,
    Unstable,
    NoThreshold,
    BelowGate,
}

pub struct ConfidenceStrategy {
    config: ConfidenceConfig,
    combiner: BayesianCombiner,
}

impl ConfidenceStrategy {
    pub fn new(config: ConfidenceConfig, combiner: BayesianCombiner) -> Self {
        Self { config, combiner }
    }

    fn region_for(&self, city: &str) -> Region {
        self.config
            .region_map
            .get(city)
            .copied()
            .unwrap_or(self.config.default_region)
    }

    /// `snapshots` carries the latest `ForecastSnapshot` per model
    /// currently on record for this market; `triggering_model` is the
    /// model whose update caused this evaluation (only the primary may
    /// initiate, per SPEC_FULL §4.11 and invariant P8).
    pub fn evaluate(
        &self,
        market: &Market,
        triggering_model: &str,
        snapshots: &HashMap<String, ForecastSnapshot>,
        run_history: &RunHistoryStore,
        now: DateTime<Utc>,
    ) -> Result<Option<EntrySignal>, ConfidenceRejection> {
        let hierarchy = hierarchy_for(self.region_for(&market.city));
        if triggering_model.to_lowercase() != hierarchy.primary {
            return Err(ConfidenceRejection::NonPrimaryInitiator);
        }

        let Some(primary_snapshot) = snapshots.get(hierarchy.primary) else {
            return Err(ConfidenceRejection::InsufficientHistory);
        };

        if run_history.is_first_run(&market.city, hierarchy.primary) {
            return Err(ConfidenceRejection::FirstRun);
        }
        let runs = run_history.get_last_k_runs(&market.city, hierarchy.primary, self.config.stability_runs);
        if runs.len() < 2 {
            return Err(ConfidenceRejection::InsufficientHistory);
        }

        let run_stability = if market.metric_type.is_temperature() {
            let values: Vec<f64> = runs
                .iter()
                .filter_map(|r| r.max_temp_c.and_then(|t| t.inner().to_f64()))
                .collect();
            let max_delta = max_pairwise_delta(&values);
            if max_delta > self.config.temp_stability_threshold_f {
                return Err(ConfidenceRejection::Unstable);
            }
            (1.0 - max_delta / self.config.temp_stability_threshold_f.max(1e-6)).clamp(0.0, 1.0)
        } else {
            // Precipitation (and other non-temperature metrics) has no
            // continuous delta to tolerate: any flip of the precip flag
            // across the lookback window is unstable, a stricter gate than
            // temperature's bounded-delta tolerance.
            let agrees = runs.windows(2).all(|w| w[0].precip_flag == w[1].precip_flag);
            if !agrees {
                return Err(ConfidenceRejection::Unstable);
            }
            1.0
        };

        let Some(_threshold) = market.threshold.or(market.max_threshold) else {
            return Err(ConfidenceRejection::NoThreshold);
        };

        let mut inputs = vec![ForecastInput {
            model: hierarchy.primary.to_string(),
            value: primary_snapshot.value,
        }];
        if let Some(secondary_snap) = snapshots.get(hierarchy.secondary) {
            if hierarchy.secondary != hierarchy.primary {
                inputs.push(ForecastInput {
                    model: hierarchy.secondary.to_string(),
                    value: secondary_snap.value,
                });
            }
        }
        if let Some(regime) = hierarchy.regime {
            if let Some(regime_snap) = snapshots.get(regime) {
                inputs.push(ForecastInput {
                    model: regime.to_string(),
                    value: regime_snap.value,
                });
            }
        }

        let ensemble = self
            .combiner
            .combine(market, &inputs, now)
            .map_err(|_| ConfidenceRejection::NoThreshold)?;

        let primary_only = self
            .combiner
            .combine(market, &inputs[..1], now)
            .map_err(|_| ConfidenceRejection::NoThreshold)?;

        let agreement = cross_model_agreement(&inputs);
        let sigma_contrib = (ensemble.sigma * 0.10).min(0.30);
        let days_to_event = market.days_until_target(now).max(0.0);
        let horizon_penalty = -0.03 * (days_to_event - 3.0).max(0.0);
        let source_bonus = if matches!(primary_snapshot.source, RunSource::File) {
            0.10
        } else {
            0.0
        };

        let confidence = (self.config.weight_stability * run_stability
            + self.config.weight_agreement * agreement
            + sigma_contrib
            + horizon_penalty
            + source_bonus)
            .clamp(0.0, 1.0);

        if confidence < self.config.confidence_gate {
            return Err(ConfidenceRejection::BelowGate);
        }

        let side = match primary_snapshot.threshold_position {
            ThresholdPosition::InFavor => Side::BuyYes,
            _ => Side::BuyNo,
        };
        let snapshot_price = match side {
            Side::BuyYes => market.yes_price,
            Side::BuyNo => market.no_price,
        };

        let price_yes = market.yes_price.inner().to_f64().unwrap_or(0.5);
        let edge_f64 = ensemble.probability.inner().to_f64().unwrap_or(0.0) - price_yes;
        let edge = Decimal::from_f64_retain(edge_f64).unwrap_or(Decimal::ZERO);

        let sigma = primary_only.sigma;
        let kelly_fraction = if sigma >= 3.0 {
            self.config.kelly_guaranteed
        } else if sigma >= 2.0 {
            self.config.kelly_high
        } else if sigma >= 1.0 {
            self.config.kelly_medium
        } else {
            self.config.kelly_low
        };

        let size_mult = kelly_fraction * liquidity_mult(price_yes) * sigma_mult(sigma);
        let size_usdc =
            self.config.max_position_usdc * Decimal::from_f64_retain(size_mult).unwrap_or(Decimal::ZERO);

        Ok(Some(EntrySignal::new(
            "confidence",
            market.market_id.clone(),
            side,
            size_usdc,
            Urgency::Normal,
            ensemble.is_guaranteed || sigma >= 3.0,
            edge,
            sigma,
            Some(confidence),
            snapshot_price,
            format!(
                "{} stable over {} runs, confidence={:.2}",
                hierarchy.primary,
                runs.len(),
                confidence
            ),
            now,
        )))
    }
}

fn max_pairwise_delta(values: &[f64]) -> f64 {
    let mut max_delta = 0.0f64;
    for i in 0..values.len() {
        for j in (i + 1)..values.len() {
            max_delta = max_delta.max((values[i] - values[j]).abs());
        }
    }
    max_delta
}

fn cross_model_agreement(inputs: &[ForecastInput]) -> f64 {
    if inputs.len() < 2 {
        return 0.7;
    }
    let values: Vec<f64> = inputs
        .iter()
        .filter_map(|i| i.value.inner().to_f64())
        .collect();
    let max_delta = max_pairwise_delta(&values);
    // 5°F of ensemble spread is treated as full disagreement.
    (1.0 - max_delta / 5.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bayesian::BayesianConfig;
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal_macros::dec;
    use wx_core::decimal::{Probability, Temperature};
    use wx_core::market::{Comparison, MarketId, MetricType};
    use wx_core::run_record::RunRecord;
    use wx_core::units::Unit;

    fn market(target_date: NaiveDate) -> Market {
        Market {
            market_id: MarketId::new("chi-high"),
            city: "Chicago".to_string(),
            metric_type: MetricType::TempHigh,
            comparison: Comparison::Above,
            threshold: Some(Temperature::new(dec!(70.0))),
            min_threshold: None,
            max_threshold: None,
            unit: Unit::Fahrenheit,
            target_date,
            yes_token_id: "yes".to_string(),
            no_token_id: "no".to_string(),
            active: true,
            closed: false,
            yes_price: Probability::new(dec!(0.40)),
            no_price: Probability::new(dec!(0.60)),
        }
    }

    fn seed_runs(store: &RunHistoryStore, city: &str, model: &str, values: &[(i64, f64)]) {
        for (i, (secs, v)) in values.iter().enumerate() {
            store.add_run(RunRecord {
                model: model.to_string(),
                // distinct cycle_hour per seeded run so `add_run`'s dedup
                // key doesn't collapse these into a single observation
                cycle_hour: (i as u8) * 6,
                run_date: NaiveDate::from_ymd_opt(2026, 7, 27).unwrap(),
                city_id: city.to_string(),
                max_temp_c: Some(Temperature::new(Decimal::from_f64_retain(*v).unwrap())),
                precip_flag: false,
                precip_amount_mm: None,
                timestamp: chrono::DateTime::UNIX_EPOCH + chrono::Duration::seconds(*secs),
                source: RunSource::File,
            });
        }
    }

    fn seed_precip_runs(store: &RunHistoryStore, city: &str, model: &str, flags: &[(i64, bool)]) {
        for (i, (secs, flag)) in flags.iter().enumerate() {
            store.add_run(RunRecord {
                model: model.to_string(),
                cycle_hour: (i as u8) * 6,
                run_date: NaiveDate::from_ymd_opt(2026, 7, 27).unwrap(),
                city_id: city.to_string(),
                max_temp_c: None,
                precip_flag: *flag,
                precip_amount_mm: None,
                timestamp: chrono::DateTime::UNIX_EPOCH + chrono::Duration::seconds(*secs),
                source: RunSource::File,
            });
        }
    }

    fn precip_market(target_date: NaiveDate) -> Market {
        let mut m = market(target_date);
        m.metric_type = MetricType::Precipitation;
        m
    }

    #[test]
    fn non_primary_model_cannot_initiate() {
        let store = RunHistoryStore::new(5);
        let strategy = ConfidenceStrategy::new(ConfidenceConfig::default(), BayesianCombiner::new(BayesianConfig::default()));
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let m = market(NaiveDate::from_ymd_opt(2026, 7, 30).unwrap());
        let snapshots = HashMap::new();
        let result = strategy.evaluate(&m, "gfs", &snapshots, &store, now);
        assert_eq!(result.unwrap_err(), ConfidenceRejection::NonPrimaryInitiator);
    }

    #[test]
    fn first_run_never_fires() {
        let store = RunHistoryStore::new(5);
        let strategy = ConfidenceStrategy::new(ConfidenceConfig::default(), BayesianCombiner::new(BayesianConfig::default()));
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let m = market(NaiveDate::from_ymd_opt(2026, 7, 30).unwrap());
        let mut snapshots = HashMap::new();
        snapshots.insert(
            "hrrr".to_string(),
            ForecastSnapshot::new(
                "hrrr",
                12,
                Temperature::new(dec!(75.0)),
                None,
                Comparison::Above,
                Some(Temperature::new(dec!(70.0))),
                None,
                None,
                MetricType::TempHigh,
                now,
                RunSource::File,
            ),
        );
        let result = strategy.evaluate(&m, "hrrr", &snapshots, &store, now);
        assert_eq!(result.unwrap_err(), ConfidenceRejection::FirstRun);
    }

    #[test]
    fn stable_agreeing_ensemble_emits_signal() {
        let store = RunHistoryStore::new(5);
        seed_runs(&store, "Chicago", "hrrr", &[(0, 75.0), (3600, 75.1), (7200, 75.0)]);
        let strategy = ConfidenceStrategy::new(ConfidenceConfig::default(), BayesianCombiner::new(BayesianConfig::default()));
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let m = market(NaiveDate::from_ymd_opt(2026, 7, 30).unwrap());
        let mut snapshots = HashMap::new();
        snapshots.insert(
            "hrrr".to_string(),
            ForecastSnapshot::new(
                "hrrr",
                12,
                Temperature::new(dec!(78.0)),
                None,
                Comparison::Above,
                Some(Temperature::new(dec!(70.0))),
                None,
                None,
                MetricType::TempHigh,
                now,
                RunSource::File,
            ),
        );
        let result = strategy.evaluate(&m, "hrrr", &snapshots, &store, now);
        assert!(result.is_ok());
    }

    #[test]
    fn unstable_runs_are_rejected() {
        let store = RunHistoryStore::new(5);
        seed_runs(&store, "Chicago", "hrrr", &[(0, 70.0), (3600, 78.0)]);
        let strategy = ConfidenceStrategy::new(ConfidenceConfig::default(), BayesianCombiner::new(BayesianConfig::default()));
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let m = market(NaiveDate::from_ymd_opt(2026, 7, 30).unwrap());
        let mut snapshots = HashMap::new();
        snapshots.insert(
            "hrrr".to_string(),
            ForecastSnapshot::new(
                "hrrr",
                12,
                Temperature::new(dec!(78.0)),
                None,
                Comparison::Above,
                Some(Temperature::new(dec!(70.0))),
                None,
                None,
                MetricType::TempHigh,
                now,
                RunSource::File,
            ),
        );
        let result = strategy.evaluate(&m, "hrrr", &snapshots, &store, now);
        assert_eq!(result.unwrap_err(), ConfidenceRejection::Unstable);
    }

    #[test]
    fn precip_market_with_consistent_flag_is_stable() {
        let store = RunHistoryStore::new(5);
        seed_precip_runs(&store, "Chicago", "hrrr", &[(0, true), (3600, true), (7200, true)]);
        let strategy = ConfidenceStrategy::new(ConfidenceConfig::default(), BayesianCombiner::new(BayesianConfig::default()));
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let m = precip_market(NaiveDate::from_ymd_opt(2026, 7, 30).unwrap());
        let mut snapshots = HashMap::new();
        snapshots.insert(
            "hrrr".to_string(),
            ForecastSnapshot::new(
                "hrrr",
                12,
                Temperature::new(dec!(78.0)),
                None,
                Comparison::Above,
                Some(Temperature::new(dec!(70.0))),
                None,
                None,
                MetricType::Precipitation,
                now,
                RunSource::File,
            ),
        );
        let result = strategy.evaluate(&m, "hrrr", &snapshots, &store, now);
        assert!(result.is_ok());
    }

    #[test]
    fn precip_market_with_flipping_flag_is_unstable() {
        let store = RunHistoryStore::new(5);
        seed_precip_runs(&store, "Chicago", "hrrr", &[(0, true), (3600, false)]);
        let strategy = ConfidenceStrategy::new(ConfidenceConfig::default(), BayesianCombiner::new(BayesianConfig::default()));
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let m = precip_market(NaiveDate::from_ymd_opt(2026, 7, 30).unwrap());
        let mut snapshots = HashMap::new();
        snapshots.insert(
            "hrrr".to_string(),
            ForecastSnapshot::new(
                "hrrr",
                12,
                Temperature::new(dec!(78.0)),
                None,
                Comparison::Above,
                Some(Temperature::new(dec!(70.0))),
                None,
                None,
                MetricType::Precipitation,
                now,
                RunSource::File,
            ),
        );
        let result = strategy.evaluate(&m, "hrrr", &snapshots, &store, now);
        assert_eq!(result.unwrap_err(), ConfidenceRejection::Unstable);
    }
}
