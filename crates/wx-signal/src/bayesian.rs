//! Bias-corrected, horizon-weighted ensemble combiner (C9, SPEC_FULL §4.9).
//!
//! Converts one or more per-model forecast values for a market into
//! `P(outcome = YES)`, following the same "typed config profile, not a
//! hardcoded match arm" idiom the teacher uses for its per-venue risk
//! profiles (`hip3-risk/gates.rs`'s `RiskConfig`).

use crate::error::{SignalError, SignalResult};
use crate::stats::{normal_cdf, std_dev};
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use wx_core::decimal::{Probability, Temperature};
use wx_core::market::{Comparison, Market};

/// Horizon bucket a forecast falls into, used to pick the bias-correction
/// entry from a `ModelProfile` (SPEC_FULL §4.9 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizonBucket {
    /// `h ≤ 24h`
    Short,
    /// `24h < h ≤ 72h`
    Medium,
    /// `h > 72h`
    Long,
}

impl HorizonBucket {
    pub fn from_hours(h: f64) -> Self {
        if h <= 24.0 {
            HorizonBucket::Short
        } else if h <= 72.0 {
            HorizonBucket::Medium
        } else {
            HorizonBucket::Long
        }
    }
}

/// Static (but configurable) per-model, per-variable skill and bias
/// parameters. Known profiles: HRRR (small warm bias short-range), GFS
/// (larger cold bias winter), ECMWF (lowest variance), RAP (smoothing
/// bias).
#[derive(Debug, Clone)]
pub struct ModelProfile {
    /// Bias by horizon bucket: temperature bias is additive (°F), applied
    /// as `v' = v - bias`; precipitation bias is multiplicative, applied
    /// as `v' = v / (1 + bias)`.
    pub bias_short: f64,
    pub bias_medium: f64,
    pub bias_long: f64,
    pub precip_bias_is_multiplicative: bool,
    /// Decay rate and optimal horizon feeding `horizonWeight =
    /// exp(-decayRate * d^2 / optimal)` with `d = |h - optimal|`.
    pub decay_rate: f64,
    pub optimal_horizon_hours: f64,
    /// Per-model per-variable skill weight in `[0, 1]`.
    pub skill_weight: f64,
}

impl ModelProfile {
    fn bias_for(&self, bucket: HorizonBucket) -> f64 {
        match bucket {
            HorizonBucket::Short => self.bias_short,
            HorizonBucket::Medium => self.bias_medium,
            HorizonBucket::Long => self.bias_long,
        }
    }
}

impl Default for ModelProfile {
    /// A neutral profile (no bias, mid-pack skill) used for any model
    /// without a dedicated entry.
    fn default() -> Self {
        Self {
            bias_short: 0.0,
            bias_medium: 0.0,
            bias_long: 0.0,
            precip_bias_is_multiplicative: true,
            decay_rate: 0.5,
            optimal_horizon_hours: 48.0,
            skill_weight: 0.7,
        }
    }
}

/// Per-(model, metric) profile table plus the combiner's global tunables.
#[derive(Debug, Clone)]
pub struct BayesianConfig {
    pub profiles: HashMap<String, ModelProfile>,
    pub default_profile: ModelProfile,
    /// Multiplier on single-model sigma used by the guaranteed-outcome
    /// shortcut (SPEC_FULL §4.9 step 8), default 3.
    pub certainty_sigma_threshold: f64,
    /// `λ` weight on corrected-value spread in the combined variance
    /// (step 6), default ≈ 0.5.
    pub lambda_spread: f64,
    /// `baseVariance(h) = v0 + growth * d` for temperature, °F.
    pub base_variance_v0: f64,
    pub base_variance_growth: f64,
    /// Floor applied to the combined (horizon × skill) weight, default 0.1.
    pub weight_floor: f64,
}

impl Default for BayesianConfig {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(
            "hrrr".to_string(),
            ModelProfile {
                bias_short: 0.3,
                bias_medium: 0.1,
                bias_long: 0.0,
                precip_bias_is_multiplicative: true,
                decay_rate: 0.6,
                optimal_horizon_hours: 18.0,
                skill_weight: 0.85,
            },
        );
        profiles.insert(
            "gfs".to_string(),
            ModelProfile {
                bias_short: -0.4,
                bias_medium: -0.6,
                bias_long: -0.3,
                precip_bias_is_multiplicative: true,
                decay_rate: 0.4,
                optimal_horizon_hours: 72.0,
                skill_weight: 0.65,
            },
        );
        profiles.insert(
            "ecmwf".to_string(),
            ModelProfile {
                bias_short: 0.0,
                bias_medium: 0.0,
                bias_long: 0.1,
                precip_bias_is_multiplicative: true,
                decay_rate: 0.3,
                optimal_horizon_hours: 96.0,
                skill_weight: 0.9,
            },
        );
        profiles.insert(
            "rap".to_string(),
            ModelProfile {
                bias_short: 0.1,
                bias_medium: 0.05,
                bias_long: 0.0,
                precip_bias_is_multiplicative: true,
                decay_rate: 0.7,
                optimal_horizon_hours: 12.0,
                skill_weight: 0.7,
            },
        );

        Self {
            profiles,
            default_profile: ModelProfile::default(),
            certainty_sigma_threshold: 3.0,
            lambda_spread: 0.5,
            base_variance_v0: 1.5,
            base_variance_growth: 0.3,
            weight_floor: 0.1,
        }
    }
}

/// One model's raw forecast value for the combiner to fold in.
#[derive(Debug, Clone)]
pub struct ForecastInput {
    pub model: String,
    pub value: Temperature,
}

/// Output of `BayesianCombiner::combine`.
#[derive(Debug, Clone)]
pub struct BayesianOutcome {
    pub probability: Probability,
    pub mu: f64,
    pub sigma: f64,
    /// Set when a single-model input is `≥ certaintySigmaThreshold · σ`
    /// away from the threshold; `probability` is then exactly 0 or 1.
    pub is_guaranteed: bool,
}

pub struct BayesianCombiner {
    config: BayesianConfig,
}

impl BayesianCombiner {
    pub fn new(config: BayesianConfig) -> Self {
        Self { config }
    }

    fn profile_for(&self, model: &str) -> &ModelProfile {
        self.config
            .profiles
            .get(&model.to_lowercase())
            .unwrap_or(&self.config.default_profile)
    }

    /// Runs the 8-step combine algorithm (SPEC_FULL §4.9). `now` is the
    /// wall-clock instant `hoursUntil` is measured from.
    pub fn combine(
        &self,
        market: &Market,
        inputs: &[ForecastInput],
        now: chrono::DateTime<chrono::Utc>,
    ) -> SignalResult<BayesianOutcome> {
        if inputs.is_empty() {
            return Err(SignalError::EmptyInput);
        }

        let horizon_hours = market.hours_until_target(now).max(0.0);
        let bucket = HorizonBucket::from_hours(horizon_hours);
        let is_precip = matches!(
            market.metric_type,
            wx_core::market::MetricType::Precipitation | wx_core::market::MetricType::Snowfall
        );

        let mut corrected = Vec::with_capacity(inputs.len());
        let mut weights = Vec::with_capacity(inputs.len());

        for input in inputs {
            let profile = self.profile_for(&input.model);
            let raw = input
                .value
                .inner()
                .to_f64()
                .ok_or_else(|| SignalError::MissingProfile(input.model.clone()))?;

            let bias = profile.bias_for(bucket);
            let corrected_value = if is_precip && profile.precip_bias_is_multiplicative {
                raw / (1.0 + bias)
            } else {
                raw - bias
            };

            let d = (horizon_hours - profile.optimal_horizon_hours).abs();
            let horizon_weight =
                (-profile.decay_rate * d * d / profile.optimal_horizon_hours.max(1.0)).exp();
            let skill_weight = profile.skill_weight.clamp(0.0, 1.0);
            let combined_weight = (horizon_weight * skill_weight).sqrt().max(self.config.weight_floor);

            let base_variance =
                self.config.base_variance_v0 + self.config.base_variance_growth * d;
            let final_weight = combined_weight / base_variance.max(1e-6);

            corrected.push(corrected_value);
            weights.push(final_weight);
        }

        let weight_sum: f64 = weights.iter().sum();
        let mu = corrected
            .iter()
            .zip(weights.iter())
            .map(|(v, w)| v * w)
            .sum::<f64>()
            / weight_sum.max(1e-9);

        let spread = std_dev(&corrected);
        let combined_variance = 1.0 / weight_sum.max(1e-9) + self.config.lambda_spread * spread * spread;
        let sigma = combined_variance.max(0.0).sqrt();

        let probability = self.probability_for(market, mu, sigma);

        if inputs.len() == 1 {
            let v = corrected[0];
            let threshold_f64 = market.threshold.and_then(|t| t.inner().to_f64());
            if let Some(t) = threshold_f64 {
                let sigma_metric = (self.config.base_variance_v0
                    + self.config.base_variance_growth * horizon_hours)
                    .max(1e-6);
                if (v - t).abs() >= self.config.certainty_sigma_threshold * sigma_metric {
                    let guaranteed_prob = if v >= t {
                        matches!(market.comparison, Comparison::Above)
                    } else {
                        matches!(market.comparison, Comparison::Below)
                    };
                    return Ok(BayesianOutcome {
                        probability: Probability::new(if guaranteed_prob {
                            rust_decimal::Decimal::ONE
                        } else {
                            rust_decimal::Decimal::ZERO
                        }),
                        mu,
                        sigma,
                        is_guaranteed: true,
                    });
                }
            }
        }

        Ok(BayesianOutcome {
            probability,
            mu,
            sigma,
            is_guaranteed: false,
        })
    }

    fn probability_for(&self, market: &Market, mu: f64, sigma: f64) -> Probability {
        let sigma = sigma.max(1e-6);
        let p = match market.comparison {
            Comparison::Above => {
                let t = market
                    .threshold
                    .and_then(|t| t.inner().to_f64())
                    .unwrap_or(mu);
                1.0 - normal_cdf((t - mu) / sigma)
            }
            Comparison::Below => {
                let t = market
                    .threshold
                    .and_then(|t| t.inner().to_f64())
                    .unwrap_or(mu);
                normal_cdf((t - mu) / sigma)
            }
            Comparison::Range => {
                let lo = market
                    .min_threshold
                    .and_then(|t| t.inner().to_f64())
                    .unwrap_or(mu);
                let hi = market
                    .max_threshold
                    .and_then(|t| t.inner().to_f64())
                    .unwrap_or(mu);
                normal_cdf((hi - mu) / sigma) - normal_cdf((lo - mu) / sigma)
            }
        };
        let clamped = p.clamp(0.0, 1.0);
        Probability::new(
            rust_decimal::Decimal::from_f64_retain(clamped).unwrap_or(rust_decimal::Decimal::ZERO),
        )
    }
}
