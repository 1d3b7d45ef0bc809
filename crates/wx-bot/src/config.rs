//! Application configuration.
//!
//! Follows the typed-config-tree idiom of the teacher's `AppConfig`: each
//! section gets its own `#[serde(default = "fn")]`-backed struct, and
//! `AppConfig` owns one section per long-lived component. Crate configs
//! that already derive `Serialize`/`Deserialize` (`DetectorConfig`) are
//! embedded directly; the others don't carry serde impls of their own, so
//! this module defines a serializable shadow of their tunables and
//! converts on `Application::new`.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration as StdDuration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use wx_core::market::Market;
use wx_detector::{CityPoint, DetectorConfig};
use wx_signal::confidence::Region;

use crate::error::{AppError, AppResult};

/// Whether the process trades against a real venue or the in-memory
/// `SimulationExchange`/`SimulationObjectStore`/`SimulationGribBackend`
/// trio (SPEC_FULL §9).
fn default_simulate() -> bool {
    true
}

fn default_tick_interval_ms() -> u64 {
    250
}

/// How long `SimulationObjectStore` waits, from process start, before
/// reporting a file as published (SPEC_FULL §9).
fn default_simulation_publish_delay_ms() -> u64 {
    2_000
}

/// A city the detector should extract scalars for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitySeed {
    pub city: String,
    pub lat: f64,
    pub lon: f64,
    /// `"us"` | `"europe"` | `"global"`, consumed by `ConfidenceStrategy`'s
    /// region map. Defaults to `"global"` if omitted.
    #[serde(default = "default_region_str")]
    pub region: String,
}

fn default_region_str() -> String {
    "global".to_string()
}

impl CitySeed {
    pub fn to_city_point(&self) -> CityPoint {
        CityPoint {
            city: self.city.clone(),
            lat: self.lat,
            lon: self.lon,
        }
    }

    pub fn region(&self) -> Region {
        match self.region.to_ascii_lowercase().as_str() {
            "us" => Region::Us,
            "europe" => Region::Europe,
            _ => Region::Global,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbiterSettings {
    #[serde(default = "default_max_fallback_duration_secs")]
    pub max_fallback_duration_secs: u64,
}

fn default_max_fallback_duration_secs() -> u64 {
    5 * 60
}

impl Default for ArbiterSettings {
    fn default() -> Self {
        Self {
            max_fallback_duration_secs: default_max_fallback_duration_secs(),
        }
    }
}

impl ArbiterSettings {
    pub fn to_arbiter_config(&self) -> wx_arbiter::ArbiterConfig {
        wx_arbiter::ArbiterConfig {
            max_fallback_duration: StdDuration::from_secs(self.max_fallback_duration_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedSettings {
    #[serde(default = "default_max_crossing_age_ms")]
    pub max_crossing_age_ms: i64,
    #[serde(default = "default_min_edge")]
    pub min_edge: Decimal,
    #[serde(default = "default_speed_max_position_usdc")]
    pub max_position_usdc: Decimal,
    #[serde(default = "default_position_multiplier")]
    pub position_multiplier: f64,
}

fn default_max_crossing_age_ms() -> i64 {
    120_000
}

fn default_min_edge() -> Decimal {
    Decimal::new(2, 2)
}

fn default_speed_max_position_usdc() -> Decimal {
    Decimal::from(500)
}

fn default_position_multiplier() -> f64 {
    1.5
}

impl Default for SpeedSettings {
    fn default() -> Self {
        Self {
            max_crossing_age_ms: default_max_crossing_age_ms(),
            min_edge: default_min_edge(),
            max_position_usdc: default_speed_max_position_usdc(),
            position_multiplier: default_position_multiplier(),
        }
    }
}

impl SpeedSettings {
    pub fn to_speed_config(&self) -> wx_signal::SpeedConfig {
        wx_signal::SpeedConfig {
            max_crossing_age_ms: self.max_crossing_age_ms,
            min_edge: self.min_edge,
            max_position_usdc: self.max_position_usdc,
            position_multiplier: self.position_multiplier,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceSettings {
    #[serde(default = "default_stability_runs")]
    pub stability_runs: usize,
    #[serde(default = "default_temp_stability_threshold_f")]
    pub temp_stability_threshold_f: f64,
    #[serde(default = "default_confidence_gate")]
    pub confidence_gate: f64,
    #[serde(default = "default_weight_stability")]
    pub weight_stability: f64,
    #[serde(default = "default_weight_agreement")]
    pub weight_agreement: f64,
    #[serde(default = "default_confidence_max_position_usdc")]
    pub max_position_usdc: Decimal,
}

fn default_stability_runs() -> usize {
    5
}

fn default_temp_stability_threshold_f() -> f64 {
    0.3 * 1.8
}

fn default_confidence_gate() -> f64 {
    0.50
}

fn default_weight_stability() -> f64 {
    0.30
}

fn default_weight_agreement() -> f64 {
    0.30
}

fn default_confidence_max_position_usdc() -> Decimal {
    Decimal::from(500)
}

impl Default for ConfidenceSettings {
    fn default() -> Self {
        Self {
            stability_runs: default_stability_runs(),
            temp_stability_threshold_f: default_temp_stability_threshold_f(),
            confidence_gate: default_confidence_gate(),
            weight_stability: default_weight_stability(),
            weight_agreement: default_weight_agreement(),
            max_position_usdc: default_confidence_max_position_usdc(),
        }
    }
}

impl ConfidenceSettings {
    pub fn to_confidence_config(&self, cities: &[CitySeed]) -> wx_signal::ConfidenceConfig {
        let region_map: HashMap<String, Region> = cities
            .iter()
            .map(|c| (c.city.clone(), c.region()))
            .collect();
        let defaults = wx_signal::ConfidenceConfig::default();
        wx_signal::ConfidenceConfig {
            region_map,
            default_region: Region::Global,
            stability_runs: self.stability_runs,
            temp_stability_threshold_f: self.temp_stability_threshold_f,
            confidence_gate: self.confidence_gate,
            weight_stability: self.weight_stability,
            weight_agreement: self.weight_agreement,
            max_position_usdc: self.max_position_usdc,
            ..defaults
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BayesianSettings {
    #[serde(default = "default_certainty_sigma_threshold")]
    pub certainty_sigma_threshold: f64,
}

fn default_certainty_sigma_threshold() -> f64 {
    3.0
}

impl Default for BayesianSettings {
    fn default() -> Self {
        Self {
            certainty_sigma_threshold: default_certainty_sigma_threshold(),
        }
    }
}

impl BayesianSettings {
    pub fn to_bayesian_config(&self) -> wx_signal::BayesianConfig {
        let defaults = wx_signal::BayesianConfig::default();
        wx_signal::BayesianConfig {
            certainty_sigma_threshold: self.certainty_sigma_threshold,
            ..defaults
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorSettings {
    #[serde(default = "default_slippage_tolerance")]
    pub slippage_tolerance: Decimal,
    #[serde(default = "default_price_chase_diff")]
    pub price_chase_diff: Decimal,
    #[serde(default = "default_price_chase_ratio")]
    pub price_chase_ratio: Decimal,
    #[serde(default = "default_trade_cooldown_ms")]
    pub trade_cooldown_ms: i64,
    #[serde(default = "default_guaranteed_multiplier")]
    pub guaranteed_multiplier: Decimal,
    #[serde(default = "default_limit_offset")]
    pub limit_offset: Decimal,
    #[serde(default = "default_guaranteed_limit_offset")]
    pub guaranteed_limit_offset: Decimal,
    #[serde(default = "default_max_limit_price")]
    pub max_limit_price: Decimal,
    #[serde(default = "default_executor_max_position_usdc")]
    pub max_position_usdc: Decimal,
    #[serde(default = "default_batch_pacing_ms")]
    pub batch_pacing_ms: u64,
}

fn default_slippage_tolerance() -> Decimal {
    Decimal::new(5, 2)
}

fn default_price_chase_diff() -> Decimal {
    Decimal::new(5, 2)
}

fn default_price_chase_ratio() -> Decimal {
    Decimal::new(110, 2)
}

fn default_trade_cooldown_ms() -> i64 {
    60_000
}

fn default_guaranteed_multiplier() -> Decimal {
    Decimal::new(150, 2)
}

fn default_limit_offset() -> Decimal {
    Decimal::new(1, 2)
}

fn default_guaranteed_limit_offset() -> Decimal {
    Decimal::new(5, 2)
}

fn default_max_limit_price() -> Decimal {
    Decimal::new(99, 2)
}

fn default_executor_max_position_usdc() -> Decimal {
    Decimal::from(500)
}

fn default_batch_pacing_ms() -> u64 {
    1_000
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            slippage_tolerance: default_slippage_tolerance(),
            price_chase_diff: default_price_chase_diff(),
            price_chase_ratio: default_price_chase_ratio(),
            trade_cooldown_ms: default_trade_cooldown_ms(),
            guaranteed_multiplier: default_guaranteed_multiplier(),
            limit_offset: default_limit_offset(),
            guaranteed_limit_offset: default_guaranteed_limit_offset(),
            max_limit_price: default_max_limit_price(),
            max_position_usdc: default_executor_max_position_usdc(),
            batch_pacing_ms: default_batch_pacing_ms(),
        }
    }
}

impl ExecutorSettings {
    pub fn to_executor_config(&self) -> wx_executor::ExecutorConfig {
        wx_executor::ExecutorConfig {
            slippage_tolerance: self.slippage_tolerance,
            price_chase_diff: self.price_chase_diff,
            price_chase_ratio: self.price_chase_ratio,
            trade_cooldown_ms: self.trade_cooldown_ms,
            guaranteed_multiplier: self.guaranteed_multiplier,
            limit_offset: self.limit_offset,
            guaranteed_limit_offset: self.guaranteed_limit_offset,
            max_limit_price: self.max_limit_price,
            max_position_usdc: self.max_position_usdc,
            batch_pacing: StdDuration::from_millis(self.batch_pacing_ms),
        }
    }
}

/// Telemetry configuration: metrics port and log level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_port: default_metrics_port(),
            log_level: default_log_level(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Run against the in-memory simulation trio instead of real venues
    /// and object stores (SPEC_FULL §9).
    #[serde(default = "default_simulate")]
    pub simulate: bool,
    /// How often the clock-tick loop calls `ScheduleManager::tick`.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Simulated publish delay fed to `SimulationObjectStore`, only
    /// consulted when `simulate` is true.
    #[serde(default = "default_simulation_publish_delay_ms")]
    pub simulation_publish_delay_ms: u64,
    /// Cities the detector extracts scalars for.
    #[serde(default)]
    pub cities: Vec<CitySeed>,
    /// Markets seeded into `DataStore` at startup.
    #[serde(default)]
    pub markets: Vec<Market>,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub arbiter: ArbiterSettings,
    #[serde(default)]
    pub speed: SpeedSettings,
    #[serde(default)]
    pub confidence: ConfidenceSettings,
    #[serde(default)]
    pub bayesian: BayesianSettings,
    #[serde(default)]
    pub executor: ExecutorSettings,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            simulate: default_simulate(),
            tick_interval_ms: default_tick_interval_ms(),
            simulation_publish_delay_ms: default_simulation_publish_delay_ms(),
            cities: Vec::new(),
            markets: Vec::new(),
            detector: DetectorConfig::default(),
            arbiter: ArbiterSettings::default(),
            speed: SpeedSettings::default(),
            confidence: ConfidenceSettings::default(),
            bayesian: BayesianSettings::default(),
            executor: ExecutorSettings::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from `WX_BOT_CONFIG` env var, falling back to
    /// `config/default.toml`, falling back to `Self::default()` with a
    /// warning if neither exists.
    pub fn load() -> AppResult<Self> {
        let config_path =
            std::env::var("WX_BOT_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());

        if Path::new(&config_path).exists() {
            Self::from_file(&config_path)
        } else {
            tracing::warn!(path = %config_path, "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("failed to read config: {e}")))?;
        toml::from_str(&content).map_err(|e| AppError::Config(format!("failed to parse config: {e}")))
    }
}
