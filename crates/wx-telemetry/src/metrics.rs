//! Prometheus metrics for the weather trading pipeline (SPEC_FULL §10.4).
//!
//! Registers counters/gauges/histograms for detection latency per model,
//! arbitration outcomes, signal emissions per strategy, edge distribution,
//! executor gate-block counts, and the `LatencyTracker`'s percentile stats.
//! Exposing these over HTTP is the dashboard collaborator's job; this crate
//! only registers and updates them.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent
//! failure. These panics only occur during static initialization, never at
//! runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, register_int_gauge,
    CounterVec, GaugeVec, HistogramVec, IntGauge,
};

/// Detection latency (window start to file detected), per model, in ms.
pub static DETECTION_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "wx_detection_latency_ms",
        "Detection latency from window start to file detected, in milliseconds",
        &["model"],
        vec![
            50.0, 100.0, 150.0, 200.0, 300.0, 500.0, 750.0, 1000.0, 2000.0, 5000.0
        ]
    )
    .unwrap()
});

/// Parse latency (GRIB extraction), per model, in ms.
pub static PARSE_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "wx_parse_latency_ms",
        "GRIB extraction latency in milliseconds",
        &["model"],
        vec![10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap()
});

/// Total end-to-end latency (file detected to order confirmed), in ms.
pub static TOTAL_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "wx_total_latency_ms",
        "Total latency from file detected to order confirmed, in milliseconds",
        &["model"],
        vec![
            100.0, 250.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0, 30000.0
        ]
    )
    .unwrap()
});

/// Detection windows that timed out without a confirmed file.
pub static DETECTION_TIMEOUT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "wx_detection_timeout_total",
        "Total detection windows that missed without a confirmed file",
        &["model"]
    )
    .unwrap()
});

/// Arbitration outcomes, by city and outcome reason.
pub static ARBITRATION_OUTCOME_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "wx_arbitration_outcome_total",
        "Total arbitration outcomes by reason (file_accepted/api_accepted/api_rejected_same_window/file_rejected_not_first)",
        &["city", "reason"]
    )
    .unwrap()
});

/// Signals emitted, by strategy, market, and side.
pub static SIGNAL_EMITTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "wx_signal_emitted_total",
        "Total entry signals emitted by strategy",
        &["strategy", "side", "urgency"]
    )
    .unwrap()
});

/// Signal rejection counts, by strategy and reason (SPEC_FULL §4.10 diagnostics).
pub static SIGNAL_REJECTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "wx_signal_rejected_total",
        "Total candidate signals rejected, by strategy and reason",
        &["strategy", "reason"]
    )
    .unwrap()
});

/// Edge distribution (P(outcome) - priceYes), per strategy.
pub static EDGE: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "wx_edge",
        "Edge distribution (P(outcome) minus market implied probability)",
        &["strategy"],
        vec![
            -0.30, -0.20, -0.10, -0.05, -0.02, 0.0, 0.02, 0.05, 0.10, 0.20, 0.30
        ]
    )
    .unwrap()
});

/// Confidence score distribution (ConfidenceStrategy, §4.11).
pub static CONFIDENCE_SCORE: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "wx_confidence_score",
        "Confidence score distribution from ConfidenceStrategy",
        &["region"],
        vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]
    )
    .unwrap()
});

/// Executor pre-trade gate blocks, by gate name.
pub static EXECUTOR_GATE_BLOCKED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "wx_executor_gate_blocked_total",
        "Total executor pre-trade gate blocks by gate name",
        &["gate"]
    )
    .unwrap()
});

/// Orders submitted and their terminal outcome.
pub static ORDER_OUTCOME_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "wx_order_outcome_total",
        "Total order attempts by terminal outcome",
        &["outcome"]
    )
    .unwrap()
});

/// LatencyTracker percentile stats (SPEC_FULL §4.5), refreshed from a
/// sorted snapshot of the completed-trace ring.
pub static LATENCY_STAGE_P50_MS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "wx_latency_stage_p50_ms",
        "P50 latency per trace stage, in milliseconds",
        &["stage"]
    )
    .unwrap()
});

pub static LATENCY_STAGE_P95_MS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "wx_latency_stage_p95_ms",
        "P95 latency per trace stage, in milliseconds",
        &["stage"]
    )
    .unwrap()
});

pub static LATENCY_STAGE_P99_MS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "wx_latency_stage_p99_ms",
        "P99 latency per trace stage, in milliseconds",
        &["stage"]
    )
    .unwrap()
});

/// Number of completed traces considered in the current stats window.
pub static LATENCY_TRACE_COUNT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "wx_latency_trace_count",
        "Number of completed traces in the current LatencyTracker stats window"
    )
    .unwrap()
});

/// Active detection windows currently open, by status.
pub static DETECTION_WINDOW_ACTIVE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "wx_detection_window_active",
        "Count of detection windows currently in each status",
        &["status"]
    )
    .unwrap()
});

/// Rate limit hits from external providers (SPEC_FULL §7 RateLimitHit).
pub static RATE_LIMIT_HIT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "wx_rate_limit_hit_total",
        "Total rate limit hits by provider",
        &["provider"]
    )
    .unwrap()
});

/// Metrics facade for easy access, mirroring the workspace's ambient
/// metrics module shape.
pub struct Metrics;

impl Metrics {
    /// Record detection latency for a model.
    pub fn detection_latency(model: &str, latency_ms: f64) {
        DETECTION_LATENCY_MS
            .with_label_values(&[model])
            .observe(latency_ms);
    }

    /// Record GRIB parse latency for a model.
    pub fn parse_latency(model: &str, latency_ms: f64) {
        PARSE_LATENCY_MS
            .with_label_values(&[model])
            .observe(latency_ms);
    }

    /// Record total end-to-end latency for a model.
    pub fn total_latency(model: &str, latency_ms: f64) {
        TOTAL_LATENCY_MS
            .with_label_values(&[model])
            .observe(latency_ms);
    }

    /// Record a detection window timeout (MISSED).
    pub fn detection_timeout(model: &str) {
        DETECTION_TIMEOUT_TOTAL.with_label_values(&[model]).inc();
    }

    /// Record an arbitration outcome for a city.
    pub fn arbitration_outcome(city: &str, reason: &str) {
        ARBITRATION_OUTCOME_TOTAL
            .with_label_values(&[city, reason])
            .inc();
    }

    /// Record a signal emission from a strategy.
    pub fn signal_emitted(strategy: &str, side: &str, urgency: &str) {
        SIGNAL_EMITTED_TOTAL
            .with_label_values(&[strategy, side, urgency])
            .inc();
    }

    /// Record a signal rejection from a strategy, with a reason tag.
    pub fn signal_rejected(strategy: &str, reason: &str) {
        SIGNAL_REJECTED_TOTAL
            .with_label_values(&[strategy, reason])
            .inc();
    }

    /// Record an edge observation for a strategy.
    pub fn edge_observed(strategy: &str, edge: f64) {
        EDGE.with_label_values(&[strategy]).observe(edge);
    }

    /// Record a confidence score observation for a region.
    pub fn confidence_score(region: &str, score: f64) {
        CONFIDENCE_SCORE.with_label_values(&[region]).observe(score);
    }

    /// Record an executor gate block.
    pub fn gate_blocked(gate: &str) {
        EXECUTOR_GATE_BLOCKED_TOTAL.with_label_values(&[gate]).inc();
    }

    /// Record a terminal order outcome.
    pub fn order_outcome(outcome: &str) {
        ORDER_OUTCOME_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Update the LatencyTracker percentile gauges for one stage.
    pub fn latency_stage_stats(stage: &str, p50_ms: f64, p95_ms: f64, p99_ms: f64) {
        LATENCY_STAGE_P50_MS.with_label_values(&[stage]).set(p50_ms);
        LATENCY_STAGE_P95_MS.with_label_values(&[stage]).set(p95_ms);
        LATENCY_STAGE_P99_MS.with_label_values(&[stage]).set(p99_ms);
    }

    /// Update the completed-trace count considered by the stats window.
    pub fn latency_trace_count(count: i64) {
        LATENCY_TRACE_COUNT.set(count);
    }

    /// Update the count of detection windows in a given status.
    pub fn detection_window_active(status: &str, count: f64) {
        DETECTION_WINDOW_ACTIVE.with_label_values(&[status]).set(count);
    }

    /// Record a rate limit hit from an external provider.
    pub fn rate_limit_hit(provider: &str) {
        RATE_LIMIT_HIT_TOTAL.with_label_values(&[provider]).inc();
    }
}
