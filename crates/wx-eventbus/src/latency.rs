//! `LatencyTracker` (C5): per-trace timestamp recording and percentile
//! latency statistics.
//!
//! The percentile computation (sort a snapshot, index by rank) and the
//! TTL-gated stats cache are grounded on `hip3-mm/volatility.rs`'s wick
//! percentile tracker, repurposed from basis-point wicks to end-to-end
//! pipeline latencies.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use wx_core::trace::{Trace, TraceStage};

const COMPLETED_RING_CAPACITY: usize = 1000;
const STATS_CACHE_TTL: Duration = Duration::seconds(1);

/// Loudly logged when a completed trace's end-to-end latency exceeds this
/// threshold (SPEC_FULL §4.5).
pub const SLOW_TRACE_THRESHOLD_MS: i64 = 2000;

#[derive(Debug, Clone, Default)]
pub struct LatencyStats {
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub count: usize,
    pub per_stage_avg_ms: HashMap<&'static str, f64>,
}

struct CachedStats {
    stats: LatencyStats,
    computed_at: DateTime<Utc>,
    count_at_compute: usize,
}

pub struct LatencyTracker {
    active: DashMap<String, Trace>,
    completed: RwLock<VecDeque<Trace>>,
    cache: RwLock<Option<CachedStats>>,
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self {
            active: DashMap::new(),
            completed: RwLock::new(VecDeque::with_capacity(COMPLETED_RING_CAPACITY)),
            cache: RwLock::new(None),
        }
    }

    pub fn start(&self, trace_id: impl Into<String>) {
        let trace_id = trace_id.into();
        self.active.insert(trace_id.clone(), Trace::new(trace_id));
    }

    pub fn record(&self, trace_id: &str, stage: TraceStage, at: DateTime<Utc>) {
        if let Some(mut trace) = self.active.get_mut(trace_id) {
            trace.stamp(stage, at);
        }
    }

    /// Move a trace out of the active map into the completed ring, logging
    /// loudly if its end-to-end latency exceeds `SLOW_TRACE_THRESHOLD_MS`.
    pub fn complete(&self, trace_id: &str) -> Option<Trace> {
        let (_, trace) = self.active.remove(trace_id)?;

        if let Some(latency) = trace.end_to_end_ms() {
            if latency > SLOW_TRACE_THRESHOLD_MS {
                tracing::warn!(
                    trace_id = %trace.id,
                    latency_ms = latency,
                    "slow trace exceeded threshold"
                );
            }
        }

        {
            let mut completed = self.completed.write();
            if completed.len() == COMPLETED_RING_CAPACITY {
                completed.pop_front();
            }
            completed.push_back(trace.clone());
        }
        *self.cache.write() = None;

        Some(trace)
    }

    pub fn get_stats(&self, now: DateTime<Utc>) -> LatencyStats {
        {
            let cache = self.cache.read();
            if let Some(cached) = cache.as_ref() {
                let completed_len = self.completed.read().len();
                if now - cached.computed_at < STATS_CACHE_TTL
                    && cached.count_at_compute == completed_len
                {
                    return cached.stats.clone();
                }
            }
        }

        let completed = self.completed.read();
        let stats = Self::compute_stats(&completed);
        let count = completed.len();
        drop(completed);

        *self.cache.write() = Some(CachedStats {
            stats: stats.clone(),
            computed_at: now,
            count_at_compute: count,
        });

        stats
    }

    fn compute_stats(completed: &VecDeque<Trace>) -> LatencyStats {
        let mut totals: Vec<i64> = completed.iter().filter_map(|t| t.end_to_end_ms()).collect();
        if totals.is_empty() {
            return LatencyStats::default();
        }
        totals.sort_unstable();
        let n = totals.len();

        let percentile = |p: f64| -> f64 {
            if n == 1 {
                return totals[0] as f64;
            }
            let idx = (p / 100.0 * (n - 1) as f64).round() as usize;
            totals[idx.min(n - 1)] as f64
        };

        let avg = totals.iter().sum::<i64>() as f64 / n as f64;

        let stage_pairs: [(&'static str, TraceStage, TraceStage); 5] = [
            ("detection", TraceStage::ModelPublished, TraceStage::Detected),
            ("parse", TraceStage::Detected, TraceStage::Extracted),
            ("event", TraceStage::Extracted, TraceStage::Stored),
            ("strategy", TraceStage::Stored, TraceStage::SignalEmitted),
            (
                "execution",
                TraceStage::SignalEmitted,
                TraceStage::OrderSubmitted,
            ),
        ];

        let mut per_stage_avg_ms = HashMap::new();
        for (label, from, to) in stage_pairs {
            let values: Vec<i64> = completed
                .iter()
                .filter_map(|t| t.latency_ms(from, to))
                .collect();
            if !values.is_empty() {
                let stage_avg = values.iter().sum::<i64>() as f64 / values.len() as f64;
                per_stage_avg_ms.insert(label, stage_avg);
            }
        }

        LatencyStats {
            avg_ms: avg,
            p50_ms: percentile(50.0),
            p95_ms: percentile(95.0),
            p99_ms: percentile(99.0),
            count: n,
            per_stage_avg_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(ms: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + Duration::milliseconds(ms)
    }

    #[test]
    fn complete_moves_trace_from_active_to_ring() {
        let tracker = LatencyTracker::new();
        tracker.start("abc");
        tracker.record("abc", TraceStage::ModelPublished, t(0));
        tracker.record("abc", TraceStage::OrderSubmitted, t(120));
        let trace = tracker.complete("abc").unwrap();
        assert_eq!(trace.end_to_end_ms(), Some(120));
        assert!(tracker.complete("abc").is_none());
    }

    #[test]
    fn stats_empty_with_no_completed_traces() {
        let tracker = LatencyTracker::new();
        let stats = tracker.get_stats(Utc::now());
        assert_eq!(stats.count, 0);
    }

    #[test]
    fn percentiles_computed_over_completed_traces() {
        let tracker = LatencyTracker::new();
        for (i, latency) in [100, 200, 300, 400, 500].into_iter().enumerate() {
            let id = format!("trace-{i}");
            tracker.start(&id);
            tracker.record(&id, TraceStage::ModelPublished, t(0));
            tracker.record(&id, TraceStage::OrderSubmitted, t(latency));
            tracker.complete(&id);
        }
        let stats = tracker.get_stats(t(10_000));
        assert_eq!(stats.count, 5);
        assert_eq!(stats.p50_ms, 300.0);
    }
}
