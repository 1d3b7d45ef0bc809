//! Per-event latency trace, threaded through the pipeline from detection to
//! order submission (SPEC_FULL §4.5, §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named checkpoints a trace can be stamped at, in pipeline order. Using an
/// enum (rather than free-form strings) keeps `LatencyTracker`'s percentile
/// buckets keyed consistently across the whole workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStage {
    ModelPublished,
    Detected,
    Extracted,
    Arbitrated,
    Stored,
    SignalEmitted,
    OrderSubmitted,
}

/// A single detection/signal/order's timestamps, keyed by pipeline stage.
///
/// Stamping is append-only: a stage already present is never overwritten,
/// so a trace records the first time each stage was reached.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trace {
    pub id: String,
    stamps: BTreeMap<TraceStage, DateTime<Utc>>,
}

impl Trace {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            stamps: BTreeMap::new(),
        }
    }

    pub fn stamp(&mut self, stage: TraceStage, at: DateTime<Utc>) {
        self.stamps.entry(stage).or_insert(at);
    }

    pub fn get(&self, stage: TraceStage) -> Option<DateTime<Utc>> {
        self.stamps.get(&stage).copied()
    }

    /// Milliseconds between two stamped stages, or `None` if either is
    /// missing.
    pub fn latency_ms(&self, from: TraceStage, to: TraceStage) -> Option<i64> {
        let start = self.get(from)?;
        let end = self.get(to)?;
        Some((end - start).num_milliseconds())
    }

    /// End-to-end latency from model publication to order submission, the
    /// headline metric this whole pipeline is optimizing (SPEC_FULL §1).
    pub fn end_to_end_ms(&self) -> Option<i64> {
        self.latency_ms(TraceStage::ModelPublished, TraceStage::OrderSubmitted)
    }
}
