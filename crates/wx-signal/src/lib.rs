//! Forecast-to-probability combination and entry-signal generation.
//!
//! - `bayesian`: bias-corrected, horizon-weighted ensemble combiner (C9)
//! - `speed`: threshold-crossing detector (C10)
//! - `confidence`: model-hierarchy/stability-gated strategy (C11)
//! - `stats`/`sizing`: shared numerical helpers used by all three

pub mod bayesian;
pub mod confidence;
pub mod error;
pub mod signal;
pub mod sizing;
pub mod speed;
pub mod stats;

pub use bayesian::{BayesianCombiner, BayesianConfig, BayesianOutcome, ForecastInput, HorizonBucket, ModelProfile};
pub use confidence::{hierarchy_for, ConfidenceConfig, ConfidenceRejection, ConfidenceStrategy, Region, RegionHierarchy};
pub use error::{SignalError, SignalResult};
pub use signal::{EntrySignal, Side, Urgency};
pub use speed::{SpeedConfig, SpeedRejection, SpeedStrategy};
