//! Per-model publication scheduling and detection-window computation.
//!
//! `ScheduleManager` is pure, clock-driven computation: given the static
//! per-model config table, it resolves object-store locations, detection
//! windows, and upcoming runs, and fires `DETECTION_WINDOW_START` windows
//! as the clock reaches them. It holds no network state; `wx-detector`
//! owns the actual polling.

pub mod config;
pub mod error;
pub mod schedule;

pub use config::{default_model_configs, Model, ModelConfig};
pub use error::{ScheduleError, ScheduleResult};
pub use schedule::{ExpectedFile, Schedule, ScheduleManager};
