//! Structured logging and Prometheus metrics for the weather trading
//! pipeline (SPEC_FULL §10.1, §10.4).

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
