//! Core domain types for the weather-derivative trading pipeline.
//!
//! This crate provides the fundamental entities shared by every other crate
//! in the workspace:
//! - `Temperature`, `Probability`: precision-safe numeric newtypes
//! - `Market`, `MarketKey`, `MetricType`, `Comparison`: market identity and shape
//! - `PricePoint`, `PriceHistory`: per-token price series and velocity
//! - `ForecastSnapshot`: a single model-or-API forecast observation
//! - `RunRecord`: one model run's extracted scalars for one city
//! - `DetectionWindow`: the scheduling/detection state machine
//! - `Trace`: end-to-end latency timestamps
//! - `MarketExchange`: the opaque trading-venue collaborator trait

pub mod decimal;
pub mod error;
pub mod exchange;
pub mod forecast;
pub mod market;
pub mod price_history;
pub mod run_record;
pub mod trace;
pub mod units;
pub mod window;

pub use decimal::{Probability, Temperature};
pub use error::{CoreError, Result};
pub use exchange::{MarketExchange, OrderRequest, OrderResult, OrderTypeReq};
pub use forecast::{ForecastSnapshot, ThresholdPosition};
pub use market::{Comparison, Market, MarketId, MetricType};
pub use price_history::{PricePoint, PriceHistory, TokenSide};
pub use run_record::{RunRecord, RunSource};
pub use trace::Trace;
pub use units::Unit;
pub use window::{DetectionWindow, WindowStatus};
