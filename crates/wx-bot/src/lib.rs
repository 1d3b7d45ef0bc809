//! Weather-derivative trading pipeline: process entry point and component
//! wiring.
//!
//! This crate owns no trading logic of its own — every algorithm lives in
//! the `wx-*` library crates. `Application` (C0, SPEC_FULL §4) is purely
//! plumbing: it constructs each component, subscribes to the events that
//! cross component boundaries, and drives the clock that opens detection
//! windows.

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
