//! Error types for wx-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid temperature: {0}")]
    InvalidTemperature(String),

    #[error("invalid probability: {0}")]
    InvalidProbability(String),

    #[error("invalid market: {0}")]
    InvalidMarket(String),

    #[error("decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unsupported unit conversion: {0} -> {1}")]
    UnsupportedUnit(String, String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
