//! Detector/extractor error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("not found")]
    NotFound,

    #[error("idx sidecar parse error: {0}")]
    IdxParse(String),

    #[error("grib decode error: {0}")]
    Decode(String),

    #[error("detection timed out")]
    Timeout,
}

pub type DetectorResult<T> = Result<T, DetectorError>;
