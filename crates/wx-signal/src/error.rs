//! Signal engine error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("unknown region: {0}")]
    UnknownRegion(String),

    #[error("missing profile for model: {0}")]
    MissingProfile(String),

    #[error("empty forecast input set")]
    EmptyInput,
}

pub type SignalResult<T> = Result<T, SignalError>;
