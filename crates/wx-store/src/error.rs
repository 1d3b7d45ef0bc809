//! Store error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("market not found: {0}")]
    MarketNotFound(String),

    #[error("unknown token: {0}")]
    UnknownToken(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
