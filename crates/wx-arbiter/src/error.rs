//! Arbiter error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArbiterError {
    #[error("store error: {0}")]
    Store(#[from] wx_store::StoreError),
}

pub type ArbiterResult<T> = Result<T, ArbiterError>;
