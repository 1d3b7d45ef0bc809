//! Executor error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("exchange error: {0}")]
    Exchange(#[from] wx_core::exchange::ExchangeError),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
