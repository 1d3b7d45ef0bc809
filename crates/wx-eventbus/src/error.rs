//! Event bus error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("unknown subscription: {0}")]
    UnknownSubscription(u64),
}

pub type EventBusResult<T> = Result<T, EventBusError>;
