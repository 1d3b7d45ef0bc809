//! Schedule manager error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;
