//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("schedule error: {0}")]
    Schedule(#[from] wx_schedule::ScheduleError),

    #[error("detector error: {0}")]
    Detector(#[from] wx_detector::DetectorError),

    #[error("arbiter error: {0}")]
    Arbiter(#[from] wx_arbiter::ArbiterError),

    #[error("store error: {0}")]
    Store(#[from] wx_store::StoreError),

    #[error("signal error: {0}")]
    Signal(#[from] wx_signal::SignalError),

    #[error("executor error: {0}")]
    Executor(#[from] wx_executor::ExecutorError),

    #[error("telemetry error: {0}")]
    Telemetry(#[from] wx_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
