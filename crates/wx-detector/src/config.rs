//! Detector resource/polling configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub poll_interval_ms: u64,
    pub idx_retry_attempts: u32,
    pub idx_retry_backoff_ms: u64,
    /// Bounded keep-alive pool size for the object-store HTTP client.
    pub max_idle_connections: usize,
    /// Fixed concurrency bound for per-variable fallback extraction when
    /// batch extraction is unavailable.
    pub fallback_extract_concurrency: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 150,
            idx_retry_attempts: 3,
            idx_retry_backoff_ms: 150,
            max_idle_connections: 25,
            fallback_extract_concurrency: 4,
        }
    }
}

impl DetectorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn idx_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.idx_retry_backoff_ms)
    }
}
