//! Typed event catalog carried on the bus (SPEC_FULL §4.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wx_core::decimal::{Probability, Temperature};
use wx_core::forecast::ForecastSnapshot;
use wx_core::market::MarketId;

/// Subscription key. One entry per catalog member in SPEC_FULL §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    ForecastTrigger,
    FetchModeEnter,
    FetchModeExit,
    ProviderFetch,
    ForecastChanged,
    FileDetected,
    FileConfirmed,
    DetectionWindowStart,
    ApiDataReceived,
    ForecastChange,
    ForecastUpdated,
    ForecastBatchUpdated,
    RateLimitHit,
    EarlyTriggerMode,
}

/// Confidence carried on forecast-update events: `HIGH` iff the value came
/// from the authoritative file path (SPEC_FULL §4.6 rule 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    High,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDetectedPayload {
    pub model: String,
    pub cycle_hour: u8,
    pub detected_at: DateTime<Utc>,
    pub detection_latency_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfirmedPayload {
    pub model: String,
    pub cycle_hour: u8,
    pub city: String,
    pub value: Temperature,
    pub precip_flag: bool,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiDataReceivedPayload {
    pub provider: String,
    pub model: String,
    pub cycle_hour: u8,
    pub city: String,
    pub value: Temperature,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastUpdatedPayload {
    pub market_id: MarketId,
    pub city: String,
    pub snapshot: ForecastSnapshot,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionWindowStartPayload {
    pub model: String,
    pub cycle_hour: u8,
    pub run_date: chrono::NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitHitPayload {
    pub provider: String,
    pub retry_after: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastTriggerPayload {
    pub market_id: MarketId,
    pub implied_probability: Probability,
}

/// The event payload itself. One variant per `EventKind`; variants whose
/// catalog entry carries no interesting payload (mode enter/exit, batch
/// update, early trigger) hold only the fields needed to identify what
/// fired.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    ForecastTrigger(ForecastTriggerPayload),
    FetchModeEnter { city: String },
    FetchModeExit { city: String },
    ProviderFetch { provider: String, city: String },
    ForecastChanged(ForecastUpdatedPayload),
    FileDetected(FileDetectedPayload),
    FileConfirmed(FileConfirmedPayload),
    DetectionWindowStart(DetectionWindowStartPayload),
    ApiDataReceived(ApiDataReceivedPayload),
    ForecastChange(ForecastUpdatedPayload),
    ForecastUpdated(ForecastUpdatedPayload),
    ForecastBatchUpdated { count: usize },
    RateLimitHit(RateLimitHitPayload),
    EarlyTriggerMode { city: String, enabled: bool },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ForecastTrigger(_) => EventKind::ForecastTrigger,
            Event::FetchModeEnter { .. } => EventKind::FetchModeEnter,
            Event::FetchModeExit { .. } => EventKind::FetchModeExit,
            Event::ProviderFetch { .. } => EventKind::ProviderFetch,
            Event::ForecastChanged(_) => EventKind::ForecastChanged,
            Event::FileDetected(_) => EventKind::FileDetected,
            Event::FileConfirmed(_) => EventKind::FileConfirmed,
            Event::DetectionWindowStart(_) => EventKind::DetectionWindowStart,
            Event::ApiDataReceived(_) => EventKind::ApiDataReceived,
            Event::ForecastChange(_) => EventKind::ForecastChange,
            Event::ForecastUpdated(_) => EventKind::ForecastUpdated,
            Event::ForecastBatchUpdated { .. } => EventKind::ForecastBatchUpdated,
            Event::RateLimitHit(_) => EventKind::RateLimitHit,
            Event::EarlyTriggerMode { .. } => EventKind::EarlyTriggerMode,
        }
    }
}
