//! Typed pub/sub event bus and end-to-end latency tracking.
//!
//! `EventBus` (C4) and `LatencyTracker` (C5) are co-located in this crate
//! because the latency tracker's lifecycle is driven entirely by events
//! flowing through the bus — a trace starts on `DETECTION_WINDOW_START`
//! and completes on an executor's order confirmation, with every
//! intermediate stage stamped by a bus subscriber along the way.

pub mod bus;
pub mod error;
pub mod event;
pub mod latency;

pub use bus::{EventBus, SubscriptionId, Unsubscribe};
pub use error::{EventBusError, EventBusResult};
pub use event::{Event, EventKind};
pub use latency::{LatencyStats, LatencyTracker, SLOW_TRACE_THRESHOLD_MS};
