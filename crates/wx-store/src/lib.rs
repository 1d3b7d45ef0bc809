//! In-memory market state and per-city model-run history.
//!
//! `DataStore` (C7) and `RunHistoryStore` (C8) are the two owned-singleton
//! stores strategies read from; both follow the "owning task / fine-grained
//! lock around the map, never ad-hoc locks" discipline used throughout this
//! workspace (`hip3-feed/market_state.rs`).

pub mod error;
pub mod market_store;
pub mod run_history;

pub use error::{StoreError, StoreResult};
pub use market_store::{DataStore, DataStoreStats, MarketStateSnapshot, FORECAST_RETENTION};
pub use run_history::{RunHistoryStore, DEFAULT_CAPACITY};
