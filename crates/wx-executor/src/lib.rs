//! Order execution: sizing, cooldown, slippage/price-chase guards, and the
//! optimistic position cache (C12, SPEC_FULL §4.12).

pub mod error;
pub mod executor;
pub mod position_cache;

pub use error::{ExecutorError, ExecutorResult};
pub use executor::{ExecuteOutcome, ExecuteRejection, ExecutorConfig, OrderExecutor, OrderState};
pub use position_cache::{CachedPosition, PositionCache, DUST_SIZE};
