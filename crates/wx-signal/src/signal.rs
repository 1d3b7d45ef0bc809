//! The signal type emitted by both strategies, shaped after
//! `hip3-detector/signal.rs`'s `DislocationSignal`: a self-describing,
//! serializable record rather than a bare tuple, so a rejected/executed
//! signal can be logged and replayed independently of the strategy that
//! produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wx_core::decimal::Probability;
use wx_core::market::MarketId;

/// Which side of the binary market a signal proposes buying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    BuyYes,
    BuyNo,
}

/// How urgently an order should be worked once accepted by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    High,
    Normal,
}

/// A proposed trade, produced by `SpeedStrategy` or `ConfidenceStrategy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySignal {
    pub signal_id: String,
    pub market_id: MarketId,
    pub side: Side,
    /// Proposed USDC notional; the executor re-derives the final size via
    /// its own Kelly sizing (SPEC_FULL §4.12 step 4) and treats this as an
    /// upper bound/hint rather than the executed size.
    pub size_usdc: rust_decimal::Decimal,
    pub urgency: Urgency,
    pub is_guaranteed: bool,
    /// `P - priceYes` (or the confidence strategy's analogous edge), signed.
    pub edge: rust_decimal::Decimal,
    pub sigma: f64,
    /// `ConfidenceStrategy`'s composite score, `None` for `SpeedStrategy`
    /// signals which gate on crossing rather than on a confidence score.
    pub confidence: Option<f64>,
    /// The traded side's market price at signal-generation time; the
    /// executor's slippage guard (SPEC_FULL §4.12 step 2) compares this
    /// against the price observed immediately before submission.
    pub snapshot_price: Probability,
    pub reason: String,
    pub generated_at: DateTime<Utc>,
}

impl EntrySignal {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        strategy: &str,
        market_id: MarketId,
        side: Side,
        size_usdc: rust_decimal::Decimal,
        urgency: Urgency,
        is_guaranteed: bool,
        edge: rust_decimal::Decimal,
        sigma: f64,
        confidence: Option<f64>,
        snapshot_price: Probability,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            signal_id: format!("{strategy}-{}-{}", market_id.as_str(), now.timestamp_millis()),
            market_id,
            side,
            size_usdc,
            urgency,
            is_guaranteed,
            edge,
            sigma,
            confidence,
            snapshot_price,
            reason: reason.into(),
            generated_at: now,
        }
    }
}
