//! Price history and velocity tracking for a single market token.
//!
//! Mirrors the age-accessor idiom of `hip3-core::types::Bbo`/`AssetCtx`
//! (timestamp-stamped values with an `age_ms`-style accessor), generalized
//! to an append-only, pruned sequence rather than a single latest value.

use crate::decimal::Probability;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Which side of a binary market a price series belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenSide {
    Yes,
    No,
}

/// A single observed price at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: Probability,
    pub timestamp: DateTime<Utc>,
}

/// How long price points are retained (SPEC_FULL §3, §6:
/// `PRICE_RETENTION_MIN`).
pub const PRICE_RETENTION: Duration = Duration::minutes(60);

/// The trailing window used to estimate velocity (SPEC_FULL §6:
/// `PRICE_HISTORY_WINDOW_S`).
pub const VELOCITY_WINDOW: Duration = Duration::seconds(60);

/// An ordered, pruned sequence of price observations for one token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceHistory {
    /// Oldest first; invariant P1/P2: timestamps are monotone
    /// non-decreasing, and nothing older than `PRICE_RETENTION` survives an
    /// insert.
    points: Vec<PricePoint>,
    /// Price-change-per-second over the trailing `VELOCITY_WINDOW`; zero
    /// when fewer than two points fall in that window (invariant P3).
    velocity: rust_decimal::Decimal,
}

impl PriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new price observation, pruning stale points and
    /// recomputing velocity.
    ///
    /// `now` is passed explicitly (rather than read from `Utc::now()`
    /// here) so that pruning and velocity computation are testable against
    /// a fixed clock.
    pub fn record(&mut self, price: Probability, timestamp: DateTime<Utc>) {
        self.points.push(PricePoint { price, timestamp });
        self.prune(timestamp);
        self.recompute_velocity(timestamp);
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - PRICE_RETENTION;
        // Points are monotone by timestamp, so the stale prefix can be
        // dropped in one pass rather than filtering the whole vector.
        let first_live = self.points.iter().position(|p| p.timestamp >= cutoff);
        match first_live {
            Some(0) => {}
            Some(idx) => {
                self.points.drain(0..idx);
            }
            None => self.points.clear(),
        }
    }

    /// Recompute velocity via a reverse scan over the trailing window,
    /// avoiding an allocation for the common case (SPEC_FULL §4.7).
    fn recompute_velocity(&mut self, now: DateTime<Utc>) {
        let cutoff = now - VELOCITY_WINDOW;
        let mut oldest_in_window: Option<&PricePoint> = None;
        let mut newest_in_window: Option<&PricePoint> = None;
        for point in self.points.iter().rev() {
            if point.timestamp < cutoff {
                break;
            }
            if newest_in_window.is_none() {
                newest_in_window = Some(point);
            }
            oldest_in_window = Some(point);
        }

        self.velocity = match (oldest_in_window, newest_in_window) {
            (Some(oldest), Some(newest)) if oldest.timestamp != newest.timestamp => {
                let dt_secs = (newest.timestamp - oldest.timestamp).num_milliseconds() as f64
                    / 1000.0;
                if dt_secs <= 0.0 {
                    rust_decimal::Decimal::ZERO
                } else {
                    let dp = newest.price.inner() - oldest.price.inner();
                    dp / rust_decimal::Decimal::try_from(dt_secs).unwrap_or(rust_decimal::Decimal::ONE)
                }
            }
            _ => rust_decimal::Decimal::ZERO,
        };
    }

    pub fn velocity(&self) -> rust_decimal::Decimal {
        self.velocity
    }

    pub fn latest(&self) -> Option<PricePoint> {
        self.points.last().copied()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
