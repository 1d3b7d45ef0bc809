//! Optimistic, in-memory position cache keyed by token id.
//!
//! The teacher splits this concern into an actor (`hip3-position/tracker.rs`)
//! with a cloneable handle talking to it over a channel, because its
//! position tracker also drives P&L and liquidation-buffer computations off
//! a stream of fills. This executor only needs a shared, lock-protected
//! running average per token (SPEC_FULL §4.12 step 7), so a single
//! `DashMap<String, RwLock<CachedPosition>>` gets the same "many readers,
//! serialized writers" property without the actor/channel machinery — a
//! deliberate simplification recorded in `DESIGN.md`.

use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use wx_core::decimal::Probability;
use wx_core::exchange::Position;

/// Size below which a cached position is treated as flat for the
/// price-chasing guard (SPEC_FULL §4.12 step 3's "dust" threshold).
pub const DUST_SIZE: Decimal = Decimal::from_parts(1, 0, 0, false, 6);

#[derive(Debug, Clone, Copy)]
pub struct CachedPosition {
    pub size: Decimal,
    pub average_price: Probability,
}

pub struct PositionCache {
    positions: DashMap<String, RwLock<CachedPosition>>,
}

impl Default for PositionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionCache {
    pub fn new() -> Self {
        Self {
            positions: DashMap::new(),
        }
    }

    pub fn get(&self, token_id: &str) -> Option<CachedPosition> {
        self.positions.get(token_id).map(|e| *e.read())
    }

    pub fn is_dust_or_flat(&self, token_id: &str) -> bool {
        match self.get(token_id) {
            Some(p) => p.size <= DUST_SIZE,
            None => true,
        }
    }

    /// Folds a fill into the cached running average (SPEC_FULL §4.12 step
    /// 7): `newAvg = (oldSize*oldAvg + newSize*newPrice) / (oldSize +
    /// newSize)`.
    pub fn record_fill(&self, token_id: &str, fill_size: Decimal, fill_price: Probability) {
        let entry = self
            .positions
            .entry(token_id.to_string())
            .or_insert_with(|| {
                RwLock::new(CachedPosition {
                    size: Decimal::ZERO,
                    average_price: fill_price,
                })
            });
        let mut guard = entry.write();
        let old_size = guard.size;
        let old_avg = guard.average_price.inner();
        let new_size = old_size + fill_size;
        let new_avg = if new_size.is_zero() {
            fill_price.inner()
        } else {
            (old_size * old_avg + fill_size * fill_price.inner()) / new_size
        };
        guard.size = new_size;
        guard.average_price = Probability::new(new_avg);
    }

    /// Refreshes the cache from the venue's authoritative position list,
    /// but leaves alone any token whose market is within `cooldown_tokens`
    /// (API lag tolerance, SPEC_FULL §4.12 "Position sync").
    pub fn sync(&self, external: &[Position], cooldown_tokens: &[String]) {
        let mut seen = std::collections::HashSet::new();
        for p in external {
            seen.insert(p.token_id.clone());
            if cooldown_tokens.iter().any(|t| t == &p.token_id) {
                continue;
            }
            self.positions.insert(
                p.token_id.clone(),
                RwLock::new(CachedPosition {
                    size: p.size,
                    average_price: p.average_price,
                }),
            );
        }
        self.positions.retain(|token, _| {
            seen.contains(token) || cooldown_tokens.iter().any(|t| t == token)
        });
    }
}
