//! `DataStore` (C7): in-memory market state, price/forecast histories.
//!
//! Grounded on `hip3-feed/market_state.rs`'s `DashMap<Key, Arc<RwLock<Entry>>>`
//! pattern: one entry per market, created lazily via `get_or_create`, mutated
//! through a small serialized API rather than a raw lock handed to callers.
//! Generalizes the teacher's single-BBO-slot entry to a `PriceHistory` pair
//! plus a pruned forecast history.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, trace};

use wx_core::decimal::{Probability, Temperature};
use wx_core::forecast::ForecastSnapshot;
use wx_core::market::{Market, MarketId};
use wx_core::price_history::{PriceHistory, TokenSide};
use wx_core::run_record::RunSource;

use crate::error::{StoreError, StoreResult};

/// `FORECAST_RETENTION_H` (SPEC_FULL §6).
pub const FORECAST_RETENTION: Duration = Duration::hours(24);

struct MarketStateEntry {
    market: Market,
    yes_history: PriceHistory,
    no_history: PriceHistory,
    forecast_history: VecDeque<ForecastSnapshot>,
    last_forecast: Option<ForecastSnapshot>,
}

impl MarketStateEntry {
    fn new(market: Market) -> Self {
        Self {
            market,
            yes_history: PriceHistory::new(),
            no_history: PriceHistory::new(),
            forecast_history: VecDeque::new(),
            last_forecast: None,
        }
    }

    fn prune_forecasts(&mut self, now: DateTime<Utc>) {
        let cutoff = now - FORECAST_RETENTION;
        while self
            .forecast_history
            .front()
            .map(|f| f.received_at < cutoff)
            .unwrap_or(false)
        {
            self.forecast_history.pop_front();
        }
    }
}

/// A shallow, read-only copy of a market's full state, returned by
/// `get_market_state`. Cloning the histories here is cheap relative to
/// holding the owner's lock across a caller's processing.
#[derive(Debug, Clone)]
pub struct MarketStateSnapshot {
    pub market: Market,
    pub yes_history: PriceHistory,
    pub no_history: PriceHistory,
    pub last_forecast: Option<ForecastSnapshot>,
    pub forecast_history_len: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DataStoreStats {
    pub market_count: usize,
    pub token_count: usize,
    pub total_price_points: usize,
}

/// Owned singleton: per-market state keyed by `MarketId`, plus a
/// token-to-market index so `updatePrice` can resolve a market from a raw
/// token id in O(1).
pub struct DataStore {
    markets: DashMap<MarketId, Arc<RwLock<MarketStateEntry>>>,
    token_index: DashMap<String, MarketId>,
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DataStore {
    pub fn new() -> Self {
        Self {
            markets: DashMap::new(),
            token_index: DashMap::new(),
        }
    }

    /// Idempotent: re-adding a known market id is a no-op (R1).
    pub fn add_market(&self, market: Market) {
        if self.markets.contains_key(&market.market_id) {
            trace!(market_id = %market.market_id, "add_market no-op, already present");
            return;
        }
        self.token_index
            .insert(market.yes_token_id.clone(), market.market_id.clone());
        self.token_index
            .insert(market.no_token_id.clone(), market.market_id.clone());
        debug!(market_id = %market.market_id, city = %market.city, "market added");
        self.markets
            .insert(market.market_id.clone(), Arc::new(RwLock::new(MarketStateEntry::new(market))));
    }

    /// Resolve which side of a market `token_id` belongs to.
    fn side_for_token(market: &Market, token_id: &str) -> Option<TokenSide> {
        if market.yes_token_id == token_id {
            Some(TokenSide::Yes)
        } else if market.no_token_id == token_id {
            Some(TokenSide::No)
        } else {
            None
        }
    }

    /// Locate a market via the token index, append a `PricePoint`, prune the
    /// stale prefix, and recompute velocity on the trailing window (P1-P3).
    pub fn update_price(
        &self,
        token_id: &str,
        price: Probability,
        timestamp: DateTime<Utc>,
    ) -> StoreResult<()> {
        let market_id = self
            .token_index
            .get(token_id)
            .map(|e| e.clone())
            .ok_or_else(|| StoreError::UnknownToken(token_id.to_string()))?;
        let entry = self
            .markets
            .get(&market_id)
            .ok_or_else(|| StoreError::MarketNotFound(market_id.to_string()))?
            .clone();
        let mut guard = entry.write();
        let side = Self::side_for_token(&guard.market, token_id)
            .ok_or_else(|| StoreError::UnknownToken(token_id.to_string()))?;
        match side {
            TokenSide::Yes => {
                guard.yes_history.record(price, timestamp);
                guard.market.yes_price = price;
            }
            TokenSide::No => {
                guard.no_history.record(price, timestamp);
                guard.market.no_price = price;
            }
        }
        trace!(market_id = %market_id, ?side, %price, "price updated");
        Ok(())
    }

    /// Build and store the next `ForecastSnapshot` for `market_id`, deriving
    /// `previousValue`/`thresholdPosition`/`valueChanged` from the preceding
    /// snapshot.
    pub fn update_forecast(
        &self,
        market_id: &MarketId,
        model: impl Into<String>,
        cycle_hour: u8,
        value: Temperature,
        now: DateTime<Utc>,
        source: RunSource,
    ) -> StoreResult<ForecastSnapshot> {
        let entry = self
            .markets
            .get(market_id)
            .ok_or_else(|| StoreError::MarketNotFound(market_id.to_string()))?
            .clone();
        let mut guard = entry.write();
        let snapshot = ForecastSnapshot::new(
            model,
            cycle_hour,
            value,
            guard.last_forecast.as_ref(),
            guard.market.comparison,
            guard.market.threshold,
            guard.market.min_threshold,
            guard.market.max_threshold,
            guard.market.metric_type,
            now,
            source,
        );
        guard.forecast_history.push_back(snapshot.clone());
        guard.prune_forecasts(now);
        guard.last_forecast = Some(snapshot.clone());
        debug!(
            market_id = %market_id,
            value_changed = snapshot.value_changed,
            threshold_position = ?snapshot.threshold_position,
            "forecast updated"
        );
        Ok(snapshot)
    }

    pub fn get_market_state(&self, market_id: &MarketId) -> StoreResult<MarketStateSnapshot> {
        let entry = self
            .markets
            .get(market_id)
            .ok_or_else(|| StoreError::MarketNotFound(market_id.to_string()))?;
        let guard = entry.read();
        Ok(MarketStateSnapshot {
            market: guard.market.clone(),
            yes_history: guard.yes_history.clone(),
            no_history: guard.no_history.clone(),
            last_forecast: guard.last_forecast.clone(),
            forecast_history_len: guard.forecast_history.len(),
        })
    }

    pub fn get_all_markets(&self) -> Vec<Market> {
        self.markets
            .iter()
            .map(|e| e.value().read().market.clone())
            .collect()
    }

    pub fn get_market_id_by_token(&self, token_id: &str) -> StoreResult<MarketId> {
        self.token_index
            .get(token_id)
            .map(|e| e.clone())
            .ok_or_else(|| StoreError::UnknownToken(token_id.to_string()))
    }

    pub fn get_stats(&self) -> DataStoreStats {
        let total_price_points = self
            .markets
            .iter()
            .map(|e| {
                let g = e.value().read();
                g.yes_history.len() + g.no_history.len()
            })
            .sum();
        DataStoreStats {
            market_count: self.markets.len(),
            token_count: self.token_index.len(),
            total_price_points,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wx_core::market::{Comparison, MetricType};
    use wx_core::units::Unit;

    fn sample_market() -> Market {
        Market {
            market_id: MarketId::new("london-high"),
            city: "london".to_string(),
            metric_type: MetricType::TempHigh,
            comparison: Comparison::Above,
            threshold: Some(Temperature::new(dec!(60.8))),
            min_threshold: None,
            max_threshold: None,
            unit: Unit::Celsius,
            target_date: chrono::NaiveDate::from_ymd_opt(2026, 7, 27).unwrap(),
            yes_token_id: "yes-1".to_string(),
            no_token_id: "no-1".to_string(),
            active: true,
            closed: false,
            yes_price: Probability::new(dec!(0.30)),
            no_price: Probability::new(dec!(0.70)),
        }
    }

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + chrono::Duration::seconds(secs)
    }

    #[test]
    fn add_market_is_idempotent() {
        let store = DataStore::new();
        store.add_market(sample_market());
        store.add_market(sample_market());
        assert_eq!(store.get_stats().market_count, 1);
    }

    #[test]
    fn update_price_resolves_by_token_and_records_point() {
        let store = DataStore::new();
        store.add_market(sample_market());
        store
            .update_price("yes-1", Probability::new(dec!(0.35)), t(0))
            .unwrap();
        let snap = store.get_market_state(&MarketId::new("london-high")).unwrap();
        assert_eq!(snap.yes_history.latest().unwrap().price.inner(), dec!(0.35));
        assert_eq!(snap.market.yes_price.inner(), dec!(0.35));
    }

    #[test]
    fn update_price_unknown_token_errors() {
        let store = DataStore::new();
        store.add_market(sample_market());
        let err = store.update_price("bogus", Probability::new(dec!(0.5)), t(0));
        assert!(matches!(err, Err(StoreError::UnknownToken(_))));
    }

    #[test]
    fn update_forecast_tracks_previous_value_and_change_flag() {
        let store = DataStore::new();
        store.add_market(sample_market());
        let market_id = MarketId::new("london-high");
        let first = store
            .update_forecast(&market_id, "hrrr", 12, Temperature::new(dec!(62.0)), t(0), RunSource::File)
            .unwrap();
        assert!(first.value_changed);
        assert!(first.previous_value.is_none());

        let second = store
            .update_forecast(
                &market_id,
                "hrrr",
                12,
                Temperature::new(dec!(64.0)),
                t(3600),
                RunSource::File,
            )
            .unwrap();
        assert_eq!(second.previous_value, Some(Temperature::new(dec!(62.0))));
        assert!(second.value_changed);

        let state = store.get_market_state(&market_id).unwrap();
        assert_eq!(state.forecast_history_len, 2);
    }

    #[test]
    fn forecast_history_prunes_entries_older_than_24h() {
        let store = DataStore::new();
        store.add_market(sample_market());
        let market_id = MarketId::new("london-high");
        store
            .update_forecast(&market_id, "hrrr", 12, Temperature::new(dec!(62.0)), t(0), RunSource::File)
            .unwrap();
        store
            .update_forecast(
                &market_id,
                "hrrr",
                18,
                Temperature::new(dec!(63.0)),
                t(25 * 3600),
                RunSource::File,
            )
            .unwrap();
        let state = store.get_market_state(&market_id).unwrap();
        assert_eq!(state.forecast_history_len, 1);
    }
}
