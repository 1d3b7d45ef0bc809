//! `RunHistoryStore` (C8): last-K model runs per `(city, model)`.
//!
//! Grounded on the same buffer-and-prune idiom as `market_store.rs`'s
//! template (`hip3-feed/market_state.rs`), generalized from a single BBO
//! slot to a fixed-size circular buffer kept newest-first.

use std::collections::VecDeque;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::trace;

use wx_core::run_record::RunRecord;

/// Default buffer depth per `(city, model)` (SPEC_FULL §4.8).
pub const DEFAULT_CAPACITY: usize = 5;

/// Owned singleton: one bounded, newest-first ring per `(city_id, model)`.
pub struct RunHistoryStore {
    capacity: usize,
    buffers: DashMap<(String, String), RwLock<VecDeque<RunRecord>>>,
}

impl Default for RunHistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl RunHistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffers: DashMap::new(),
        }
    }

    fn key(city_id: &str, model: &str) -> (String, String) {
        (city_id.to_string(), model.to_string())
    }

    /// Insert `record` into its `(city, model)` buffer. Returns `true` if it
    /// was inserted, `false` if silently dropped as a duplicate
    /// `(cycleHour, runDate)` (P4).
    pub fn add_run(&self, record: RunRecord) -> bool {
        let key = Self::key(&record.city_id, &record.model);
        let buffer = self
            .buffers
            .entry(key)
            .or_insert_with(|| RwLock::new(VecDeque::with_capacity(self.capacity)));
        let mut guard = buffer.write();
        let dedup_key = record.dedup_key();
        if guard.iter().any(|r| r.dedup_key() == dedup_key) {
            trace!(
                city = %record.city_id,
                model = %record.model,
                "duplicate run record ignored"
            );
            return false;
        }
        guard.push_front(record);
        guard.truncate(self.capacity);
        true
    }

    /// Shallow copy of up to `k` most recent runs, newest-first.
    pub fn get_last_k_runs(&self, city_id: &str, model: &str, k: usize) -> Vec<RunRecord> {
        let key = Self::key(city_id, model);
        match self.buffers.get(&key) {
            Some(buffer) => buffer.read().iter().take(k).cloned().collect(),
            None => Vec::new(),
        }
    }

    /// `isFirstRun ⇔ count ≤ 1` (P5).
    pub fn is_first_run(&self, city_id: &str, model: &str) -> bool {
        let key = Self::key(city_id, model);
        match self.buffers.get(&key) {
            Some(buffer) => buffer.read().len() <= 1,
            None => true,
        }
    }

    pub fn count(&self, city_id: &str, model: &str) -> usize {
        let key = Self::key(city_id, model);
        self.buffers.get(&key).map(|b| b.read().len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wx_core::decimal::Temperature;
    use wx_core::run_record::RunSource;

    fn record(cycle_hour: u8, run_date: chrono::NaiveDate, temp: f64) -> RunRecord {
        RunRecord {
            model: "hrrr".to_string(),
            cycle_hour,
            run_date,
            city_id: "seattle".to_string(),
            max_temp_c: Some(Temperature::new(rust_decimal::Decimal::try_from(temp).unwrap())),
            precip_flag: false,
            precip_amount_mm: None,
            timestamp: chrono::DateTime::UNIX_EPOCH,
            source: RunSource::File,
        }
    }

    #[test]
    fn is_first_run_true_until_second_distinct_record() {
        let store = RunHistoryStore::default();
        let d = chrono::NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        assert!(store.is_first_run("seattle", "hrrr"));
        store.add_run(record(12, d, 18.0));
        assert!(store.is_first_run("seattle", "hrrr"));
        store.add_run(record(18, d, 18.5));
        assert!(!store.is_first_run("seattle", "hrrr"));
    }

    #[test]
    fn duplicate_cycle_hour_and_run_date_is_ignored() {
        let store = RunHistoryStore::default();
        let d = chrono::NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        assert!(store.add_run(record(12, d, 18.0)));
        assert!(!store.add_run(record(12, d, 99.0)));
        assert_eq!(store.count("seattle", "hrrr"), 1);
    }

    #[test]
    fn buffer_truncates_to_capacity_keeping_newest_first() {
        let store = RunHistoryStore::new(3);
        let d = chrono::NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        for hour in [0u8, 6, 12, 18] {
            store.add_run(record(hour, d, hour as f64));
        }
        let runs = store.get_last_k_runs("seattle", "hrrr", 3);
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].cycle_hour, 18);
    }

    #[test]
    fn unknown_city_model_pair_reports_first_run_and_empty_history() {
        let store = RunHistoryStore::default();
        assert!(store.is_first_run("chicago", "gfs"));
        assert!(store.get_last_k_runs("chicago", "gfs", 5).is_empty());
    }
}
