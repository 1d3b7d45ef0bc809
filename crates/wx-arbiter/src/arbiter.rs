//! `IngestionArbiter` (C6): per-`(city, cycleWindow)` arbitration between the
//! authoritative file path and the lower-confidence API fallback.
//!
//! Grounded on `hip3-feed/oracle_tracker.rs`'s `DashMap<Key, State>` with a
//! `record_*` mutator per key, and on `hip3-risk/gates.rs`'s explicit,
//! early-return ordered-check structure: each inbound update runs through a
//! small ladder of rules (rule 1..4 of SPEC_FULL §4.6) and either updates the
//! window state and propagates, or is rejected with a typed reason.

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{debug, trace, warn};

use wx_core::decimal::Temperature;
use wx_core::run_record::RunSource;
use wx_eventbus::event::{Confidence, Event, ForecastUpdatedPayload};
use wx_eventbus::EventBus;
use wx_store::DataStore;

use crate::error::ArbiterResult;

/// `(model, cycleHour)` → the `runDate` of the window currently open for
/// that model/cycle, populated from `DETECTION_WINDOW_START`. Arbitration
/// windows themselves are keyed per-city without the model, so that a
/// second model's `FILE_CONFIRMED` for the same city+cycle is correctly
/// rejected by rule 3.
type ModelCycleKey = (String, u8);
type CityWindowKey = (String, u8, NaiveDate);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// A `FILE_CONFIRMED` arrived for a window a file has already won.
    WindowAlreadyFileConfirmed,
    /// An `API_DATA_RECEIVED` arrived after the window was already won by a
    /// file (rule 2).
    ApiAfterFile,
    /// The API fallback has been open longer than the configured maximum
    /// duration for this window.
    FallbackExpired,
}

#[derive(Debug, Clone, Copy)]
pub struct ArbitrationOutcome {
    pub accepted: bool,
    pub reason: Option<RejectReason>,
}

impl ArbitrationOutcome {
    fn accept() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    fn reject(reason: RejectReason) -> Self {
        Self {
            accepted: false,
            reason: Some(reason),
        }
    }
}

struct WindowState {
    source: RunSource,
    locked_model: String,
    opened_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ArbiterConfig {
    /// Max duration the API fallback stays eligible for a window once
    /// opened (SPEC_FULL §4.6: "max duration ≈ 5 min").
    pub max_fallback_duration: StdDuration,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            max_fallback_duration: StdDuration::from_secs(5 * 60),
        }
    }
}

/// Owned singleton: per-`(city, cycleHour, runDate)` arbitration state, plus
/// a small index resolving the active `runDate` for a `(model, cycleHour)`
/// pair from the most recent `DETECTION_WINDOW_START`.
pub struct IngestionArbiter {
    config: ArbiterConfig,
    windows: DashMap<CityWindowKey, RwLock<WindowState>>,
    run_dates: DashMap<ModelCycleKey, NaiveDate>,
    store: Arc<DataStore>,
    bus: EventBus,
}

impl IngestionArbiter {
    pub fn new(store: Arc<DataStore>, bus: EventBus, config: ArbiterConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
            run_dates: DashMap::new(),
            store,
            bus,
        }
    }

    /// `DETECTION_WINDOW_START`: record which `runDate` is currently active
    /// for `(model, cycleHour)` so later payloads (which carry no
    /// `runDate`) can resolve their window.
    pub fn handle_detection_window_start(&self, model: &str, cycle_hour: u8, run_date: NaiveDate) {
        self.run_dates
            .insert((model.to_string(), cycle_hour), run_date);
    }

    fn resolve_run_date(&self, model: &str, cycle_hour: u8, fallback: DateTime<Utc>) -> NaiveDate {
        self.run_dates
            .get(&(model.to_string(), cycle_hour))
            .map(|e| *e)
            .unwrap_or_else(|| {
                warn!(model, cycle_hour, "no detection window on record, using calendar-date fallback");
                fallback.date_naive()
            })
    }

    /// `FILE_CONFIRMED`: rule 1 (always wins over any existing API state),
    /// rule 3 (first confirmed file wins across models for the window).
    pub fn handle_file_confirmed(
        &self,
        model: &str,
        cycle_hour: u8,
        city: &str,
        value: Temperature,
        now: DateTime<Utc>,
    ) -> ArbitrationOutcome {
        let run_date = self.resolve_run_date(model, cycle_hour, now);
        let key: CityWindowKey = (city.to_string(), cycle_hour, run_date);

        let outcome = match self.windows.get(&key) {
            None => {
                self.windows.insert(
                    key.clone(),
                    RwLock::new(WindowState {
                        source: RunSource::File,
                        locked_model: model.to_string(),
                        opened_at: now,
                        updated_at: now,
                    }),
                );
                ArbitrationOutcome::accept()
            }
            Some(existing) => {
                let mut guard = existing.write();
                match guard.source {
                    RunSource::Api => {
                        // File always beats a prior API-sourced window.
                        guard.source = RunSource::File;
                        guard.locked_model = model.to_string();
                        guard.updated_at = now;
                        ArbitrationOutcome::accept()
                    }
                    RunSource::File => {
                        trace!(
                            city,
                            model,
                            locked_model = %guard.locked_model,
                            "file-confirmed rejected, window already won"
                        );
                        ArbitrationOutcome::reject(RejectReason::WindowAlreadyFileConfirmed)
                    }
                }
            }
        };

        if outcome.accepted {
            if let Err(err) = self.propagate(city, model, cycle_hour, value, now, RunSource::File) {
                warn!(city, model, %err, "failed to propagate file-confirmed forecast");
            }
        }
        outcome
    }

    /// `API_DATA_RECEIVED`: rule 2 (rejected once the window is file-won)
    /// plus a max-duration cutoff on how long the fallback stays eligible.
    pub fn handle_api_data_received(
        &self,
        model: &str,
        cycle_hour: u8,
        city: &str,
        value: Temperature,
        now: DateTime<Utc>,
    ) -> ArbitrationOutcome {
        let run_date = self.resolve_run_date(model, cycle_hour, now);
        let key: CityWindowKey = (city.to_string(), cycle_hour, run_date);

        let outcome = match self.windows.get(&key) {
            None => {
                self.windows.insert(
                    key.clone(),
                    RwLock::new(WindowState {
                        source: RunSource::Api,
                        locked_model: model.to_string(),
                        opened_at: now,
                        updated_at: now,
                    }),
                );
                ArbitrationOutcome::accept()
            }
            Some(existing) => {
                let mut guard = existing.write();
                match guard.source {
                    RunSource::File => {
                        trace!(city, model, "api-data rejected, window already file-confirmed");
                        ArbitrationOutcome::reject(RejectReason::ApiAfterFile)
                    }
                    RunSource::Api => {
                        let age = now
                            .signed_duration_since(guard.opened_at)
                            .to_std()
                            .unwrap_or_default();
                        if age > self.config.max_fallback_duration {
                            ArbitrationOutcome::reject(RejectReason::FallbackExpired)
                        } else {
                            guard.updated_at = now;
                            ArbitrationOutcome::accept()
                        }
                    }
                }
            }
        };

        if outcome.accepted {
            if let Err(err) = self.propagate(city, model, cycle_hour, value, now, RunSource::Api) {
                warn!(city, model, %err, "failed to propagate api-sourced forecast");
            }
        }
        outcome
    }

    /// Update every market for `city` in the store and emit
    /// `FORECAST_UPDATED` with the confidence this source carries (rule 4).
    fn propagate(
        &self,
        city: &str,
        model: &str,
        cycle_hour: u8,
        value: Temperature,
        now: DateTime<Utc>,
        source: RunSource,
    ) -> ArbiterResult<()> {
        let markets: Vec<_> = self
            .store
            .get_all_markets()
            .into_iter()
            .filter(|m| m.city == city)
            .collect();

        for market in markets {
            let snapshot =
                self.store
                    .update_forecast(&market.market_id, model, cycle_hour, value, now, source)?;
            let confidence = match source {
                RunSource::File => Confidence::High,
                RunSource::Api => Confidence::Low,
            };
            debug!(
                market_id = %market.market_id,
                city,
                ?source,
                value_changed = snapshot.value_changed,
                "propagating forecast update"
            );
            self.bus.emit(Event::ForecastUpdated(ForecastUpdatedPayload {
                market_id: market.market_id,
                city: city.to_string(),
                snapshot,
                confidence,
            }));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wx_core::market::{Comparison, Market, MarketId, MetricType};
    use wx_core::decimal::Probability;
    use wx_core::units::Unit;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + chrono::Duration::seconds(secs)
    }

    fn setup() -> (Arc<DataStore>, EventBus, IngestionArbiter) {
        let store = Arc::new(DataStore::new());
        store.add_market(Market {
            market_id: MarketId::new("chicago-high"),
            city: "chicago".to_string(),
            metric_type: MetricType::TempHigh,
            comparison: Comparison::Above,
            threshold: Some(Temperature::new(dec!(60.8))),
            min_threshold: None,
            max_threshold: None,
            unit: Unit::Fahrenheit,
            target_date: chrono::NaiveDate::from_ymd_opt(2026, 7, 27).unwrap(),
            yes_token_id: "yes".to_string(),
            no_token_id: "no".to_string(),
            active: true,
            closed: false,
            yes_price: Probability::new(dec!(0.3)),
            no_price: Probability::new(dec!(0.7)),
        });
        let bus = EventBus::new();
        let arbiter = IngestionArbiter::new(store.clone(), bus.clone(), ArbiterConfig::default());
        (store, bus, arbiter)
    }

    #[test]
    fn file_confirmed_always_accepted_first_and_propagates() {
        let (store, _bus, arbiter) = setup();
        let run_date = chrono::NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        arbiter.handle_detection_window_start("hrrr", 12, run_date);
        let outcome = arbiter.handle_file_confirmed("hrrr", 12, "chicago", Temperature::new(dec!(62.0)), t(0));
        assert!(outcome.accepted);
        let state = store.get_market_state(&MarketId::new("chicago-high")).unwrap();
        assert_eq!(state.last_forecast.unwrap().value, Temperature::new(dec!(62.0)));
    }

    #[test]
    fn api_after_file_is_rejected_and_does_not_change_source() {
        let (_store, _bus, arbiter) = setup();
        let run_date = chrono::NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        arbiter.handle_detection_window_start("hrrr", 12, run_date);
        arbiter.handle_file_confirmed("hrrr", 12, "chicago", Temperature::new(dec!(62.0)), t(0));
        let outcome =
            arbiter.handle_api_data_received("tomorrow_io", 12, "chicago", Temperature::new(dec!(70.0)), t(2));
        assert!(!outcome.accepted);
        assert_eq!(outcome.reason, Some(RejectReason::ApiAfterFile));
    }

    #[test]
    fn second_model_file_confirmed_does_not_overwrite_first_winner() {
        let (_store, _bus, arbiter) = setup();
        let run_date = chrono::NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        arbiter.handle_detection_window_start("hrrr", 12, run_date);
        arbiter.handle_detection_window_start("rap", 12, run_date);
        let first = arbiter.handle_file_confirmed("hrrr", 12, "chicago", Temperature::new(dec!(62.0)), t(0));
        assert!(first.accepted);
        let second = arbiter.handle_file_confirmed("rap", 12, "chicago", Temperature::new(dec!(65.0)), t(5));
        assert!(!second.accepted);
        assert_eq!(second.reason, Some(RejectReason::WindowAlreadyFileConfirmed));
    }

    #[test]
    fn file_confirmed_overrides_a_prior_api_sourced_window() {
        let (store, _bus, arbiter) = setup();
        let run_date = chrono::NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        arbiter.handle_detection_window_start("hrrr", 12, run_date);
        arbiter.handle_api_data_received("tomorrow_io", 12, "chicago", Temperature::new(dec!(58.0)), t(0));
        let outcome = arbiter.handle_file_confirmed("hrrr", 12, "chicago", Temperature::new(dec!(62.0)), t(10));
        assert!(outcome.accepted);
        let state = store.get_market_state(&MarketId::new("chicago-high")).unwrap();
        assert_eq!(state.last_forecast.unwrap().source, RunSource::File);
    }

    #[test]
    fn stale_api_fallback_beyond_max_duration_is_rejected() {
        let (_store, _bus, arbiter) = setup();
        let run_date = chrono::NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        arbiter.handle_detection_window_start("tomorrow_io", 12, run_date);
        arbiter.handle_api_data_received("tomorrow_io", 12, "chicago", Temperature::new(dec!(58.0)), t(0));
        let outcome = arbiter.handle_api_data_received(
            "tomorrow_io",
            12,
            "chicago",
            Temperature::new(dec!(59.0)),
            t(6 * 60),
        );
        assert!(!outcome.accepted);
        assert_eq!(outcome.reason, Some(RejectReason::FallbackExpired));
    }
}
