//! Application wiring.
//!
//! `Application` owns every long-lived component and connects them purely
//! through `EventBus` subscriptions — the same "construct once, wire
//! handlers, then drive a clock loop" shape as the teacher's own
//! `Application` in `hip3-bot/app.rs`, generalized from a websocket feed to
//! the scheduled-poll/extract/arbitrate pipeline described in SPEC_FULL §4.
//!
//! No handler here re-derives state another component already owns: the
//! arbiter mutates `DataStore` and emits `FORECAST_UPDATED` on its own, so
//! the `FORECAST_UPDATED` subscriber only reads that snapshot back out and
//! feeds the strategies.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use rust_decimal::prelude::ToPrimitive;

use wx_arbiter::{ArbitrationOutcome, IngestionArbiter};
use wx_core::exchange::SimulationExchange;
use wx_core::forecast::ForecastSnapshot;
use wx_core::market::MarketId;
use wx_core::run_record::{RunRecord, RunSource};
use wx_core::trace::TraceStage;
use wx_core::MarketExchange;
use wx_detector::{
    GribDecoderBackend, GribExtractor, ObjectStoreBackend, ObjectStoreDetector,
    ReqwestObjectStore, SimulationGribBackend, SimulationObjectStore,
};
use wx_eventbus::event::{DetectionWindowStartPayload, Event, EventKind};
use wx_eventbus::{EventBus, LatencyTracker};
use wx_schedule::{Model, ScheduleManager};
use wx_signal::{BayesianCombiner, ConfidenceStrategy, EntrySignal, SpeedStrategy};
use wx_store::{DataStore, RunHistoryStore};
use wx_telemetry::Metrics;

use crate::config::AppConfig;
use crate::error::AppResult;

/// Backend pair `ObjectStoreDetector`/`GribExtractor` are instantiated
/// with. Boxed trait objects so `Application` can pick the simulation or
/// live backend at construction time from `config.simulate` (SPEC_FULL
/// §9) without the component types themselves needing to be generic over
/// that choice.
type Detector = ObjectStoreDetector<Box<dyn ObjectStoreBackend>, Box<dyn GribDecoderBackend>>;

/// `(model, cycleHour)` → the `runDate` of the window currently open,
/// mirroring `IngestionArbiter`'s own internal index. `wx-bot` needs this
/// independently of the arbiter's copy because it has to resolve
/// `runDate` for two things the arbiter never sees: the `RunRecord` fed to
/// `RunHistoryStore`, and the trace id a `FILE_DETECTED`/`FORECAST_UPDATED`
/// pair is stamped under.
type RunDateIndex = DashMap<(String, u8), NaiveDate>;

/// Per-market, per-model forecast cache `ConfidenceStrategy::evaluate`
/// reads its `snapshots` argument from. `DataStore` only remembers the
/// single latest snapshot per market, not one per contributing model, so
/// this index is rebuilt here from every `FORECAST_UPDATED` event.
type SnapshotIndex = DashMap<MarketId, RwLock<HashMap<String, ForecastSnapshot>>>;

fn trace_id(model: &str, cycle_hour: u8, run_date: NaiveDate) -> String {
    format!("{model}:{cycle_hour}:{run_date}")
}

/// Main application: owns every component and the clock loop that drives
/// `ScheduleManager`.
pub struct Application {
    config: AppConfig,
    bus: EventBus,
    schedule: Mutex<ScheduleManager>,
    detector: Arc<Detector>,
    arbiter: Arc<IngestionArbiter>,
    store: Arc<DataStore>,
    run_history: Arc<RunHistoryStore>,
    latency: Arc<LatencyTracker>,
    run_dates: Arc<RunDateIndex>,
}

impl Application {
    /// Construct every component and wire the cross-component event
    /// subscriptions. Returns with the pipeline idle; call `run()` to
    /// start the clock loop.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let bus = EventBus::new();

        let store = Arc::new(DataStore::new());
        for market in config.markets.clone() {
            store.add_market(market);
        }

        let run_history = Arc::new(RunHistoryStore::default());
        let latency = Arc::new(LatencyTracker::new());
        let run_dates: Arc<RunDateIndex> = Arc::new(DashMap::new());
        let snapshots: Arc<SnapshotIndex> = Arc::new(DashMap::new());

        let arbiter = Arc::new(IngestionArbiter::new(
            store.clone(),
            bus.clone(),
            config.arbiter.to_arbiter_config(),
        ));

        let cities: Vec<_> = config.cities.iter().map(|c| c.to_city_point()).collect();

        let detector = Arc::new(Self::build_detector(&config, bus.clone())?);

        let speed_strategy = Arc::new(SpeedStrategy::new(config.speed.to_speed_config()));
        let combiner = BayesianCombiner::new(config.bayesian.to_bayesian_config());
        let confidence_strategy = Arc::new(ConfidenceStrategy::new(
            config.confidence.to_confidence_config(&config.cities),
            combiner,
        ));

        // No real trading venue exists in this workspace (SPEC_FULL §1, §9
        // treat the exchange as an opaque collaborator); `SimulationExchange`
        // is used regardless of `config.simulate`, which instead governs only
        // the detector's object-store/GRIB backends.
        let exchange: Arc<dyn MarketExchange> = Arc::new(SimulationExchange::new());
        let executor = Arc::new(wx_executor::OrderExecutor::new(
            config.executor.to_executor_config(),
            exchange,
        ));

        Self::wire_events(
            &bus,
            run_dates.clone(),
            snapshots.clone(),
            arbiter.clone(),
            store.clone(),
            run_history.clone(),
            latency.clone(),
            speed_strategy,
            confidence_strategy,
            executor,
        );

        let schedule = Mutex::new(ScheduleManager::new(wx_schedule::default_model_configs()));

        info!(
            simulate = config.simulate,
            cities = cities.len(),
            markets = config.markets.len(),
            "application constructed"
        );

        Ok(Self {
            config,
            bus,
            schedule,
            detector,
            arbiter,
            store,
            run_history,
            latency,
            run_dates,
        })
    }

    fn build_detector(config: &AppConfig, bus: EventBus) -> AppResult<Detector> {
        let detector_config = config.detector.clone();

        let backend: Box<dyn ObjectStoreBackend> = if config.simulate {
            Box::new(SimulationObjectStore::new(std::time::Duration::from_millis(
                config.simulation_publish_delay_ms,
            )))
        } else {
            Box::new(ReqwestObjectStore::new(&detector_config))
        };

        // No bit-level GRIB2 decoder is vendored into this workspace; both
        // modes decode through the simulation backend, which is the
        // pragmatic stand-in documented in DESIGN.md rather than a silent
        // placeholder. Swapping in a real decoder only requires a second
        // `GribDecoderBackend` impl and a branch here.
        let grib_backend: Box<dyn GribDecoderBackend> = Box::new(SimulationGribBackend::default());

        let extractor = Arc::new(GribExtractor::with_fallback_concurrency(
            grib_backend,
            detector_config.fallback_extract_concurrency,
        ));

        Ok(ObjectStoreDetector::new(
            Arc::new(backend),
            extractor,
            detector_config,
            bus,
        ))
    }

    /// Subscribe every cross-component handler. Kept as a free function
    /// over owned `Arc`s (rather than a `&self` method) since it runs
    /// before `Application` itself is assembled.
    #[allow(clippy::too_many_arguments)]
    fn wire_events(
        bus: &EventBus,
        run_dates: Arc<RunDateIndex>,
        snapshots: Arc<SnapshotIndex>,
        arbiter: Arc<IngestionArbiter>,
        store: Arc<DataStore>,
        run_history: Arc<RunHistoryStore>,
        latency: Arc<LatencyTracker>,
        speed_strategy: Arc<SpeedStrategy>,
        confidence_strategy: Arc<ConfidenceStrategy>,
        executor: Arc<wx_executor::OrderExecutor>,
    ) {
        // DETECTION_WINDOW_START: open the window's trace, record its
        // run_date so later events (which don't carry one) can resolve it,
        // and hand the arbiter its own copy of the same index.
        {
            let run_dates = run_dates.clone();
            let arbiter = arbiter.clone();
            let latency = latency.clone();
            bus.subscribe(EventKind::DetectionWindowStart, move |event| {
                let Event::DetectionWindowStart(DetectionWindowStartPayload {
                    model,
                    cycle_hour,
                    run_date,
                }) = event
                else {
                    return;
                };
                run_dates.insert((model.clone(), *cycle_hour), *run_date);
                let id = trace_id(model, *cycle_hour, *run_date);
                latency.start(&id);
                latency.record(&id, TraceStage::ModelPublished, Utc::now());
                arbiter.handle_detection_window_start(model, *cycle_hour, *run_date);
                Metrics::detection_window_active("open", 1.0);
            });
        }

        // FILE_DETECTED: stamp the detection-latency stage and report it.
        {
            let run_dates = run_dates.clone();
            let latency = latency.clone();
            bus.subscribe(EventKind::FileDetected, move |event| {
                let Event::FileDetected(payload) = event else {
                    return;
                };
                if let Some(id) = run_dates
                    .get(&(payload.model.clone(), payload.cycle_hour))
                    .map(|d| trace_id(&payload.model, payload.cycle_hour, *d))
                {
                    latency.record(&id, TraceStage::Detected, payload.detected_at);
                }
                Metrics::detection_latency(&payload.model, payload.detection_latency_ms as f64);
            });
        }

        // FILE_CONFIRMED: arbitrate, record the run for stability tracking,
        // and stamp the parse/arbitration stages.
        {
            let run_dates = run_dates.clone();
            let arbiter = arbiter.clone();
            let run_history = run_history.clone();
            let latency = latency.clone();
            bus.subscribe(EventKind::FileConfirmed, move |event| {
                let Event::FileConfirmed(payload) = event else {
                    return;
                };
                let run_date = run_dates
                    .get(&(payload.model.clone(), payload.cycle_hour))
                    .map(|d| *d)
                    .unwrap_or_else(|| payload.confirmed_at.date_naive());
                let id = trace_id(&payload.model, payload.cycle_hour, run_date);
                latency.record(&id, TraceStage::Extracted, payload.confirmed_at);

                let outcome: ArbitrationOutcome = arbiter.handle_file_confirmed(
                    &payload.model,
                    payload.cycle_hour,
                    &payload.city,
                    payload.value,
                    payload.confirmed_at,
                );

                if outcome.accepted {
                    latency.record(&id, TraceStage::Arbitrated, Utc::now());
                    Metrics::arbitration_outcome(&payload.city, "accepted");
                    run_history.add_run(RunRecord {
                        model: payload.model.clone(),
                        cycle_hour: payload.cycle_hour,
                        run_date,
                        city_id: payload.city.clone(),
                        max_temp_c: Some(payload.value),
                        precip_flag: payload.precip_flag,
                        precip_amount_mm: None,
                        timestamp: payload.confirmed_at,
                        source: RunSource::File,
                    });
                } else {
                    let reason = outcome
                        .reason
                        .map(|r| format!("{r:?}"))
                        .unwrap_or_else(|| "unknown".to_string());
                    debug!(city = %payload.city, model = %payload.model, reason = %reason, "file-confirmed rejected");
                    Metrics::arbitration_outcome(&payload.city, &reason);
                }
            });
        }

        // API_DATA_RECEIVED: the lower-confidence fallback path (SPEC_FULL
        // §4.6 rule 2). Nothing in this workspace emits it yet — there is
        // no bundled third-party weather API client — but the arbiter's
        // handling is exercised and ready for one to be plugged in.
        {
            let arbiter = arbiter.clone();
            bus.subscribe(EventKind::ApiDataReceived, move |event| {
                let Event::ApiDataReceived(payload) = event else {
                    return;
                };
                let outcome = arbiter.handle_api_data_received(
                    &payload.model,
                    payload.cycle_hour,
                    &payload.city,
                    payload.value,
                    payload.received_at,
                );
                if !outcome.accepted {
                    let reason = outcome
                        .reason
                        .map(|r| format!("{r:?}"))
                        .unwrap_or_else(|| "unknown".to_string());
                    Metrics::arbitration_outcome(&payload.city, &reason);
                }
            });
        }

        // FORECAST_UPDATED: the arbiter already wrote this snapshot into
        // `DataStore` and emitted this event itself (`IngestionArbiter::propagate`).
        // This handler only rebuilds the per-model cache the confidence
        // strategy reads and runs both strategies against the refreshed
        // market state.
        {
            let run_dates = run_dates.clone();
            let snapshots = snapshots.clone();
            let store = store.clone();
            let run_history = run_history.clone();
            let latency = latency.clone();
            let speed_strategy = speed_strategy.clone();
            let confidence_strategy = confidence_strategy.clone();
            let executor = executor.clone();
            bus.subscribe_async(EventKind::ForecastUpdated, move |event| {
                let run_dates = run_dates.clone();
                let snapshots = snapshots.clone();
                let store = store.clone();
                let run_history = run_history.clone();
                let latency = latency.clone();
                let speed_strategy = speed_strategy.clone();
                let confidence_strategy = confidence_strategy.clone();
                let executor = executor.clone();
                async move {
                    let Event::ForecastUpdated(payload) = event else {
                        return;
                    };
                    let now = Utc::now();
                    let model = payload.snapshot.model.clone();
                    let cycle_hour = payload.snapshot.cycle_hour;

                    let id = run_dates
                        .get(&(model.clone(), cycle_hour))
                        .map(|d| trace_id(&model, cycle_hour, *d));
                    if let Some(id) = &id {
                        latency.record(id, TraceStage::Stored, now);
                    }

                    snapshots
                        .entry(payload.market_id.clone())
                        .or_insert_with(|| RwLock::new(HashMap::new()))
                        .write()
                        .insert(model.clone(), payload.snapshot.clone());

                    let market = match store.get_market_state(&payload.market_id) {
                        Ok(state) => state.market,
                        Err(err) => {
                            warn!(market_id = %payload.market_id, %err, "forecast update for unknown market");
                            return;
                        }
                    };
                    if !market.is_tradeable() {
                        return;
                    }

                    match speed_strategy.evaluate(&market, &payload.snapshot, now) {
                        Ok(Some(signal)) => {
                            Self::emit_signal("speed", signal, &market, &executor, &latency, id.as_deref(), now).await;
                        }
                        Ok(None) => {}
                        Err(reason) => {
                            Metrics::signal_rejected("speed", &format!("{reason:?}"));
                        }
                    }

                    let model_snapshots = snapshots
                        .get(&payload.market_id)
                        .map(|m| m.read().clone())
                        .unwrap_or_default();
                    match confidence_strategy.evaluate(&market, &model, &model_snapshots, &run_history, now) {
                        Ok(Some(signal)) => {
                            Self::emit_signal("confidence", signal, &market, &executor, &latency, id.as_deref(), now).await;
                        }
                        Ok(None) => {}
                        Err(reason) => {
                            Metrics::signal_rejected("confidence", &format!("{reason:?}"));
                        }
                    }
                }
            });
        }
    }

    /// Shared tail of both strategies: report the signal, submit it to the
    /// executor, and stamp/close the trace.
    async fn emit_signal(
        strategy: &str,
        signal: EntrySignal,
        market: &wx_core::market::Market,
        executor: &wx_executor::OrderExecutor,
        latency: &LatencyTracker,
        trace: Option<&str>,
        now: chrono::DateTime<Utc>,
    ) {
        Metrics::signal_emitted(strategy, &format!("{:?}", signal.side), &format!("{:?}", signal.urgency));
        Metrics::edge_observed(strategy, signal.edge.to_f64().unwrap_or(0.0));
        if let Some(id) = trace {
            latency.record(id, TraceStage::SignalEmitted, now);
        }

        let outcome = executor.execute(&signal, market, now).await;
        if outcome.executed {
            Metrics::order_outcome("filled");
            if let Some(id) = trace {
                latency.record(id, TraceStage::OrderSubmitted, now);
                latency.complete(id);
            }
        } else {
            let reason = outcome
                .error
                .map(|e| format!("{e:?}"))
                .unwrap_or_else(|| "unknown".to_string());
            debug!(market_id = %market.market_id, strategy, reason = %reason, "order not executed");
            Metrics::order_outcome(&reason);
        }
    }

    /// Drive `ScheduleManager::tick` at `config.tick_interval_ms`, opening
    /// detection windows as their `windowStart` is reached. Runs until the
    /// process is killed; there is no graceful-shutdown signal in this
    /// pipeline's scope.
    pub async fn run(self) -> AppResult<()> {
        info!(
            tick_interval_ms = self.config.tick_interval_ms,
            "starting clock loop"
        );
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(
            self.config.tick_interval_ms,
        ));

        loop {
            interval.tick().await;
            let now = Utc::now();
            let windows = self.schedule.lock().tick(now);

            for window in windows {
                self.bus.emit(Event::DetectionWindowStart(DetectionWindowStartPayload {
                    model: window.model.clone(),
                    cycle_hour: window.cycle_hour,
                    run_date: window.run_date,
                }));

                let model = match window.model.parse::<Model>() {
                    Ok(model) => model,
                    Err(err) => {
                        warn!(model = %window.model, %err, "unknown model in detection window, skipping");
                        continue;
                    }
                };

                let expected_file = {
                    let schedule = self.schedule.lock();
                    match schedule.get_expected_file(model, window.cycle_hour, window.run_date) {
                        Ok(file) => file,
                        Err(err) => {
                            warn!(model = %window.model, %err, "failed to resolve expected file");
                            continue;
                        }
                    }
                };

                let cities: Vec<_> = self
                    .config
                    .cities
                    .iter()
                    .map(|c| c.to_city_point())
                    .collect();
                self.detector.start_detection(expected_file, window, cities);
            }
        }
    }
}

impl Application {
    /// Shared market/forecast state, exposed for inspection in tests and
    /// by future operational tooling.
    pub fn store(&self) -> &Arc<DataStore> {
        &self.store
    }

    /// Accepted run history, keyed by city/model.
    pub fn run_history(&self) -> &Arc<RunHistoryStore> {
        &self.run_history
    }

    /// Acceptance rules the `FILE_CONFIRMED`/`API_DATA_RECEIVED` handlers
    /// delegate to.
    pub fn arbiter(&self) -> &Arc<IngestionArbiter> {
        &self.arbiter
    }

    /// `(model, cycleHour)` -> open window's `runDate`.
    pub fn run_dates(&self) -> &Arc<RunDateIndex> {
        &self.run_dates
    }

    /// End-to-end latency tracker shared with every pipeline stage.
    pub fn latency(&self) -> &Arc<LatencyTracker> {
        &self.latency
    }

    /// The event bus every component is wired through.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wx_core::decimal::{Probability, Temperature};
    use wx_core::market::{Comparison, Market, MarketId, MetricType};
    use wx_core::units::Unit;
    use wx_eventbus::event::FileConfirmedPayload;

    fn sample_market(id: &str, city: &str) -> Market {
        Market {
            market_id: MarketId::new(id),
            city: city.to_string(),
            metric_type: MetricType::TempHigh,
            comparison: Comparison::Above,
            threshold: Some(Temperature::new(dec!(90.0))),
            min_threshold: None,
            max_threshold: None,
            unit: Unit::Fahrenheit,
            target_date: chrono::NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            yes_token_id: "yes".to_string(),
            no_token_id: "no".to_string(),
            active: true,
            closed: false,
            yes_price: Probability::new(dec!(0.40)),
            no_price: Probability::new(dec!(0.60)),
        }
    }

    #[test]
    fn trace_id_matches_detector_task_key_format() {
        let run_date = chrono::NaiveDate::from_ymd_opt(2026, 7, 30).unwrap();
        assert_eq!(trace_id("hrrr", 12, run_date), "hrrr:12:2026-07-30");
    }

    #[test]
    fn application_constructs_with_default_config() {
        let app = Application::new(AppConfig::default()).unwrap();
        assert!(app.store().get_all_markets().is_empty());
        assert_eq!(app.run_dates().len(), 0);
    }

    #[test]
    fn application_seeds_markets_from_config() {
        let mut config = AppConfig::default();
        config.markets.push(sample_market("miami-high-2026-08-01", "Miami"));
        let app = Application::new(config).unwrap();

        let markets = app.store().get_all_markets();
        assert_eq!(markets.len(), 1);
        assert_eq!(markets[0].market_id, MarketId::new("miami-high-2026-08-01"));
    }

    #[test]
    fn detection_window_start_populates_run_date_index() {
        let app = Application::new(AppConfig::default()).unwrap();
        let run_date = chrono::NaiveDate::from_ymd_opt(2026, 7, 30).unwrap();

        app.bus().emit(Event::DetectionWindowStart(DetectionWindowStartPayload {
            model: "hrrr".to_string(),
            cycle_hour: 12,
            run_date,
        }));

        let recorded = app
            .run_dates()
            .get(&("hrrr".to_string(), 12))
            .map(|d| *d);
        assert_eq!(recorded, Some(run_date));
    }

    #[test]
    fn file_confirmed_without_prior_window_is_accepted_and_recorded() {
        let app = Application::new(AppConfig::default()).unwrap();

        app.bus().emit(Event::FileConfirmed(FileConfirmedPayload {
            model: "hrrr".to_string(),
            cycle_hour: 6,
            city: "Miami".to_string(),
            value: Temperature::new(dec!(91.2)),
            precip_flag: false,
            confirmed_at: Utc::now(),
        }));

        assert_eq!(app.run_history().count("Miami", "hrrr"), 1);
    }

    #[test]
    fn second_file_confirmed_for_same_window_is_rejected() {
        let app = Application::new(AppConfig::default()).unwrap();
        let now = Utc::now();

        let emit = |model: &str| {
            app.bus().emit(Event::FileConfirmed(FileConfirmedPayload {
                model: model.to_string(),
                cycle_hour: 6,
                city: "Miami".to_string(),
                value: Temperature::new(dec!(91.2)),
                precip_flag: false,
                confirmed_at: now,
            }));
        };

        emit("hrrr");
        emit("rap");

        // The second model's run for the same (city, cycle_hour, run_date)
        // window is rejected by the arbiter, so only one run is recorded.
        assert_eq!(app.run_history().count("Miami", "hrrr"), 1);
        assert_eq!(app.run_history().count("Miami", "rap"), 0);
    }
}
