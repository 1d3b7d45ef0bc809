//! `ScheduleManager` (C1): computes per-model run schedules and detection
//! windows.
//!
//! Pure computation over the static `ModelConfig` table — no I/O, no
//! learned recalibration. `tick()` is driven by an external clock-polling
//! task (wired in `wx-bot`) and hands back the windows that just opened;
//! the caller is responsible for publishing `DETECTION_WINDOW_START` on the
//! event bus, keeping this crate free of an `wx-eventbus` dependency.

use crate::config::{Model, ModelConfig};
use crate::error::{ScheduleError, ScheduleResult};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashSet;
use wx_core::window::DetectionWindow;

/// A concrete, resolvable object-store location for one model run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedFile {
    pub bucket: String,
    pub key: String,
    pub full_url: String,
    pub region: String,
    pub model: Model,
    pub cycle_hour: u8,
    pub forecast_hour: u8,
}

/// One upcoming (or past, for manual triggers) scheduled run.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub model: Model,
    pub cycle_hour: u8,
    pub run_date: NaiveDate,
    pub expected_publish_time: DateTime<Utc>,
}

pub struct ScheduleManager {
    configs: Vec<ModelConfig>,
    /// Windows already fired by `tick()`, keyed by `(model, cycle_hour,
    /// run_date)`, so a clock tick never double-fires the same window.
    fired: HashSet<(String, u8, NaiveDate)>,
}

impl ScheduleManager {
    pub fn new(configs: Vec<ModelConfig>) -> Self {
        Self {
            configs,
            fired: HashSet::new(),
        }
    }

    fn config_for(&self, model: Model) -> ScheduleResult<&ModelConfig> {
        self.configs
            .iter()
            .find(|c| c.model == model)
            .ok_or_else(|| ScheduleError::UnknownModel(model.to_string()))
    }

    /// Resolve the object-store location for one model run. Year-rollover
    /// safe since it formats directly off `run_date` rather than
    /// incrementing a cached year.
    pub fn get_expected_file(
        &self,
        model: Model,
        cycle_hour: u8,
        run_date: NaiveDate,
    ) -> ScheduleResult<ExpectedFile> {
        let cfg = self.config_for(model)?;
        let yyyymmdd = run_date.format("%Y%m%d").to_string();
        let hh = format!("{:02}", cycle_hour);
        let ff = format!("{:02}", cfg.forecast_hour);

        let key = cfg
            .key_template
            .replace("{YYYYMMDD}", &yyyymmdd)
            .replace("{HH}", &hh)
            .replace("{FF}", &ff);

        let full_url = format!("https://{}.s3.amazonaws.com/{}", cfg.bucket, key);

        Ok(ExpectedFile {
            bucket: cfg.bucket.clone(),
            key,
            full_url,
            region: cfg.region.clone(),
            model,
            cycle_hour,
            forecast_hour: cfg.forecast_hour,
        })
    }

    /// Build the `DetectionWindow` for one model run.
    pub fn calculate_detection_window(
        &self,
        model: Model,
        cycle_hour: u8,
        run_date: NaiveDate,
    ) -> ScheduleResult<DetectionWindow> {
        let cfg = self.config_for(model)?;
        let cycle_start = run_date
            .and_hms_opt(cycle_hour as u32, 0, 0)
            .ok_or_else(|| ScheduleError::Config(format!("invalid cycle hour {cycle_hour}")))?
            .and_utc();
        let expected_publish_time = cycle_start + cfg.publish_delay;

        Ok(DetectionWindow::new(
            model.as_str(),
            cycle_hour,
            run_date,
            expected_publish_time,
            cfg.buffer,
            cfg.detection_window,
        ))
    }

    /// The next `n` scheduled runs across all configured models, in
    /// chronological order, starting from `now`.
    pub fn get_upcoming_runs(&self, now: DateTime<Utc>, n: usize) -> Vec<Schedule> {
        let mut runs = Vec::new();
        for cfg in &self.configs {
            for day_offset in 0..2 {
                let run_date = (now + Duration::days(day_offset)).date_naive();
                for &cycle_hour in &cfg.cycle_hours {
                    let Some(cycle_start) = run_date.and_hms_opt(cycle_hour as u32, 0, 0) else {
                        continue;
                    };
                    let expected_publish_time = cycle_start.and_utc() + cfg.publish_delay;
                    if expected_publish_time >= now {
                        runs.push(Schedule {
                            model: cfg.model,
                            cycle_hour,
                            run_date,
                            expected_publish_time,
                        });
                    }
                }
            }
        }
        runs.sort_by_key(|r| r.expected_publish_time);
        runs.truncate(n);
        runs
    }

    /// Past-date requests still resolve to a schedule (used by manual
    /// triggers); only an unknown model is an error (SPEC_FULL §4.1).
    pub fn get_schedule_for(
        &self,
        model: Model,
        cycle_hour: u8,
        run_date: NaiveDate,
    ) -> ScheduleResult<Schedule> {
        let cfg = self.config_for(model)?;
        let cycle_start = run_date
            .and_hms_opt(cycle_hour as u32, 0, 0)
            .ok_or_else(|| ScheduleError::Config(format!("invalid cycle hour {cycle_hour}")))?
            .and_utc();
        Ok(Schedule {
            model,
            cycle_hour,
            run_date,
            expected_publish_time: cycle_start + cfg.publish_delay,
        })
    }

    /// Clock-driven: returns the windows whose `windowStart` has just been
    /// reached as of `now` and that have not already been fired. The
    /// caller polls this at a fine interval (not throttled by load) and
    /// publishes `DETECTION_WINDOW_START` for each returned window.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<DetectionWindow> {
        let mut newly_started = Vec::new();
        for cfg in &self.configs {
            for day_offset in -1..=0 {
                let run_date = (now + Duration::days(day_offset)).date_naive();
                for &cycle_hour in &cfg.cycle_hours {
                    let Ok(window) = self.calculate_detection_window(cfg.model, cycle_hour, run_date)
                    else {
                        continue;
                    };
                    let key = window.key();
                    if window.window_start <= now && !self.fired.contains(&key) {
                        self.fired.insert(key);
                        newly_started.push(window);
                    }
                }
            }
        }
        newly_started
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_model_configs;

    fn manager() -> ScheduleManager {
        ScheduleManager::new(default_model_configs())
    }

    #[test]
    fn expected_file_key_is_year_rollover_safe() {
        let mgr = manager();
        let date = NaiveDate::from_ymd_opt(2027, 1, 1).unwrap();
        let file = mgr.get_expected_file(Model::Hrrr, 0, date).unwrap();
        assert!(file.key.contains("20270101"));
        assert!(file.key.contains("t00z"));
    }

    #[test]
    fn unknown_model_lookup_is_an_error() {
        // Construct a manager with only HRRR configured to exercise the
        // error path without touching the real config enum.
        let mgr = ScheduleManager::new(vec![default_model_configs().remove(0)]);
        let date = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        assert!(matches!(
            mgr.get_expected_file(Model::Gfs, 12, date),
            Err(ScheduleError::UnknownModel(_))
        ));
    }

    #[test]
    fn detection_window_start_is_publish_minus_buffer() {
        let mgr = manager();
        let date = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        let window = mgr
            .calculate_detection_window(Model::Hrrr, 12, date)
            .unwrap();
        assert_eq!(
            window.window_start,
            window.expected_publish_time - Duration::minutes(5)
        );
    }

    #[test]
    fn past_date_still_resolves_for_manual_trigger() {
        let mgr = manager();
        let past = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        assert!(mgr.get_schedule_for(Model::Gfs, 0, past).is_ok());
    }

    #[test]
    fn upcoming_runs_are_chronological_and_truncated() {
        let mgr = manager();
        let now = DateTime::UNIX_EPOCH;
        let runs = mgr.get_upcoming_runs(now, 5);
        assert_eq!(runs.len(), 5);
        for pair in runs.windows(2) {
            assert!(pair[0].expected_publish_time <= pair[1].expected_publish_time);
        }
    }

    #[test]
    fn tick_fires_each_window_at_most_once() {
        let mut mgr = manager();
        let date = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        let window = mgr
            .calculate_detection_window(Model::Hrrr, 12, date)
            .unwrap();
        let first = mgr.tick(window.window_start);
        assert!(first.iter().any(|w| w.key() == window.key()));
        let second = mgr.tick(window.window_start + Duration::seconds(1));
        assert!(!second.iter().any(|w| w.key() == window.key()));
    }
}
