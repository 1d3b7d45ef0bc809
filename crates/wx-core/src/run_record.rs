//! A single decoded model-run observation for one city.
//!
//! This is the record type stored by `RunHistoryStore` (`wx-store`); the
//! store owns dedup/ring-buffer/`isFirstRun` logic, this type just carries
//! the fields (SPEC_FULL §3).

use crate::decimal::Temperature;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Where a run's values came from — the authoritative binary file path or
/// the lower-confidence API fallback (SPEC_FULL §4.6's arbitration rules
/// reference this directly).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunSource {
    File,
    Api,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub model: String,
    pub cycle_hour: u8,
    pub run_date: NaiveDate,
    pub city_id: String,
    pub max_temp_c: Option<Temperature>,
    pub precip_flag: bool,
    pub precip_amount_mm: Option<rust_decimal::Decimal>,
    pub timestamp: DateTime<Utc>,
    pub source: RunSource,
}

impl RunRecord {
    /// The dedup key used by `RunHistoryStore` to decide whether this run
    /// has already been recorded for `(model, cycle_hour, run_date, city)`.
    pub fn dedup_key(&self) -> (String, u8, NaiveDate, String) {
        (
            self.model.clone(),
            self.cycle_hour,
            self.run_date,
            self.city_id.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn dedup_key_ignores_source_and_values() {
        let a = RunRecord {
            model: "hrrr".to_string(),
            cycle_hour: 12,
            run_date: NaiveDate::from_ymd_opt(2026, 7, 27).unwrap(),
            city_id: "london".to_string(),
            max_temp_c: Some(Temperature::new(dec!(16.0))),
            precip_flag: false,
            precip_amount_mm: None,
            timestamp: DateTime::UNIX_EPOCH,
            source: RunSource::File,
        };
        let mut b = a.clone();
        b.source = RunSource::Api;
        b.max_temp_c = Some(Temperature::new(dec!(17.0)));
        assert_eq!(a.dedup_key(), b.dedup_key());
    }
}
