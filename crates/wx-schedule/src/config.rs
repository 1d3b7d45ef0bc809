//! Static per-model publication schedule configuration.
//!
//! This data is compiled into the process (or loaded once via the typed
//! configuration layer, SPEC_FULL §10.3) and is never recalibrated from
//! observed publish times at runtime — see `ScheduleManager`'s module doc.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A supported NWP model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Model {
    Hrrr,
    Rap,
    Gfs,
    Ecmwf,
}

impl Model {
    pub const ALL: [Model; 4] = [Model::Hrrr, Model::Rap, Model::Gfs, Model::Ecmwf];

    pub fn as_str(&self) -> &'static str {
        match self {
            Model::Hrrr => "hrrr",
            Model::Rap => "rap",
            Model::Gfs => "gfs",
            Model::Ecmwf => "ecmwf",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Model {
    type Err = crate::error::ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hrrr" => Ok(Model::Hrrr),
            "rap" => Ok(Model::Rap),
            "gfs" => Ok(Model::Gfs),
            "ecmwf" => Ok(Model::Ecmwf),
            other => Err(crate::error::ScheduleError::UnknownModel(other.to_string())),
        }
    }
}

/// Static scheduling configuration for one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model: Model,
    /// Hours (UTC) at which this model issues a new run.
    pub cycle_hours: Vec<u8>,
    /// Expected publication delay after the cycle hour.
    pub publish_delay: Duration,
    /// How long a detection window stays open before being marked missed.
    pub detection_window: Duration,
    /// Buffer subtracted from `expectedPublishTime` to get `windowStart`.
    pub buffer: Duration,
    /// `{bucket}/{key}` template, `{HH}`/`{YYYYMMDD}`/`{FF}` are substituted
    /// by `getExpectedFile`.
    pub key_template: String,
    pub bucket: String,
    pub region: String,
    /// Forecast hour used for the near-term detection request (e.g. `f00`
    /// for HRRR's surface analysis).
    pub forecast_hour: u8,
}

/// Default configuration for the four supported models, mirroring
/// SPEC_FULL §4.1's example delays (HRRR ~55 min, GFS ~4 min) and key
/// templates.
pub fn default_model_configs() -> Vec<ModelConfig> {
    vec![
        ModelConfig {
            model: Model::Hrrr,
            cycle_hours: (0..24).collect(),
            publish_delay: Duration::minutes(55),
            detection_window: Duration::minutes(15),
            buffer: Duration::minutes(5),
            key_template: "hrrr.{YYYYMMDD}/conus/hrrr.t{HH}z.wrfsfcf{FF}.grib2".to_string(),
            bucket: "noaa-hrrr-bdp-pds".to_string(),
            region: "conus".to_string(),
            forecast_hour: 0,
        },
        ModelConfig {
            model: Model::Rap,
            cycle_hours: (0..24).collect(),
            publish_delay: Duration::minutes(50),
            detection_window: Duration::minutes(15),
            buffer: Duration::minutes(5),
            key_template: "rap.{YYYYMMDD}/rap.t{HH}z.awp130pgrbf{FF}.grib2".to_string(),
            bucket: "noaa-rap-pds".to_string(),
            region: "conus".to_string(),
            forecast_hour: 0,
        },
        ModelConfig {
            model: Model::Gfs,
            cycle_hours: vec![0, 6, 12, 18],
            publish_delay: Duration::hours(4),
            detection_window: Duration::minutes(20),
            buffer: Duration::minutes(10),
            key_template: "gfs.{YYYYMMDD}/{HH}/atmos/gfs.t{HH}z.pgrb2.0p25.f{FF}".to_string(),
            bucket: "noaa-gfs-bdp-pds".to_string(),
            region: "global".to_string(),
            forecast_hour: 0,
        },
        ModelConfig {
            model: Model::Ecmwf,
            cycle_hours: vec![0, 12],
            publish_delay: Duration::hours(7),
            detection_window: Duration::minutes(30),
            buffer: Duration::minutes(15),
            key_template: "{YYYYMMDD}/{HH}z/ifs/0p25/oper/{YYYYMMDD}{HH}0000-0h-oper-fc.grib2"
                .to_string(),
            bucket: "ecmwf-forecasts".to_string(),
            region: "global".to_string(),
            forecast_hour: 0,
        },
    ]
}
