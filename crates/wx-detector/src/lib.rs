//! Object-store polling/detection and GRIB2 extraction surroundings.
//!
//! `ObjectStoreDetector` (C2) owns the polling protocol and smart
//! range-download logic; `GribExtractor` (C3) owns everything around the
//! actual bit-level decode, which is delegated to a `GribDecoderBackend`
//! collaborator.

pub mod config;
pub mod error;
pub mod grib;
pub mod object_store;

pub use config::DetectorConfig;
pub use error::{DetectorError, DetectorResult};
pub use grib::{
    CityExtraction, CityPoint, ExtractionRequest, ExtractionResult, GribDecoderBackend,
    GribExtractor, RawPointValues, SimulationGribBackend,
};
pub use object_store::{
    IdxRecord, ObjectStoreBackend, ObjectStoreDetector, ReqwestObjectStore, SimulationObjectStore,
    WANTED_RECORDS,
};
