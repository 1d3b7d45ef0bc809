//! `ObjectStoreDetector` (C2): polls an object store for a model run's
//! publication and pulls down just the needed GRIB2 records.
//!
//! Each active detection owns one long-lived polling task, grounded on the
//! connection-manager idiom in `hip3-ws/connection.rs` (an owned task,
//! cancellable via an abort handle, driven by a fixed-interval tick loop
//! as in `hip3-ws/heartbeat.rs`) — generalized from a persistent websocket
//! to a short-lived HTTP poll loop that terminates once a window resolves.

use crate::config::DetectorConfig;
use crate::error::{DetectorError, DetectorResult};
use crate::grib::{CityPoint, ExtractionRequest, GribDecoderBackend, GribExtractor};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};
use wx_core::window::{DetectionWindow, WindowStatus};
use wx_eventbus::event::{FileConfirmedPayload, FileDetectedPayload};
use wx_eventbus::{Event, EventBus};
use wx_schedule::ExpectedFile;

/// One parsed `.idx` sidecar line:
/// `recNum:startByte:date:var:level:forecast:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdxRecord {
    pub rec_num: u32,
    pub start_byte: u64,
    pub date: String,
    pub var: String,
    pub level: String,
    pub forecast: String,
}

pub fn parse_idx(text: &str) -> DetectorResult<Vec<IdxRecord>> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(parse_idx_line)
        .collect()
}

fn parse_idx_line(line: &str) -> DetectorResult<IdxRecord> {
    let parts: Vec<&str> = line.splitn(7, ':').collect();
    if parts.len() < 6 {
        return Err(DetectorError::IdxParse(format!("malformed line: {line}")));
    }
    let rec_num = parts[0]
        .parse()
        .map_err(|_| DetectorError::IdxParse(format!("bad rec_num in: {line}")))?;
    let start_byte = parts[1]
        .parse()
        .map_err(|_| DetectorError::IdxParse(format!("bad start_byte in: {line}")))?;
    Ok(IdxRecord {
        rec_num,
        start_byte,
        date: parts[2].to_string(),
        var: parts[3].to_string(),
        level: parts[4].to_string(),
        forecast: parts[5].to_string(),
    })
}

/// Select indices (into `records`, in file order) whose `var:level:`
/// matches one of `wanted` (e.g. `":TMP:2 m above ground:"`).
pub fn select_matching(records: &[IdxRecord], wanted: &[&str]) -> Vec<usize> {
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| {
            let needle = format!(":{}:{}:", r.var, r.level);
            wanted.iter().any(|w| *w == needle)
        })
        .map(|(i, _)| i)
        .collect()
}

/// Byte range for each selected record; the end of a range is the next
/// record's start minus one, or `file_size - 1` for the last record in
/// the file (SPEC_FULL §4.2).
pub fn compute_byte_ranges(
    records: &[IdxRecord],
    selected: &[usize],
    file_size: u64,
) -> Vec<(usize, u64, u64)> {
    selected
        .iter()
        .map(|&i| {
            let start = records[i].start_byte;
            let end = records
                .get(i + 1)
                .map(|next| next.start_byte.saturating_sub(1))
                .unwrap_or(file_size.saturating_sub(1));
            (i, start, end)
        })
        .collect()
}

/// The object-store transport collaborator, abstracted so that tests never
/// touch the network.
#[async_trait]
pub trait ObjectStoreBackend: Send + Sync {
    async fn head(&self, bucket: &str, key: &str) -> DetectorResult<bool>;
    async fn get_idx(&self, bucket: &str, key: &str) -> DetectorResult<Option<String>>;
    async fn get_range(&self, bucket: &str, key: &str, start: u64, end: u64) -> DetectorResult<Vec<u8>>;
    async fn get_full(&self, bucket: &str, key: &str) -> DetectorResult<Vec<u8>>;
    async fn file_size(&self, bucket: &str, key: &str) -> DetectorResult<u64>;
}

/// Production backend. Uses a single shared, keep-alive `reqwest::Client`
/// with a bounded idle pool; `warm_up` issues a throwaway HEAD at startup
/// to avoid a cold-start TLS handshake on the first real poll.
pub struct ReqwestObjectStore {
    client: reqwest::Client,
}

impl ReqwestObjectStore {
    pub fn new(config: &DetectorConfig) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.max_idle_connections)
            .build()
            .expect("reqwest client config is always valid");
        Self { client }
    }

    pub async fn warm_up(&self, bucket: &str) {
        let url = format!("https://{bucket}.s3.amazonaws.com/");
        let _ = self.client.head(url).send().await;
    }

    fn object_url(bucket: &str, key: &str) -> String {
        format!("https://{bucket}.s3.amazonaws.com/{key}")
    }
}

#[async_trait]
impl ObjectStoreBackend for ReqwestObjectStore {
    async fn head(&self, bucket: &str, key: &str) -> DetectorResult<bool> {
        let resp = self
            .client
            .head(Self::object_url(bucket, key))
            .send()
            .await
            .map_err(|e| DetectorError::Transport(e.to_string()))?;
        Ok(resp.status().is_success())
    }

    async fn get_idx(&self, bucket: &str, key: &str) -> DetectorResult<Option<String>> {
        let idx_key = format!("{key}.idx");
        let resp = self
            .client
            .get(Self::object_url(bucket, &idx_key))
            .send()
            .await
            .map_err(|e| DetectorError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Ok(None);
        }
        let text = resp.text().await.map_err(|e| DetectorError::Transport(e.to_string()))?;
        Ok(Some(text))
    }

    async fn get_range(&self, bucket: &str, key: &str, start: u64, end: u64) -> DetectorResult<Vec<u8>> {
        let resp = self
            .client
            .get(Self::object_url(bucket, key))
            .header("Range", format!("bytes={start}-{end}"))
            .send()
            .await
            .map_err(|e| DetectorError::Transport(e.to_string()))?;
        let bytes = resp.bytes().await.map_err(|e| DetectorError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn get_full(&self, bucket: &str, key: &str) -> DetectorResult<Vec<u8>> {
        let resp = self
            .client
            .get(Self::object_url(bucket, key))
            .send()
            .await
            .map_err(|e| DetectorError::Transport(e.to_string()))?;
        let bytes = resp.bytes().await.map_err(|e| DetectorError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn file_size(&self, bucket: &str, key: &str) -> DetectorResult<u64> {
        let resp = self
            .client
            .head(Self::object_url(bucket, key))
            .send()
            .await
            .map_err(|e| DetectorError::Transport(e.to_string()))?;
        Ok(resp
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }
}

/// In-memory `ObjectStoreBackend` that never performs network I/O
/// (SPEC_FULL §9: "simulation mode"). Reports the file as published as
/// soon as `publish_delay` has elapsed since the backend was constructed,
/// so a simulation run exercises the full poll-then-detect path without
/// waiting on a real upstream bucket. `get_idx` always returns `None`,
/// driving callers down the full-download fallback path with a tiny
/// synthetic buffer.
pub struct SimulationObjectStore {
    publish_delay: std::time::Duration,
    started_at: std::time::Instant,
}

impl SimulationObjectStore {
    pub fn new(publish_delay: std::time::Duration) -> Self {
        Self {
            publish_delay,
            started_at: std::time::Instant::now(),
        }
    }
}

#[async_trait]
impl ObjectStoreBackend for SimulationObjectStore {
    async fn head(&self, _bucket: &str, _key: &str) -> DetectorResult<bool> {
        Ok(self.started_at.elapsed() >= self.publish_delay)
    }

    async fn get_idx(&self, _bucket: &str, _key: &str) -> DetectorResult<Option<String>> {
        Ok(None)
    }

    async fn get_range(&self, _bucket: &str, _key: &str, _start: u64, _end: u64) -> DetectorResult<Vec<u8>> {
        Ok(vec![0u8; 16])
    }

    async fn get_full(&self, _bucket: &str, _key: &str) -> DetectorResult<Vec<u8>> {
        Ok(vec![0u8; 16])
    }

    async fn file_size(&self, _bucket: &str, _key: &str) -> DetectorResult<u64> {
        Ok(16)
    }
}

/// Delegating impl so `wx-bot` can pick the simulation or live backend at
/// runtime (from config) while `ObjectStoreDetector` stays generic rather
/// than needing its own trait-object-specific constructor.
#[async_trait]
impl ObjectStoreBackend for Box<dyn ObjectStoreBackend> {
    async fn head(&self, bucket: &str, key: &str) -> DetectorResult<bool> {
        (**self).head(bucket, key).await
    }

    async fn get_idx(&self, bucket: &str, key: &str) -> DetectorResult<Option<String>> {
        (**self).get_idx(bucket, key).await
    }

    async fn get_range(&self, bucket: &str, key: &str, start: u64, end: u64) -> DetectorResult<Vec<u8>> {
        (**self).get_range(bucket, key, start, end).await
    }

    async fn get_full(&self, bucket: &str, key: &str) -> DetectorResult<Vec<u8>> {
        (**self).get_full(bucket, key).await
    }

    async fn file_size(&self, bucket: &str, key: &str) -> DetectorResult<u64> {
        (**self).file_size(bucket, key).await
    }
}

/// The set of `var:level` sidecar keys this pipeline cares about
/// (SPEC_FULL §4.2).
pub const WANTED_RECORDS: [&str; 4] = [
    ":TMP:2 m above ground:",
    ":UGRD:10 m above ground:",
    ":VGRD:10 m above ground:",
    ":APCP:",
];

pub struct ObjectStoreDetector<O: ObjectStoreBackend + 'static, B: GribDecoderBackend + 'static> {
    backend: Arc<O>,
    extractor: Arc<GribExtractor<B>>,
    config: DetectorConfig,
    bus: EventBus,
    tasks: DashMap<String, JoinHandle<()>>,
}

impl<O: ObjectStoreBackend + 'static, B: GribDecoderBackend + 'static> ObjectStoreDetector<O, B> {
    pub fn new(
        backend: Arc<O>,
        extractor: Arc<GribExtractor<B>>,
        config: DetectorConfig,
        bus: EventBus,
    ) -> Self {
        Self {
            backend,
            extractor,
            config,
            bus,
            tasks: DashMap::new(),
        }
    }

    fn task_key(window: &DetectionWindow) -> String {
        format!("{}:{}:{}", window.model, window.cycle_hour, window.run_date)
    }

    /// Start polling for `expected_file`'s publication. Returns
    /// immediately; the poll loop runs on a spawned task.
    pub fn start_detection(&self, expected_file: ExpectedFile, mut window: DetectionWindow, cities: Vec<CityPoint>) {
        let key = Self::task_key(&window);
        let backend = self.backend.clone();
        let extractor = self.extractor.clone();
        let bus = self.bus.clone();
        let poll_interval = self.config.poll_interval();
        let idx_retry_attempts = self.config.idx_retry_attempts;
        let idx_retry_backoff = self.config.idx_retry_backoff();

        let handle = tokio::spawn(async move {
            loop {
                let now = Utc::now();
                if window.check_timeout(now) {
                    warn!(model = %window.model, cycle_hour = window.cycle_hour, "detection window missed");
                    return;
                }

                match backend.head(&expected_file.bucket, &expected_file.key).await {
                    Ok(true) => break,
                    Ok(false) => {}
                    Err(e) => {
                        error!(error = %e, "object store transport error, retrying next poll");
                    }
                }
                sleep(poll_interval).await;
            }

            let detected_at = Utc::now();
            window.advance(WindowStatus::Detecting);
            window.advance(WindowStatus::Detected);
            let detection_latency_ms = (detected_at - window.window_start).num_milliseconds();

            bus.emit(Event::FileDetected(FileDetectedPayload {
                model: window.model.clone(),
                cycle_hour: window.cycle_hour,
                detected_at,
                detection_latency_ms,
            }));
            info!(model = %window.model, detection_latency_ms, "file detected");

            let buffer = match fetch_buffer(
                backend.as_ref(),
                &expected_file.bucket,
                &expected_file.key,
                idx_retry_attempts,
                idx_retry_backoff,
            )
            .await
            {
                Ok(buf) => buf,
                Err(e) => {
                    error!(error = %e, "fatal parse-stage transport error");
                    return;
                }
            };

            let request = ExtractionRequest {
                model: window.model.clone(),
                cycle_hour: window.cycle_hour,
                run_date: window.run_date,
                forecast_hour: expected_file.forecast_hour,
                cities,
            };

            match extractor.extract(&buffer, request).await {
                Ok(result) => {
                    window.advance(WindowStatus::Confirmed);
                    let confirmed_at = Utc::now();
                    for city in &result.city_data {
                        bus.emit(Event::FileConfirmed(FileConfirmedPayload {
                            model: window.model.clone(),
                            cycle_hour: window.cycle_hour,
                            city: city.city.clone(),
                            value: wx_core::decimal::Temperature::new(
                                rust_decimal::Decimal::try_from(city.temp_f).unwrap_or_default(),
                            ),
                            precip_flag: city.total_precip_mm > 0.0,
                            confirmed_at,
                        }));
                    }
                }
                Err(e) => {
                    error!(error = %e, "grib extraction failed after successful detection");
                }
            }
        });

        self.tasks.insert(key, handle);
    }

    pub fn stop_detection(&self, key: &str) {
        if let Some((_, handle)) = self.tasks.remove(key) {
            handle.abort();
        }
    }

    pub fn stop_all(&self) {
        for entry in self.tasks.iter() {
            entry.value().abort();
        }
        self.tasks.clear();
    }
}

/// Smart range download: fetch the `.idx` sidecar (retrying transient
/// failures), select the wanted records, and concatenate their byte
/// ranges in selection order. Falls back to a full download if the
/// sidecar is missing or matches nothing (SPEC_FULL §4.2).
async fn fetch_buffer(
    backend: &impl ObjectStoreBackend,
    bucket: &str,
    key: &str,
    retry_attempts: u32,
    retry_backoff: std::time::Duration,
) -> DetectorResult<Vec<u8>> {
    let mut idx_text = None;
    for attempt in 0..retry_attempts {
        match backend.get_idx(bucket, key).await {
            Ok(Some(text)) => {
                idx_text = Some(text);
                break;
            }
            Ok(None) => break,
            Err(_) if attempt + 1 < retry_attempts => sleep(retry_backoff).await,
            Err(e) => return Err(e),
        }
    }

    let Some(idx_text) = idx_text else {
        return backend.get_full(bucket, key).await;
    };

    let records = parse_idx(&idx_text)?;
    let selected = select_matching(&records, &WANTED_RECORDS);
    if selected.is_empty() {
        return backend.get_full(bucket, key).await;
    }

    let file_size = backend.file_size(bucket, key).await?;
    let ranges = compute_byte_ranges(&records, &selected, file_size);

    let fetches = ranges
        .iter()
        .map(|&(_, start, end)| backend.get_range(bucket, key, start, end));
    match futures_util::future::try_join_all(fetches).await {
        Ok(chunks) => Ok(chunks.concat()),
        Err(e) => {
            warn!(error = %e, "range fetch failed, falling back to full download");
            backend.get_full(bucket, key).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_IDX: &str = "1:0:d=2026072712:TMP:2 m above ground:12 hour fcst:\n\
2:50000:d=2026072712:UGRD:10 m above ground:12 hour fcst:\n\
3:80000:d=2026072712:VGRD:10 m above ground:12 hour fcst:\n\
4:110000:d=2026072712:APCP:surface:12 hour fcst:\n\
5:140000:d=2026072712:DSWRF:surface:12 hour fcst:\n";

    #[test]
    fn parses_idx_lines() {
        let records = parse_idx(SAMPLE_IDX).unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].var, "TMP");
        assert_eq!(records[1].start_byte, 50000);
    }

    #[test]
    fn selects_only_wanted_variables() {
        let records = parse_idx(SAMPLE_IDX).unwrap();
        let selected = select_matching(&records, &WANTED_RECORDS);
        assert_eq!(selected, vec![0, 1, 2, 3]);
    }

    #[test]
    fn byte_ranges_use_next_records_start_as_end() {
        let records = parse_idx(SAMPLE_IDX).unwrap();
        let selected = select_matching(&records, &WANTED_RECORDS);
        let ranges = compute_byte_ranges(&records, &selected, 200_000);
        assert_eq!(ranges[0], (0, 0, 49_999));
        assert_eq!(ranges[3], (3, 110_000, 139_999));
    }

    #[test]
    fn last_selected_record_uses_file_size_when_it_is_the_final_record() {
        let records = parse_idx("1:0:d=2026072712:TMP:2 m above ground:12 hour fcst:\n").unwrap();
        let selected = select_matching(&records, &WANTED_RECORDS);
        let ranges = compute_byte_ranges(&records, &selected, 5_000);
        assert_eq!(ranges[0], (0, 0, 4_999));
    }

    #[test]
    fn malformed_line_is_an_idx_parse_error() {
        assert!(parse_idx("garbage\n").is_err());
    }
}
