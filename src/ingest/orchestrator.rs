//! Run orchestration
//!
//! [`Orchestrator::run`] validates everything that can be checked up front (zones file,
//! zone selection, storage configuration, API key) before the first request. It then
//! builds a single fetcher and storage for the run and processes zones sequentially.

use chrono::{NaiveDate, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::config::{ApiSettings, ObjectStoreSettings};
use super::rate_limit::RateLimiter;
use super::summary::{RunSummary, ZoneOutcome};
use super::zone::ZoneProcessor;
use super::{IngestError, TimeWindow};
use crate::fetcher::shared_resources::global_openaq_rate_limiter;
use crate::fetcher::{AirQualitySource, OpenAqFetcher};
use crate::storage::{LocalStorage, ObjectStorage, Storage, StorageBackend};
use crate::zones::{load_zones, select_zones};
use crate::Zone;

/// Default zones file
pub const DEFAULT_ZONES_PATH: &str = "zones_config.json";

/// Default local output directory
pub const DEFAULT_OUT_DIR: &str = "./bronze";

/// Choose the storage backend
///
/// An explicit choice wins; otherwise object storage is used exactly when a bucket is
/// configured.
pub fn resolve_backend(
    explicit: Option<StorageBackend>,
    object_store: &ObjectStoreSettings,
) -> StorageBackend {
    explicit.unwrap_or(if object_store.bucket().is_some() {
        StorageBackend::S3
    } else {
        StorageBackend::Local
    })
}

/// What to extract and where to put it
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Zones document
    pub zones_path: PathBuf,
    /// Local output root (ignored for object storage)
    pub output_dir: PathBuf,
    /// Extraction window
    pub window: TimeWindow,
    /// Restrict the run to this zone
    pub target_zone: Option<String>,
    /// Explicit backend; `None` picks from the object-store settings
    pub storage: Option<StorageBackend>,
}

impl RunRequest {
    /// Request covering every zone of `zones_path`
    pub fn new(
        zones_path: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        window: TimeWindow,
    ) -> Self {
        Self {
            zones_path: zones_path.into(),
            output_dir: output_dir.into(),
            window,
            target_zone: None,
            storage: None,
        }
    }

    /// Restrict to one zone
    pub fn with_target_zone(mut self, zone: Option<String>) -> Self {
        self.target_zone = zone;
        self
    }

    /// Force a storage backend
    pub fn with_storage(mut self, storage: Option<StorageBackend>) -> Self {
        self.storage = storage;
        self
    }
}

/// Validated run: zones, window and partition date
#[derive(Debug, Clone)]
pub struct IngestRun {
    /// Zones to process, in order
    pub zones: Vec<Zone>,
    /// Extraction window
    pub window: TimeWindow,
    /// Partition date of everything written
    pub ingest_date: NaiveDate,
}

impl IngestRun {
    /// Run dated today (UTC)
    pub fn new(zones: Vec<Zone>, window: TimeWindow) -> Self {
        Self {
            zones,
            window,
            ingest_date: Utc::now().date_naive(),
        }
    }

    /// Override the partition date
    pub fn with_ingest_date(mut self, ingest_date: NaiveDate) -> Self {
        self.ingest_date = ingest_date;
        self
    }

    /// Process every zone sequentially
    ///
    /// A zone failure is recorded and the next zone still runs.
    pub async fn execute(
        &self,
        source: Arc<dyn AirQualitySource>,
        storage: Arc<dyn Storage>,
    ) -> RunSummary {
        let mut summary = RunSummary::new(self.ingest_date, self.window, storage.root());
        let processor = ZoneProcessor::new(source, storage);

        info!(
            zones = self.zones.len(),
            ingest_date = %self.ingest_date,
            storage = %summary.storage_location,
            "Starting extraction run"
        );

        for zone in &self.zones {
            match processor
                .extract_zone_data(zone, &self.window, self.ingest_date)
                .await
            {
                Ok(zone_summary) => {
                    if zone_summary.has_skips() {
                        warn!(
                            zone = %zone.name,
                            locations_failed = zone_summary.locations_failed,
                            sensors_failed = zone_summary.sensors_failed,
                            "Zone completed with skipped resources"
                        );
                    }
                    summary.zones.push(ZoneOutcome::Completed(zone_summary));
                }
                Err(e) => {
                    error!(zone = %zone.name, error = %e, "Zone failed, continuing with next zone");
                    summary.zones.push(ZoneOutcome::Failed {
                        zone: zone.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            zones_failed = summary.failed_zones().len(),
            pages = summary.total_pages_written(),
            measurements = summary.total_measurements(),
            "Extraction run finished"
        );
        summary
    }
}

/// Entry point for a full extraction run
pub struct Orchestrator {
    api: ApiSettings,
    object_store: ObjectStoreSettings,
    rate_limiter: Arc<RateLimiter>,
}

impl Orchestrator {
    /// Orchestrator using the process-wide OpenAQ rate limiter
    pub fn new(api: ApiSettings, object_store: ObjectStoreSettings) -> Self {
        Self {
            api,
            object_store,
            rate_limiter: global_openaq_rate_limiter(),
        }
    }

    /// Use a dedicated rate limiter
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Validate the request and build the run, fetcher and storage without fetching
    ///
    /// # Errors
    /// Any [`super::ConfigError`]: unreadable or malformed zones, unknown zone, incomplete
    /// object-store settings, missing API key.
    pub fn prepare(
        &self,
        request: &RunRequest,
    ) -> Result<(IngestRun, Arc<dyn AirQualitySource>, Arc<dyn Storage>), IngestError> {
        let zones = select_zones(
            load_zones(&request.zones_path)?,
            request.target_zone.as_deref(),
        )?;
        let storage = self.build_storage(request)?;
        let source: Arc<dyn AirQualitySource> = Arc::new(OpenAqFetcher::with_rate_limiter(
            &self.api,
            self.rate_limiter.clone(),
        )?);

        Ok((IngestRun::new(zones, request.window), source, storage))
    }

    /// Validate, then extract every selected zone
    pub async fn run(&self, request: &RunRequest) -> Result<RunSummary, IngestError> {
        let (run, source, storage) = self.prepare(request)?;
        Ok(run.execute(source, storage).await)
    }

    fn build_storage(&self, request: &RunRequest) -> Result<Arc<dyn Storage>, IngestError> {
        let storage: Arc<dyn Storage> = match resolve_backend(request.storage, &self.object_store)
        {
            StorageBackend::Local => Arc::new(LocalStorage::new(request.output_dir.clone())),
            StorageBackend::S3 => Arc::new(ObjectStorage::<aws_sdk_s3::Client>::from_settings(
                &self.object_store,
            )?),
        };
        info!(backend = %storage.backend(), root = %storage.root(), "Storage selected");
        Ok(storage)
    }
}
