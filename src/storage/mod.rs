//! Bronze-layer storage backends
//!
//! A [`Storage`] persists raw JSON under the relative paths produced by
//! [`path::PartitionPath`]. Backends only differ in where those paths land:
//!
//! - [`local::LocalStorage`] - files under a root directory
//! - [`object_store::ObjectStorage`] - objects under a bucket and key prefix
//!
//! Writes replace existing content, so re-running a zone for the same ingest date
//! overwrites its files instead of duplicating them.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::metrics::record_files_written;
use crate::{Location, MeasurementPage, Sensor, SensorIndexEntry};

pub mod local;
pub mod object_store;
pub mod path;

pub use local::LocalStorage;
pub use object_store::{MemoryObjectClient, ObjectClient, ObjectStorage};
pub use path::PartitionPath;

/// Content type of JSON documents
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Content type of newline-delimited JSON
pub const JSONL_CONTENT_TYPE: &str = "application/x-ndjson";

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Local filesystem error
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path being written
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Document could not be serialized
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Object store rejected a put
    #[error("failed to put object {key}: {message}")]
    ObjectPut {
        /// Object key
        key: String,
        /// Store error description
        message: String,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Local filesystem
    Local,
    /// S3-compatible object store
    S3,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(StorageBackend::Local),
            "s3" => Ok(StorageBackend::S3),
            _ => Err(format!("Invalid storage backend: '{s}'. Use 'local' or 's3'")),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Local => write!(f, "local"),
            StorageBackend::S3 => write!(f, "s3"),
        }
    }
}

#[derive(Serialize)]
struct LocationsIndex<'a> {
    locations: &'a [Location],
}

#[derive(Serialize)]
struct LocationSensors<'a> {
    location_id: i64,
    sensors: &'a [Sensor],
}

#[derive(Serialize)]
struct SensorsIndex<'a> {
    sensors: &'a [SensorIndexEntry],
}

fn to_document<T: Serialize>(value: &T) -> StorageResult<Value> {
    serde_json::to_value(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Bronze-layer writer
///
/// Implementors provide [`Storage::put`]; the typed save operations are shared so every
/// backend produces identical documents at identical relative paths.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Backend kind
    fn backend(&self) -> StorageBackend;

    /// Full location (path or URI) of a relative partition path
    fn location(&self, relative: &str) -> String;

    /// Write `body` to `relative`, replacing any existing content
    async fn put(&self, relative: &str, body: Vec<u8>, content_type: &str) -> StorageResult<()>;

    /// Storage root, for reporting
    fn root(&self) -> String {
        self.location("")
    }

    /// Persist one JSON document
    async fn save_json(&self, relative: &str, document: &Value) -> StorageResult<()> {
        let body =
            serde_json::to_vec(document).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.put(relative, body, JSON_CONTENT_TYPE).await?;
        debug!(location = %self.location(relative), "Saved JSON document");
        Ok(())
    }

    /// Persist records as newline-delimited JSON, one record per line
    async fn save_jsonl(&self, relative: &str, records: &[Value]) -> StorageResult<()> {
        let mut body = Vec::new();
        for record in records {
            serde_json::to_writer(&mut body, record)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            body.push(b'\n');
        }
        self.put(relative, body, JSONL_CONTENT_TYPE).await?;
        debug!(
            location = %self.location(relative),
            records = records.len(),
            "Saved JSONL document"
        );
        Ok(())
    }

    /// `locations_index.json` as `{"locations": [...]}`; returns the relative path
    async fn save_locations_index(
        &self,
        zone: &str,
        locations: &[Location],
        ingest_date: NaiveDate,
    ) -> StorageResult<String> {
        let relative = PartitionPath::new(zone, ingest_date).locations_index();
        let document = to_document(&LocationsIndex { locations })?;
        self.save_json(&relative, &document).await?;
        record_files_written("locations_index", 1);
        Ok(relative)
    }

    /// `sensors_loc-<id>.json` as `{"location_id": ..., "sensors": [...]}`
    async fn save_sensors_for_location(
        &self,
        zone: &str,
        location_id: i64,
        sensors: &[Sensor],
        ingest_date: NaiveDate,
    ) -> StorageResult<String> {
        let relative = PartitionPath::new(zone, ingest_date).sensors_for_location(location_id);
        let document = to_document(&LocationSensors {
            location_id,
            sensors,
        })?;
        self.save_json(&relative, &document).await?;
        record_files_written("sensors_location", 1);
        Ok(relative)
    }

    /// `sensors_index.json` as `{"sensors": [...]}`
    async fn save_sensors_index(
        &self,
        zone: &str,
        entries: &[SensorIndexEntry],
        ingest_date: NaiveDate,
    ) -> StorageResult<String> {
        let relative = PartitionPath::new(zone, ingest_date).sensors_index();
        let document = to_document(&SensorsIndex { sensors: entries })?;
        self.save_json(&relative, &document).await?;
        record_files_written("sensors_index", 1);
        Ok(relative)
    }

    /// One `page-<n>.json` per page, numbered from 1, each body written verbatim
    ///
    /// Returns the relative paths written, in page order.
    async fn save_measurements_raw(
        &self,
        zone: &str,
        sensor_id: i64,
        pages: &[MeasurementPage],
        ingest_date: NaiveDate,
    ) -> StorageResult<Vec<String>> {
        let partition = PartitionPath::new(zone, ingest_date);
        let mut written = Vec::with_capacity(pages.len());

        for (index, page) in pages.iter().enumerate() {
            let relative = partition.measurement_page(sensor_id, index + 1);
            self.save_json(&relative, page.body()).await?;
            written.push(relative);
        }

        record_files_written("measurement_page", written.len() as u64);
        Ok(written)
    }
}
