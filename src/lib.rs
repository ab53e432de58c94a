//! # OpenAQ Bronze Ingestion Library
//!
//! Extracts air-quality sensor data from the OpenAQ v3 REST API for configured geographic
//! zones and lands the responses, unmodified, in a partitioned bronze layout on either a
//! local filesystem or an S3-compatible object store.
//!
//! ## Features
//!
//! - **Quota-aware fetching**: every outbound request passes through a two-window sliding
//!   rate limiter (60 per minute, 2000 per hour)
//! - **Pagination**: page-number pagination driven by the provider's `meta.found` envelope
//! - **Retries**: bounded exponential backoff for transient failures and a cooldown for 429s
//! - **Pluggable storage**: identical partition layout for local and object-store backends
//! - **Partial-failure tolerance**: a failing location or sensor is skipped, not fatal
//!
//! ## Quick Start
//!
//! ```no_run
//! use openaq_bronze::ingest::{ApiSettings, Orchestrator, RunRequest, TimeWindow};
//! use openaq_bronze::ingest::config::ObjectStoreSettings;
//! use chrono::{TimeZone, Utc};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let api = ApiSettings::new(Some("my-key".to_string()));
//! let orchestrator = Orchestrator::new(api, ObjectStoreSettings::default());
//!
//! let window = TimeWindow::new(
//!     Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap(),
//!     Utc.with_ymd_and_hms(2025, 10, 2, 0, 0, 0).unwrap(),
//! )?;
//! let request = RunRequest::new("zones_config.json", "./bronze", window);
//!
//! let summary = orchestrator.run(&request).await?;
//! println!("pages written: {}", summary.total_pages_written());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`zones`] - Zone document loading and bounding-box validation
//! - [`fetcher`] - OpenAQ HTTP client, pagination and retry classification
//! - [`ingest`] - Rate limiter, zone processor and run orchestration
//! - [`storage`] - Partition layout and the local / object-store backends
//! - [`metrics`] - Prometheus metrics for requests, retries and throughput
//! - [`cli`] - Command-line surface

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// CLI command implementations
pub mod cli;

/// Data fetchers
pub mod fetcher;

/// Extraction orchestration and rate limiting
pub mod ingest;

/// Observability metrics
pub mod metrics;

/// Bronze-layer storage backends
pub mod storage;

/// Zone configuration
pub mod zones;

pub use zones::{BoundingBox, Zone};

/// Monitoring location returned by the locations search
///
/// The provider object is kept as received, field order and `null`s included, so the
/// persisted index is a faithful copy of the response. Only `id` is validated on decode.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    id: i64,
    raw: Map<String, Value>,
}

impl Location {
    /// Provider location id
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Human-readable name, if present and a string
    pub fn name(&self) -> Option<&str> {
        self.raw.get("name").and_then(Value::as_str)
    }

    /// City the location reports, from `locality` or else `city`
    pub fn locality(&self) -> Option<&str> {
        ["locality", "city"]
            .iter()
            .find_map(|key| self.raw.get(*key).and_then(Value::as_str))
    }

    /// Provider object as received
    pub fn provider(&self) -> Option<&Value> {
        self.raw.get("provider").filter(|value| !value.is_null())
    }

    /// Any provider field by name
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    /// The full provider object
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.raw
    }
}

/// Sensor attached to a location, kept as received like [`Location`]
#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    id: i64,
    raw: Map<String, Value>,
}

impl Sensor {
    /// Provider sensor id
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Sensor name
    pub fn name(&self) -> Option<&str> {
        self.raw.get("name").and_then(Value::as_str)
    }

    /// Parameter name, if the provider reported one
    pub fn parameter_name(&self) -> Option<&str> {
        self.parameter_field("name")
    }

    /// Parameter units, if the provider reported them
    pub fn parameter_units(&self) -> Option<&str> {
        self.parameter_field("units")
    }

    /// First measurement timestamp known to the provider
    pub fn datetime_first(&self) -> Option<&Value> {
        self.raw.get("datetimeFirst")
    }

    /// Last measurement timestamp known to the provider
    pub fn datetime_last(&self) -> Option<&Value> {
        self.raw.get("datetimeLast")
    }

    /// Any provider field by name
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    /// The full provider object
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.raw
    }

    fn parameter_field(&self, key: &str) -> Option<&str> {
        self.raw
            .get("parameter")
            .and_then(|parameter| parameter.get(key))
            .and_then(Value::as_str)
    }
}

fn record_id(raw: &Map<String, Value>) -> Result<i64, String> {
    match raw.get("id") {
        Some(value) => value
            .as_i64()
            .ok_or_else(|| format!("expected integer id, got {}", json_kind(value))),
        None => Err("missing id".to_string()),
    }
}

macro_rules! raw_record {
    ($ty:ident) => {
        impl TryFrom<Map<String, Value>> for $ty {
            type Error = String;

            fn try_from(raw: Map<String, Value>) -> Result<Self, Self::Error> {
                let id = record_id(&raw)?;
                Ok(Self { id, raw })
            }
        }

        impl Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                self.raw.serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw: Map<String, Value> = Map::deserialize(deserializer)?;
                Self::try_from(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

raw_record!(Location);
raw_record!(Sensor);

/// `meta.found` as reported by the provider: an exact count, or a bound such as `">1000"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Found {
    /// Exact number of matching results
    Exact(u64),
    /// Approximate count rendered as text
    Approximate(String),
}

/// Pagination metadata of a response envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMeta {
    /// Total results matching the query
    #[serde(default)]
    pub found: Option<Found>,
    /// Page size used by the provider
    #[serde(default)]
    pub limit: Option<u32>,
    /// 1-based page number
    #[serde(default)]
    pub page: Option<u32>,
}

/// One raw page of a paginated response
///
/// The body is kept exactly as decoded so it can be persisted verbatim; the envelope
/// metadata and result count are extracted once for pagination decisions.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiPage {
    meta: PageMeta,
    result_count: usize,
    body: Value,
}

/// Raw measurements page, persisted one file per page
pub type MeasurementPage = ApiPage;

impl ApiPage {
    /// Wrap a decoded response body
    ///
    /// A missing `results` array counts as an empty page; a `results` value that is not an
    /// array, or a malformed `meta`, is rejected.
    pub fn from_body(body: Value) -> Result<Self, String> {
        let meta = match body.get("meta") {
            Some(meta) => serde_json::from_value::<PageMeta>(meta.clone())
                .map_err(|e| format!("malformed meta envelope: {e}"))?,
            None => PageMeta::default(),
        };

        let result_count = match body.get("results") {
            Some(Value::Array(results)) => results.len(),
            Some(other) => {
                return Err(format!(
                    "expected results to be an array, got {}",
                    json_kind(other)
                ))
            }
            None => 0,
        };

        Ok(Self {
            meta,
            result_count,
            body,
        })
    }

    /// Envelope metadata
    pub fn meta(&self) -> &PageMeta {
        &self.meta
    }

    /// Number of entries in `results`
    pub fn result_count(&self) -> usize {
        self.result_count
    }

    /// The page exactly as received
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Consume the page, returning the raw body
    pub fn into_body(self) -> Value {
        self.body
    }

    /// Decode the `results` array into typed records
    pub fn decode_results<T: serde::de::DeserializeOwned>(&self) -> Result<Vec<T>, String> {
        match self.body.get("results") {
            Some(results) => serde_json::from_value(results.clone())
                .map_err(|e| format!("failed to decode results: {e}")),
            None => Ok(Vec::new()),
        }
    }

    /// Whether another page should be requested after this one
    ///
    /// Stops on an empty page. With an exact `found`, continues while
    /// `page_number * limit < found`; otherwise continues while the page is full.
    pub fn has_more(&self, page_number: u32, requested_limit: u32) -> bool {
        if self.result_count == 0 {
            return false;
        }

        let limit = self
            .meta
            .limit
            .filter(|limit| *limit > 0)
            .unwrap_or(requested_limit);

        match &self.meta.found {
            Some(Found::Exact(found)) => u64::from(page_number) * u64::from(limit) < *found,
            _ => self.result_count >= limit as usize,
        }
    }
}

impl Serialize for ApiPage {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.body.serialize(serializer)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Row of the consolidated per-zone sensors index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorIndexEntry {
    /// Owning location id
    pub location_id: i64,
    /// Owning location name
    pub location_name: Option<String>,
    /// City of the owning location
    pub city: Option<String>,
    /// Provider of the owning location, as received
    pub provider: Option<Value>,
    /// Sensor id
    pub sensor_id: i64,
    /// Parameter name
    pub parameter: Option<String>,
    /// Parameter units
    pub units: Option<String>,
    /// First measurement timestamp known to the provider
    pub datetime_first: Option<Value>,
    /// Last measurement timestamp known to the provider
    pub datetime_last: Option<Value>,
}

impl SensorIndexEntry {
    /// Build an index row for one sensor occurrence at a location
    pub fn new(location: &Location, sensor: &Sensor) -> Self {
        Self {
            location_id: location.id(),
            location_name: location.name().map(str::to_string),
            city: location.locality().map(str::to_string),
            provider: location.provider().cloned(),
            sensor_id: sensor.id(),
            parameter: sensor.parameter_name().map(str::to_string),
            units: sensor.parameter_units().map(str::to_string),
            datetime_first: sensor.datetime_first().cloned(),
            datetime_last: sensor.datetime_last().cloned(),
        }
    }
}
