//! Extraction orchestration and rate limiting
//!
//! This module drives a run end to end:
//!
//! 1. **Configuration**: API, retry and object-store settings live in [`config`]
//! 2. **Throttling**: every outbound request is admitted by [`rate_limit::RateLimiter`]
//! 3. **Per-zone work**: [`zone::ZoneProcessor`] walks locations, sensors and measurements
//! 4. **Run control**: [`orchestrator::Orchestrator`] validates configuration, selects the
//!    storage backend and processes zones one after another
//! 5. **Reporting**: [`summary::RunSummary`] collects per-zone outcomes
//!
//! # Error Handling
//!
//! Configuration problems surface as [`ConfigError`] before any network traffic. Once a run
//! has started, a failure while listing a zone's locations or writing its files is recorded
//! as a failed zone ([`ZoneError`]) and the run moves on to the next zone.

pub mod config;
pub mod orchestrator;
pub mod rate_limit;
pub mod summary;
pub mod zone;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

pub use config::{ApiSettings, ObjectStoreSettings, RetryPolicy};
pub use orchestrator::{IngestRun, Orchestrator, RunRequest};
pub use rate_limit::{Quota, RateLimiter};
pub use summary::{RunSummary, ZoneOutcome, ZoneSummary};
pub use zone::ZoneProcessor;

use crate::fetcher::FetcherError;
use crate::storage::StorageError;

/// Errors detected before a run starts fetching
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No API key was provided
    #[error("OpenAQ API key is not configured (set OPENAQ_API_KEY)")]
    MissingApiKey,

    /// API key cannot be sent as a header value
    #[error("OpenAQ API key contains characters that are not valid in an HTTP header")]
    InvalidApiKey,

    /// Zones file could not be read
    #[error("cannot read zones file {path}: {reason}")]
    ZonesFile {
        /// Zones file path
        path: String,
        /// Underlying IO error
        reason: String,
    },

    /// Zones document is not valid
    #[error("malformed zones document {path}: {reason}")]
    MalformedZones {
        /// Zones file path
        path: String,
        /// What is wrong with the document
        reason: String,
    },

    /// Requested zone is not defined
    #[error("zone '{zone}' not found; available zones: {}", .available.join(", "))]
    ZoneNotFound {
        /// Requested zone name
        zone: String,
        /// Zones defined in the document
        available: Vec<String>,
    },

    /// Object storage selected without a bucket
    #[error("object storage selected but no bucket is configured (set AWS_S3_BUCKET_NAME)")]
    MissingBucket,

    /// Object storage selected without credentials
    #[error("object storage selected but {0} is not configured")]
    MissingCredentials(&'static str),

    /// Time window is empty or inverted
    #[error("invalid time window: {0}")]
    InvalidTimeWindow(String),

    /// Shared HTTP client could not be built
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Failure that aborts a single zone
#[derive(Debug, thiserror::Error)]
pub enum ZoneError {
    /// Location search for the zone failed
    #[error("failed to fetch locations for zone {zone}: {source}")]
    Locations {
        /// Zone name
        zone: String,
        /// Fetch failure
        #[source]
        source: FetcherError,
    },

    /// Writing to the bronze layer failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Run-level errors
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Configuration rejected before fetching
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Half-open extraction window `[from, to)` in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl TimeWindow {
    /// Create a window, rejecting `from >= to`
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self, ConfigError> {
        if from >= to {
            return Err(ConfigError::InvalidTimeWindow(format!(
                "--from ({}) must be earlier than --to ({})",
                format_api_datetime(&from),
                format_api_datetime(&to)
            )));
        }
        Ok(Self { from, to })
    }

    /// Window start (inclusive)
    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    /// Window end (exclusive)
    pub fn to(&self) -> DateTime<Utc> {
        self.to
    }

    /// `datetime_from` query value
    pub fn from_param(&self) -> String {
        format_api_datetime(&self.from)
    }

    /// `datetime_to` query value
    pub fn to_param(&self) -> String {
        format_api_datetime(&self.to)
    }
}

/// ISO-8601 UTC timestamp with second precision and a `Z` suffix
pub fn format_api_datetime(datetime: &DateTime<Utc>) -> String {
    datetime.to_rfc3339_opts(SecondsFormat::Secs, true)
}
