//! Data fetcher implementations

use crate::ingest::TimeWindow;
use crate::{BoundingBox, Location, MeasurementPage, Sensor};
use async_trait::async_trait;

pub mod openaq;
pub mod openaq_config;
pub mod openaq_http;
pub mod pagination;
pub mod retry_formatter;
pub mod shared_resources;

pub use openaq::OpenAqFetcher;
pub use openaq_http::OpenAqHttpClient;

/// Fetcher errors
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// Server-side failure that persisted through every retry
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Non-retryable 4xx response
    #[error("client error {status}: {body}")]
    ClientError {
        /// Status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// Response parse error
    #[error("parse error: {0}")]
    ParseError(String),

    /// API error response
    #[error("API error: {0}")]
    ApiError(String),

    /// Rate limit exceeded
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// Invalid response
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Network error
    #[error("network error: {0}")]
    NetworkError(String),
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Source of locations, sensors and raw measurement pages
///
/// Implemented by [`OpenAqFetcher`] for the live API; tests substitute in-memory sources.
#[async_trait]
pub trait AirQualitySource: Send + Sync {
    /// All monitoring locations inside `bbox`, across every page
    async fn fetch_locations_by_bbox(&self, bbox: &BoundingBox) -> FetcherResult<Vec<Location>>;

    /// All sensors attached to a location
    async fn fetch_sensors_for_location(&self, location_id: i64) -> FetcherResult<Vec<Sensor>>;

    /// Raw measurement pages of a sensor within `window`, in page order
    ///
    /// Returns at least one page; a sensor with no data yields a single empty page.
    async fn fetch_measurements_for_sensor(
        &self,
        sensor_id: i64,
        window: &TimeWindow,
    ) -> FetcherResult<Vec<MeasurementPage>>;

    /// Get the base URL for this source
    fn base_url(&self) -> &str;
}
