//! OpenAQ v3 fetcher
//!
//! Implements [`AirQualitySource`] against the live API: bbox location search, per-location
//! sensor listing and per-sensor raw measurements, each fully paginated.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::fetcher::openaq_config::{OpenAqEndpoints, OPENAQ_V3};
use crate::fetcher::openaq_http::OpenAqHttpClient;
use crate::fetcher::pagination::PaginationHelper;
use crate::fetcher::shared_resources::{global_http_client, global_openaq_rate_limiter};
use crate::fetcher::{AirQualitySource, FetcherResult};
use crate::ingest::config::ApiSettings;
use crate::ingest::rate_limit::RateLimiter;
use crate::ingest::{ConfigError, TimeWindow};
use crate::{ApiPage, BoundingBox, Location, MeasurementPage, Sensor};

/// OpenAQ v3 fetcher
pub struct OpenAqFetcher {
    http: OpenAqHttpClient,
    endpoints: &'static OpenAqEndpoints,
    page_limit: u32,
}

impl OpenAqFetcher {
    /// Create a fetcher sharing the process-wide HTTP client and rate limiter
    pub fn new(settings: &ApiSettings) -> Result<Self, ConfigError> {
        Self::with_rate_limiter(settings, global_openaq_rate_limiter())
    }

    /// Create a fetcher admitting requests through `rate_limiter`
    ///
    /// # Errors
    /// [`ConfigError::MissingApiKey`] when no key is configured.
    pub fn with_rate_limiter(
        settings: &ApiSettings,
        rate_limiter: Arc<RateLimiter>,
    ) -> Result<Self, ConfigError> {
        let api_key = settings.api_key().ok_or(ConfigError::MissingApiKey)?;
        let http = OpenAqHttpClient::new(
            global_http_client()?,
            settings.base_url.clone(),
            api_key,
            rate_limiter,
            settings.retry,
        )?;

        Ok(Self {
            http,
            endpoints: &OPENAQ_V3,
            page_limit: settings.page_limit.max(1),
        })
    }

    /// Page size sent with every paginated request
    pub fn page_limit(&self) -> u32 {
        self.page_limit
    }

    async fn fetch_all_pages(
        &self,
        endpoint: &str,
        base_params: &[(&'static str, String)],
        resource: &str,
    ) -> FetcherResult<Vec<ApiPage>> {
        PaginationHelper::paginate(resource, self.page_limit, |page| {
            let mut params = base_params.to_vec();
            params.push(("limit", self.page_limit.to_string()));
            params.push(("page", page.to_string()));
            async move { self.http.get(endpoint, &params, resource).await }
        })
        .await
    }
}

#[async_trait]
impl AirQualitySource for OpenAqFetcher {
    async fn fetch_locations_by_bbox(&self, bbox: &BoundingBox) -> FetcherResult<Vec<Location>> {
        let resource = format!("locations in bbox {}", bbox.to_query_param());
        let pages = self
            .fetch_all_pages(
                self.endpoints.locations_endpoint,
                &[("bbox", bbox.to_query_param())],
                &resource,
            )
            .await?;

        let locations: Vec<Location> = PaginationHelper::collect_results(&resource, &pages)?;
        info!(
            bbox = %bbox,
            pages = pages.len(),
            locations = locations.len(),
            "Fetched locations"
        );
        Ok(locations)
    }

    async fn fetch_sensors_for_location(&self, location_id: i64) -> FetcherResult<Vec<Sensor>> {
        let resource = format!("location {location_id} sensors");
        let endpoint = self.endpoints.location_sensors(location_id);
        let pages = self.fetch_all_pages(&endpoint, &[], &resource).await?;

        let sensors: Vec<Sensor> = PaginationHelper::collect_results(&resource, &pages)?;
        debug!(location_id, sensors = sensors.len(), "Fetched sensors");
        Ok(sensors)
    }

    async fn fetch_measurements_for_sensor(
        &self,
        sensor_id: i64,
        window: &TimeWindow,
    ) -> FetcherResult<Vec<MeasurementPage>> {
        let resource = format!("sensor {sensor_id} measurements");
        let endpoint = self.endpoints.sensor_measurements(sensor_id);
        let pages = self
            .fetch_all_pages(
                &endpoint,
                &[
                    ("datetime_from", window.from_param()),
                    ("datetime_to", window.to_param()),
                ],
                &resource,
            )
            .await?;

        debug!(
            sensor_id,
            pages = pages.len(),
            records = pages.iter().map(ApiPage::result_count).sum::<usize>(),
            "Fetched measurements"
        );
        Ok(pages)
    }

    fn base_url(&self) -> &str {
        self.http.base_url()
    }
}
