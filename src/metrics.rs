//! Production observability metrics for the OpenAQ bronze extractor
//!
//! This module provides metrics collection for monitoring provider requests, 429
//! responses, retry behavior, rate limiter waits and per-zone throughput.
//!
//! ## Architecture
//!
//! - Uses `metrics` crate for low-overhead metric collection
//! - Prometheus exporter for scraping endpoint (enabled with `--metrics-addr`)
//! - Recording is a no-op until a recorder is installed

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::ingest::ZoneSummary;

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Correlation ID generator for request tracing
static CORRELATION_COUNTER: Lazy<Arc<RwLock<u64>>> = Lazy::new(|| Arc::new(RwLock::new(0)));

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: a second call is a no-op.
///
/// # Arguments
/// * `addr` - Socket address to bind Prometheus scrape endpoint (e.g., "0.0.0.0:9090")
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "openaq_requests_total",
        Unit::Count,
        "Total number of HTTP requests made to the OpenAQ API"
    );

    describe_counter!(
        "openaq_429_errors_total",
        Unit::Count,
        "Total number of 429 rate limit responses received"
    );

    describe_counter!(
        "openaq_retries_total",
        Unit::Count,
        "Total number of retry attempts"
    );

    describe_histogram!(
        "openaq_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );

    describe_histogram!(
        "openaq_retry_backoff_seconds",
        Unit::Seconds,
        "Duration of retry backoff or 429 cooldown in seconds"
    );

    describe_gauge!(
        "openaq_rate_limit_remaining",
        Unit::Count,
        "Remaining requests reported by the provider's rate limit headers"
    );

    describe_counter!(
        "rate_limiter_admissions_total",
        Unit::Count,
        "Total number of requests admitted by the local rate limiter"
    );

    describe_histogram!(
        "rate_limiter_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for rate limiter admission"
    );

    describe_counter!(
        "bronze_files_written_total",
        Unit::Count,
        "Total number of bronze files written, by kind"
    );

    describe_counter!(
        "fetch_skipped_total",
        Unit::Count,
        "Locations or sensors skipped after a fetch failure"
    );

    describe_counter!(
        "zones_completed_total",
        Unit::Count,
        "Total number of zones processed to completion"
    );

    describe_counter!(
        "zones_failed_total",
        Unit::Count,
        "Total number of zones aborted"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Generate a new correlation ID for request tracing
pub async fn generate_correlation_id() -> String {
    let mut counter = CORRELATION_COUNTER.write().await;
    *counter += 1;
    format!("req-{:08x}", *counter)
}

/// Collapse numeric path segments so ids do not explode label cardinality
///
/// `/sensors/3917/measurements` becomes `/sensors/{id}/measurements`.
pub fn endpoint_label(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Record an HTTP request with timing
pub struct HttpRequestMetrics {
    endpoint: String,
    start_time: Instant,
    correlation_id: String,
    attempt: u32,
}

impl HttpRequestMetrics {
    /// Start recording a new HTTP request
    pub async fn start(endpoint: &str, attempt: u32) -> Self {
        let endpoint = endpoint_label(endpoint);
        let correlation_id = generate_correlation_id().await;

        debug!(
            correlation_id = %correlation_id,
            endpoint = %endpoint,
            attempt = attempt,
            "Starting HTTP request metrics"
        );

        Self {
            endpoint,
            start_time: Instant::now(),
            correlation_id,
            attempt,
        }
    }

    /// Record completion of the HTTP request
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "openaq_requests_total",
            "endpoint" => self.endpoint.clone(),
            "status" => status_code.to_string(),
            "attempt" => self.attempt.to_string(),
        )
        .increment(1);

        histogram!(
            "openaq_request_duration_seconds",
            "endpoint" => self.endpoint.clone(),
        )
        .record(duration.as_secs_f64());

        if status_code == 429 {
            counter!(
                "openaq_429_errors_total",
                "endpoint" => self.endpoint.clone(),
            )
            .increment(1);

            warn!(
                correlation_id = %self.correlation_id,
                endpoint = %self.endpoint,
                attempt = self.attempt,
                duration_ms = duration.as_millis(),
                "Rate limit error (429) recorded"
            );
        }

        debug!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            status = status_code,
            duration_ms = duration.as_millis(),
            "HTTP request completed"
        );
    }

    /// Record a network error (no status code)
    pub fn record_network_error(&self) {
        let duration = self.start_time.elapsed();

        counter!(
            "openaq_requests_total",
            "endpoint" => self.endpoint.clone(),
            "status" => "network_error",
            "attempt" => self.attempt.to_string(),
        )
        .increment(1);

        histogram!(
            "openaq_request_duration_seconds",
            "endpoint" => self.endpoint.clone(),
        )
        .record(duration.as_secs_f64());

        warn!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            attempt = self.attempt,
            duration_ms = duration.as_millis(),
            "Network error recorded"
        );
    }

    /// Get the correlation ID for this request
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record retry backoff duration
pub fn record_retry_backoff(duration: Duration, attempt: u32) {
    counter!(
        "openaq_retries_total",
        "attempt" => attempt.to_string(),
    )
    .increment(1);

    histogram!(
        "openaq_retry_backoff_seconds",
        "attempt" => attempt.to_string(),
    )
    .record(duration.as_secs_f64());

    debug!(
        attempt = attempt,
        backoff_ms = duration.as_millis(),
        "Retry backoff recorded"
    );
}

/// Record the provider's remaining-request count from response headers
pub fn record_rate_limit_remaining(remaining: u32) {
    gauge!("openaq_rate_limit_remaining").set(remaining as f64);

    if remaining < 5 {
        warn!(remaining = remaining, "Provider rate limit nearly exhausted");
    } else {
        debug!(remaining = remaining, "Provider rate limit recorded");
    }
}

/// Rate limiter metrics helper
pub struct RateLimiterMetrics;

impl RateLimiterMetrics {
    /// Record one admission and the time it waited
    pub fn record_admission(wait_duration: Duration) {
        histogram!("rate_limiter_wait_seconds").record(wait_duration.as_secs_f64());
        counter!("rate_limiter_admissions_total").increment(1);

        if wait_duration.as_millis() > 100 {
            debug!(
                wait_ms = wait_duration.as_millis(),
                "Rate limiter admitted request after wait"
            );
        }
    }
}

/// Record files written to the bronze layer
pub fn record_files_written(kind: &'static str, count: u64) {
    counter!("bronze_files_written_total", "kind" => kind).increment(count);
}

/// Record a location or sensor skipped after a fetch failure
pub fn record_fetch_skipped(resource: &'static str) {
    counter!("fetch_skipped_total", "resource" => resource).increment(1);
}

/// Zone processing metrics
pub struct ZoneMetrics {
    zone: String,
    start_time: Instant,
}

impl ZoneMetrics {
    /// Start tracking a zone
    pub fn start(zone: impl Into<String>) -> Self {
        let zone = zone.into();
        info!(zone = %zone, "Zone extraction started");

        Self {
            zone,
            start_time: Instant::now(),
        }
    }

    /// Record successful zone completion
    pub fn record_success(&self, summary: &ZoneSummary) {
        let duration = self.start_time.elapsed();

        counter!(
            "zones_completed_total",
            "zone" => self.zone.clone(),
        )
        .increment(1);

        info!(
            zone = %self.zone,
            locations = summary.locations_found,
            sensors = summary.sensors_found,
            sensors_failed = summary.sensors_failed,
            pages = summary.pages_written,
            measurements = summary.measurements,
            duration_secs = duration.as_secs(),
            "Zone extraction completed"
        );
    }

    /// Record failed zone
    pub fn record_failure(&self, error: &str) {
        let duration = self.start_time.elapsed();

        counter!(
            "zones_failed_total",
            "zone" => self.zone.clone(),
        )
        .increment(1);

        error!(
            zone = %self.zone,
            error = %error,
            duration_secs = duration.as_secs(),
            "Zone extraction failed"
        );
    }
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}
