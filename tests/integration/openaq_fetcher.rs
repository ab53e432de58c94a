//! Integration tests for the OpenAQ fetcher against the in-process mock API
//!
//! Covers pagination, retry of server errors, the 429 cooldown and non-retryable 4xx.

use crate::support::mock_api::MockApi;
use chrono::{TimeZone, Utc};
use openaq_bronze::fetcher::{AirQualitySource, FetcherError, OpenAqFetcher};
use openaq_bronze::ingest::{ApiSettings, ConfigError, RateLimiter, RetryPolicy, TimeWindow};
use openaq_bronze::BoundingBox;
use std::sync::Arc;
use std::time::Duration;

fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(40),
        rate_limit_cooldown: Duration::from_millis(50),
    }
}

fn fetcher(base_url: &str, page_limit: u32, retry: RetryPolicy) -> OpenAqFetcher {
    let settings = ApiSettings::new(Some("test-key".to_string()))
        .with_base_url(base_url)
        .with_page_limit(page_limit)
        .with_retry_policy(retry);
    OpenAqFetcher::with_rate_limiter(&settings, Arc::new(RateLimiter::openaq())).unwrap()
}

fn window() -> TimeWindow {
    TimeWindow::new(
        Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2025, 10, 2, 0, 0, 0).unwrap(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_measurements_fetched_across_three_pages() {
    let server = MockApi::new().measurements(3917, 25).start().await;
    let fetcher = fetcher(&server.base_url, 10, fast_retry(3));

    let pages = fetcher
        .fetch_measurements_for_sensor(3917, &window())
        .await
        .unwrap();

    let counts: Vec<_> = pages.iter().map(|p| p.result_count()).collect();
    assert_eq!(counts, vec![10, 10, 5]);
    assert_eq!(server.hits("/sensors/3917/measurements"), 3);

    let requests = server.requests();
    let pages_requested: Vec<_> = requests
        .iter()
        .map(|r| r.query.get("page").cloned().unwrap_or_default())
        .collect();
    assert_eq!(pages_requested, vec!["1", "2", "3"]);

    let first = &requests[0];
    assert_eq!(first.api_key.as_deref(), Some("test-key"));
    assert_eq!(first.query.get("limit").map(String::as_str), Some("10"));
    assert_eq!(
        first.query.get("datetime_from").map(String::as_str),
        Some("2025-10-01T00:00:00Z")
    );
    assert_eq!(
        first.query.get("datetime_to").map(String::as_str),
        Some("2025-10-02T00:00:00Z")
    );
}

#[tokio::test]
async fn test_exact_multiple_of_limit_stops_without_extra_request() {
    let server = MockApi::new().measurements(1, 20).start().await;
    let fetcher = fetcher(&server.base_url, 10, fast_retry(3));

    let pages = fetcher
        .fetch_measurements_for_sensor(1, &window())
        .await
        .unwrap();

    assert_eq!(pages.len(), 2);
    assert_eq!(server.hits("/sensors/1/measurements"), 2);
}

#[tokio::test]
async fn test_sensor_without_data_yields_single_empty_page() {
    let server = MockApi::new().measurements(7, 0).start().await;
    let fetcher = fetcher(&server.base_url, 10, fast_retry(3));

    let pages = fetcher
        .fetch_measurements_for_sensor(7, &window())
        .await
        .unwrap();

    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].result_count(), 0);
}

#[tokio::test]
async fn test_locations_sent_with_bbox() {
    let server = MockApi::new()
        .location(8118, "Obispado")
        .location(8120, "San Bernabe")
        .start()
        .await;
    let fetcher = fetcher(&server.base_url, 100, fast_retry(3));
    let bbox = BoundingBox::new(-100.6, 25.5, -99.95, 25.85).unwrap();

    let locations = fetcher.fetch_locations_by_bbox(&bbox).await.unwrap();

    let ids: Vec<_> = locations.iter().map(|l| l.id()).collect();
    assert_eq!(ids, vec![8118, 8120]);
    // Unknown provider fields survive decoding
    assert_eq!(locations[0].locality(), Some("Monterrey"));
    assert_eq!(
        server.requests()[0].query.get("bbox").map(String::as_str),
        Some("-100.6,25.5,-99.95,25.85")
    );
}

#[tokio::test]
async fn test_server_error_retried_until_success() {
    let server = MockApi::new()
        .location(8118, "Obispado")
        .sensor(8118, 3917, "pm25")
        .fail_with("/locations/8118/sensors", &[500, 503])
        .start()
        .await;
    let fetcher = fetcher(&server.base_url, 100, fast_retry(3));

    let sensors = fetcher.fetch_sensors_for_location(8118).await.unwrap();

    assert_eq!(sensors.len(), 1);
    assert_eq!(sensors[0].parameter_name(), Some("pm25"));
    assert_eq!(server.hits("/locations/8118/sensors"), 3);
}

#[tokio::test]
async fn test_server_error_gives_up_after_max_retries() {
    let server = MockApi::new()
        .sensor(8118, 3917, "pm25")
        .fail_with("/locations/8118/sensors", &[500, 500, 500, 500])
        .start()
        .await;
    let fetcher = fetcher(&server.base_url, 100, fast_retry(2));

    let err = fetcher.fetch_sensors_for_location(8118).await.unwrap_err();

    assert!(matches!(err, FetcherError::HttpError(_)), "got {err:?}");
    // Initial attempt plus two retries
    assert_eq!(server.hits("/locations/8118/sensors"), 3);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockApi::new().start().await;
    let fetcher = fetcher(&server.base_url, 100, fast_retry(3));

    let err = fetcher.fetch_sensors_for_location(999).await.unwrap_err();

    match err {
        FetcherError::ClientError { status, .. } => assert_eq!(status, 404),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(server.hits("/locations/999/sensors"), 1);
}

#[tokio::test]
async fn test_rate_limited_request_cools_down_then_succeeds() {
    let server = MockApi::new()
        .measurements(3917, 3)
        .fail_with("/sensors/3917/measurements", &[429])
        .start()
        .await;
    let fetcher = fetcher(&server.base_url, 10, fast_retry(1));

    let started = std::time::Instant::now();
    let pages = fetcher
        .fetch_measurements_for_sensor(3917, &window())
        .await
        .unwrap();

    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].result_count(), 3);
    assert_eq!(server.hits("/sensors/3917/measurements"), 2);
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[tokio::test]
async fn test_cooldown_does_not_consume_retry_budget() {
    // One retry allowed: the 429 cooldown attempt is extra, the 500 uses the single retry
    let server = MockApi::new()
        .measurements(3917, 3)
        .fail_with("/sensors/3917/measurements", &[429, 500])
        .start()
        .await;
    let fetcher = fetcher(&server.base_url, 10, fast_retry(1));

    let pages = fetcher
        .fetch_measurements_for_sensor(3917, &window())
        .await
        .unwrap();

    assert_eq!(pages[0].result_count(), 3);
    assert_eq!(server.hits("/sensors/3917/measurements"), 3);
}

#[tokio::test]
async fn test_missing_api_key_rejected_before_any_request() {
    for key in [None, Some(String::new()), Some("   ".to_string())] {
        let settings = ApiSettings::new(key).with_base_url("http://127.0.0.1:9");
        let result = OpenAqFetcher::with_rate_limiter(&settings, Arc::new(RateLimiter::openaq()));
        assert!(matches!(result, Err(ConfigError::MissingApiKey)));
    }
}
