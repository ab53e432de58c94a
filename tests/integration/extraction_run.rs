//! End-to-end extraction runs against the mock API into local storage

use crate::support::mock_api::{MockApi, MockServer};
use chrono::{NaiveDate, TimeZone, Utc};
use openaq_bronze::ingest::{
    ApiSettings, ConfigError, IngestError, ObjectStoreSettings, Orchestrator, RateLimiter,
    RetryPolicy, RunRequest, RunSummary, TimeWindow, ZoneOutcome,
};
use openaq_bronze::storage::StorageBackend;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const ZONES: &str = r#"{
    "zones": [
        {"name": "TestZone", "bbox": [-100.6, 25.5, -99.95, 25.85]},
        {"name": "OtherZone", "bbox": [-101.1, 25.3, -100.8, 25.6]}
    ]
}"#;

fn ingest_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, 2).unwrap()
}

fn window() -> TimeWindow {
    TimeWindow::new(
        Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2025, 10, 2, 0, 0, 0).unwrap(),
    )
    .unwrap()
}

fn orchestrator(server: &MockServer) -> Orchestrator {
    let api = ApiSettings::new(Some("test-key".to_string()))
        .with_base_url(server.base_url.clone())
        .with_page_limit(10)
        .with_retry_policy(RetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(20),
            rate_limit_cooldown: Duration::from_millis(20),
        });
    Orchestrator::new(api, ObjectStoreSettings::default())
        .with_rate_limiter(Arc::new(RateLimiter::openaq()))
}

fn write_zones(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("zones_config.json");
    std::fs::write(&path, ZONES).unwrap();
    path
}

async fn run(
    server: &MockServer,
    zones_path: &Path,
    out: &Path,
    zone: Option<&str>,
) -> RunSummary {
    let request = RunRequest::new(zones_path, out, window())
        .with_target_zone(zone.map(str::to_string))
        .with_storage(Some(StorageBackend::Local));
    let (run, source, storage) = orchestrator(server).prepare(&request).unwrap();
    run.with_ingest_date(ingest_date())
        .execute(source, storage)
        .await
}

/// Relative paths of every file under `root`, sorted
fn list_files(root: &Path) -> Vec<String> {
    fn walk(dir: &Path, root: &Path, files: &mut Vec<String>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(&path, root, files);
            } else {
                let relative = path.strip_prefix(root).unwrap();
                files.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
    }

    let mut files = Vec::new();
    if root.exists() {
        walk(root, root, &mut files);
    }
    files.sort();
    files
}

fn read_json(path: PathBuf) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

async fn test_zone_api() -> MockServer {
    MockApi::new()
        .location(8118, "Obispado")
        .location(8120, "San Bernabe")
        .sensor(8118, 3917, "pm25")
        .sensor(8118, 3918, "o3")
        .sensor(8120, 4001, "pm10")
        .measurements(3917, 25)
        .measurements(3918, 4)
        .measurements(4001, 0)
        .start()
        .await
}

#[tokio::test]
async fn test_single_zone_run_writes_bronze_layout() {
    let server = test_zone_api().await;
    let dir = TempDir::new().unwrap();
    let zones = write_zones(&dir);
    let out = dir.path().join("bronze");

    let summary = run(&server, &zones, &out, Some("TestZone")).await;

    assert!(summary.is_success());
    assert_eq!(summary.zones.len(), 1);
    let zone = summary.zones[0].summary().unwrap();
    assert_eq!(zone.locations_found, 2);
    assert_eq!(zone.sensors_found, 3);
    assert_eq!(zone.sensors_succeeded, 3);
    assert_eq!(zone.pages_written, 3 + 1 + 1);
    assert_eq!(zone.measurements, 29);

    let meta = "zone=TestZone/metadata/ingest_date=2025-10-02";
    let pages = "zone=TestZone/measurements/pages/ingest_date=2025-10-02";
    assert_eq!(
        list_files(&out),
        vec![
            format!("{pages}/sensor_id=3917/page-1.json"),
            format!("{pages}/sensor_id=3917/page-2.json"),
            format!("{pages}/sensor_id=3917/page-3.json"),
            format!("{pages}/sensor_id=3918/page-1.json"),
            format!("{pages}/sensor_id=4001/page-1.json"),
            format!("{meta}/locations_index.json"),
            format!("{meta}/sensors_index.json"),
            format!("{meta}/sensors_loc-8118.json"),
            format!("{meta}/sensors_loc-8120.json"),
        ]
    );

    let locations = read_json(out.join(meta).join("locations_index.json"));
    assert_eq!(locations["locations"].as_array().unwrap().len(), 2);
    assert_eq!(locations["locations"][0]["locality"], "Monterrey");

    let index = read_json(out.join(meta).join("sensors_index.json"));
    let first = &index["sensors"][0];
    assert_eq!(first["locationId"], 8118);
    assert_eq!(first["city"], "Monterrey");
    assert_eq!(first["sensorId"], 3917);
    assert_eq!(first["parameter"], "pm25");

    let loc = read_json(out.join(meta).join("sensors_loc-8120.json"));
    assert_eq!(loc["location_id"], 8120);
    assert_eq!(loc["sensors"][0]["id"], 4001);

    // Pages keep the provider envelope verbatim
    let page = read_json(out.join(pages).join("sensor_id=3917/page-3.json"));
    assert_eq!(page["meta"]["page"], 3);
    assert_eq!(page["results"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_zone_without_locations_writes_empty_index() {
    let server = MockApi::new().start().await;
    let dir = TempDir::new().unwrap();
    let zones = write_zones(&dir);
    let out = dir.path().join("bronze");

    let summary = run(&server, &zones, &out, Some("OtherZone")).await;

    assert!(summary.is_success());
    assert_eq!(summary.total_locations(), 0);
    assert_eq!(
        list_files(&out),
        vec!["zone=OtherZone/metadata/ingest_date=2025-10-02/locations_index.json"]
    );
    let index = read_json(
        out.join("zone=OtherZone/metadata/ingest_date=2025-10-02/locations_index.json"),
    );
    assert_eq!(index["locations"], serde_json::json!([]));
}

#[tokio::test]
async fn test_failed_sensor_listing_skips_location() {
    let server = MockApi::new()
        .location(8118, "Obispado")
        .location(8120, "San Bernabe")
        .sensor(8118, 3917, "pm25")
        .measurements(3917, 2)
        .start()
        .await;
    let dir = TempDir::new().unwrap();
    let zones = write_zones(&dir);
    let out = dir.path().join("bronze");

    // Location 8120 has no sensors route in the mock and answers 404
    let summary = run(&server, &zones, &out, Some("TestZone")).await;

    assert!(summary.is_success());
    let zone = summary.zones[0].summary().unwrap();
    assert_eq!(zone.locations_failed, 1);
    assert_eq!(zone.sensors_found, 1);
    assert_eq!(zone.sensors_succeeded, 1);
    assert!(!out
        .join("zone=TestZone/metadata/ingest_date=2025-10-02/sensors_loc-8120.json")
        .exists());
}

#[tokio::test]
async fn test_failed_measurements_skip_sensor() {
    let server = MockApi::new()
        .location(8118, "Obispado")
        .sensor(8118, 3917, "pm25")
        .sensor(8118, 3918, "o3")
        .measurements(3918, 2)
        .start()
        .await;
    let dir = TempDir::new().unwrap();
    let zones = write_zones(&dir);
    let out = dir.path().join("bronze");

    let summary = run(&server, &zones, &out, Some("TestZone")).await;

    let zone = summary.zones[0].summary().unwrap();
    assert_eq!(zone.sensors_found, 2);
    assert_eq!(zone.sensors_failed, 1);
    assert_eq!(zone.sensors_succeeded, 1);
    assert_eq!(zone.pages_written, 1);
    assert!(!out
        .join("zone=TestZone/measurements/pages/ingest_date=2025-10-02/sensor_id=3917")
        .exists());
}

#[tokio::test]
async fn test_location_failure_fails_zone_and_run_continues() {
    let server = MockApi::new()
        .location(8118, "Obispado")
        .sensor(8118, 3917, "pm25")
        .measurements(3917, 1)
        .fail_with("/locations", &[400])
        .start()
        .await;
    let dir = TempDir::new().unwrap();
    let zones = write_zones(&dir);
    let out = dir.path().join("bronze");

    let summary = run(&server, &zones, &out, None).await;

    assert!(!summary.is_success());
    assert_eq!(summary.failed_zones(), vec!["TestZone"]);
    assert!(matches!(&summary.zones[0], ZoneOutcome::Failed { error, .. } if error.contains("400")));
    // Second zone still ran and got the location
    let other = summary.zones[1].summary().unwrap();
    assert_eq!(other.zone, "OtherZone");
    assert_eq!(other.locations_found, 1);
    assert!(!out.join("zone=TestZone").exists());
}

#[tokio::test]
async fn test_rerun_overwrites_same_files() {
    let server = test_zone_api().await;
    let dir = TempDir::new().unwrap();
    let zones = write_zones(&dir);
    let out = dir.path().join("bronze");

    run(&server, &zones, &out, Some("TestZone")).await;
    let first_files = list_files(&out);
    let first_index = std::fs::read(
        out.join("zone=TestZone/metadata/ingest_date=2025-10-02/sensors_index.json"),
    )
    .unwrap();

    run(&server, &zones, &out, Some("TestZone")).await;

    assert_eq!(list_files(&out), first_files);
    let second_index = std::fs::read(
        out.join("zone=TestZone/metadata/ingest_date=2025-10-02/sensors_index.json"),
    )
    .unwrap();
    assert_eq!(first_index, second_index);
}

#[tokio::test]
async fn test_unknown_zone_rejected_before_any_request() {
    let server = test_zone_api().await;
    let dir = TempDir::new().unwrap();
    let zones = write_zones(&dir);

    let request = RunRequest::new(&zones, dir.path().join("bronze"), window())
        .with_target_zone(Some("Atlantis".to_string()));
    let err = orchestrator(&server).run(&request).await.unwrap_err();

    match err {
        IngestError::Config(ConfigError::ZoneNotFound { zone, available }) => {
            assert_eq!(zone, "Atlantis");
            assert_eq!(available, vec!["TestZone", "OtherZone"]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_missing_api_key_rejected_before_any_request() {
    let server = test_zone_api().await;
    let dir = TempDir::new().unwrap();
    let zones = write_zones(&dir);

    let orchestrator = Orchestrator::new(
        ApiSettings::new(None).with_base_url(server.base_url.clone()),
        ObjectStoreSettings::default(),
    );
    let request = RunRequest::new(&zones, dir.path().join("bronze"), window());
    let err = orchestrator.run(&request).await.unwrap_err();

    assert!(matches!(err, IngestError::Config(ConfigError::MissingApiKey)));
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_object_storage_without_bucket_rejected() {
    let server = test_zone_api().await;
    let dir = TempDir::new().unwrap();
    let zones = write_zones(&dir);

    let request = RunRequest::new(&zones, dir.path().join("bronze"), window())
        .with_storage(Some(StorageBackend::S3));
    let err = orchestrator(&server).run(&request).await.unwrap_err();

    assert!(matches!(err, IngestError::Config(ConfigError::MissingBucket)));
}
