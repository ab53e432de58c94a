//! Zone processing against both storage backends with an in-memory source
//!
//! The same zone written to local disk and to an object store must produce the same
//! relative layout and byte-identical documents.

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use openaq_bronze::fetcher::{AirQualitySource, FetcherError, FetcherResult};
use openaq_bronze::ingest::{IngestRun, TimeWindow, ZoneError, ZoneProcessor};
use openaq_bronze::storage::{LocalStorage, MemoryObjectClient, ObjectStorage, Storage};
use openaq_bronze::{ApiPage, BoundingBox, Location, MeasurementPage, Sensor, Zone};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Fixed data set with injectable failures
#[derive(Default)]
struct StaticSource {
    locations: Vec<Location>,
    sensors: HashMap<i64, Vec<Sensor>>,
    pages: HashMap<i64, Vec<MeasurementPage>>,
    failing_locations: HashSet<i64>,
    failing_sensors: HashSet<i64>,
    fail_location_search: bool,
}

impl StaticSource {
    fn sample() -> Self {
        let location = |id: i64, name: &str| -> Location {
            serde_json::from_value(json!({ "id": id, "name": name, "timezone": "America/Monterrey" }))
                .unwrap()
        };
        let sensor = |id: i64, parameter: &str| -> Sensor {
            serde_json::from_value(json!({
                "id": id,
                "name": format!("{parameter} µg/m³"),
                "parameter": { "id": 2, "name": parameter, "units": "µg/m³" },
            }))
            .unwrap()
        };
        let page = |n: u64, values: &[f64]| -> MeasurementPage {
            let results: Vec<_> = values.iter().map(|v| json!({ "value": v })).collect();
            ApiPage::from_body(json!({
                "meta": { "page": n, "limit": 2, "found": ">2" },
                "results": results,
            }))
            .unwrap()
        };

        let mut source = Self {
            locations: vec![location(1, "Centro"), location(2, "Norte")],
            ..Self::default()
        };
        source.sensors.insert(1, vec![sensor(10, "pm25"), sensor(11, "no2")]);
        source.sensors.insert(2, vec![sensor(20, "pm10")]);
        source
            .pages
            .insert(10, vec![page(1, &[1.0, 2.0]), page(2, &[3.0])]);
        source.pages.insert(11, vec![page(1, &[])]);
        source.pages.insert(20, vec![page(1, &[7.5])]);
        source
    }
}

#[async_trait]
impl AirQualitySource for StaticSource {
    async fn fetch_locations_by_bbox(&self, _bbox: &BoundingBox) -> FetcherResult<Vec<Location>> {
        if self.fail_location_search {
            return Err(FetcherError::HttpError("Server error: 502".to_string()));
        }
        Ok(self.locations.clone())
    }

    async fn fetch_sensors_for_location(&self, location_id: i64) -> FetcherResult<Vec<Sensor>> {
        if self.failing_locations.contains(&location_id) {
            return Err(FetcherError::NetworkError("connection reset".to_string()));
        }
        Ok(self.sensors.get(&location_id).cloned().unwrap_or_default())
    }

    async fn fetch_measurements_for_sensor(
        &self,
        sensor_id: i64,
        _window: &TimeWindow,
    ) -> FetcherResult<Vec<MeasurementPage>> {
        if self.failing_sensors.contains(&sensor_id) {
            return Err(FetcherError::ClientError {
                status: 404,
                body: String::new(),
            });
        }
        Ok(self.pages.get(&sensor_id).cloned().unwrap_or_default())
    }

    fn base_url(&self) -> &str {
        "memory://"
    }
}

fn zone() -> Zone {
    Zone::new("Monterrey_Metropolitan", BoundingBox::new(-100.6, 25.5, -99.95, 25.85).unwrap())
}

fn window() -> TimeWindow {
    TimeWindow::new(
        Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2025, 10, 2, 0, 0, 0).unwrap(),
    )
    .unwrap()
}

fn ingest_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, 2).unwrap()
}

fn local_files(root: &Path, dir: &Path, files: &mut Vec<(String, Vec<u8>)>) {
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            local_files(root, &path, files);
        } else {
            let relative = path.strip_prefix(root).unwrap();
            files.push((
                relative.to_string_lossy().replace('\\', "/"),
                std::fs::read(&path).unwrap(),
            ));
        }
    }
}

#[tokio::test]
async fn test_local_and_object_store_layouts_match() {
    let source: Arc<dyn AirQualitySource> = Arc::new(StaticSource::sample());

    let dir = TempDir::new().unwrap();
    let local: Arc<dyn Storage> = Arc::new(LocalStorage::new(dir.path()));
    let client = Arc::new(MemoryObjectClient::new());
    let object: Arc<dyn Storage> = Arc::new(ObjectStorage::new(client.clone(), "air-quality", "bronze"));

    let local_summary = ZoneProcessor::new(source.clone(), local)
        .extract_zone_data(&zone(), &window(), ingest_date())
        .await
        .unwrap();
    let object_summary = ZoneProcessor::new(source, object)
        .extract_zone_data(&zone(), &window(), ingest_date())
        .await
        .unwrap();
    assert_eq!(local_summary, object_summary);
    assert_eq!(local_summary.pages_written, 4);
    assert_eq!(local_summary.measurements, 4);

    let mut local_objects = Vec::new();
    local_files(dir.path(), dir.path(), &mut local_objects);
    local_objects.sort();

    let object_objects: Vec<(String, Vec<u8>)> = client
        .keys("air-quality")
        .into_iter()
        .map(|key| {
            let body = client.get("air-quality", &key).unwrap().body;
            (key.trim_start_matches("bronze/").to_string(), body)
        })
        .collect();

    assert_eq!(local_objects.len(), 8);
    assert_eq!(local_objects, object_objects);
}

#[tokio::test]
async fn test_object_store_content_types() {
    let client = Arc::new(MemoryObjectClient::new());
    let storage: Arc<dyn Storage> = Arc::new(ObjectStorage::new(client.clone(), "air-quality", "bronze"));

    ZoneProcessor::new(Arc::new(StaticSource::sample()), storage)
        .extract_zone_data(&zone(), &window(), ingest_date())
        .await
        .unwrap();

    for key in client.keys("air-quality") {
        assert!(key.starts_with("bronze/zone=Monterrey_Metropolitan/"), "{key}");
        assert_eq!(
            client.get("air-quality", &key).unwrap().content_type,
            "application/json"
        );
    }
}

#[tokio::test]
async fn test_partial_failures_are_counted_not_fatal() {
    let mut source = StaticSource::sample();
    source.failing_locations.insert(2);
    source.failing_sensors.insert(11);

    let dir = TempDir::new().unwrap();
    let summary = ZoneProcessor::new(Arc::new(source), Arc::new(LocalStorage::new(dir.path())))
        .extract_zone_data(&zone(), &window(), ingest_date())
        .await
        .unwrap();

    assert_eq!(summary.locations_found, 2);
    assert_eq!(summary.locations_failed, 1);
    assert_eq!(summary.sensors_found, 2);
    assert_eq!(summary.sensors_failed, 1);
    assert_eq!(summary.sensors_succeeded, 1);
    assert_eq!(summary.pages_written, 2);
    assert!(summary.has_skips());
}

#[tokio::test]
async fn test_failed_sensor_between_successes_is_skipped() {
    let mut source = StaticSource::sample();
    let extra: Sensor = serde_json::from_value(json!({
        "id": 12,
        "name": "o3 ppm",
        "parameter": { "id": 10, "name": "o3", "units": "ppm" },
    }))
    .unwrap();
    let first_page = source.pages[&20][0].clone();
    source.locations.truncate(1);
    source.sensors.get_mut(&1).unwrap().push(extra);
    source.pages.insert(12, vec![first_page]);
    source.failing_sensors.insert(11);

    let dir = TempDir::new().unwrap();
    let storage = LocalStorage::new(dir.path());
    let summary = ZoneProcessor::new(Arc::new(source), Arc::new(storage.clone()))
        .extract_zone_data(&zone(), &window(), ingest_date())
        .await
        .unwrap();

    assert_eq!(summary.sensors_found, 3);
    assert_eq!(summary.sensors_succeeded, 2);
    assert_eq!(summary.sensors_failed, 1);

    let page_one = |sensor_id: i64| {
        storage.full_path(&format!(
            "zone=Monterrey_Metropolitan/measurements/pages/ingest_date=2025-10-02/sensor_id={sensor_id}/page-1.json"
        ))
    };
    assert!(page_one(10).exists());
    assert!(!page_one(11).exists());
    assert!(page_one(12).exists());
}

#[tokio::test]
async fn test_storage_failure_aborts_zone() {
    let client = Arc::new(MemoryObjectClient::new());
    client.fail_keys_containing("sensors_index.json");
    let storage: Arc<dyn Storage> = Arc::new(ObjectStorage::new(client.clone(), "air-quality", "bronze"));

    let err = ZoneProcessor::new(Arc::new(StaticSource::sample()), storage)
        .extract_zone_data(&zone(), &window(), ingest_date())
        .await
        .unwrap_err();

    assert!(matches!(err, ZoneError::Storage(_)));
    // Nothing after the failed write was attempted
    assert!(client
        .keys("air-quality")
        .iter()
        .all(|key| !key.contains("/measurements/")));
}

#[tokio::test]
async fn test_run_records_failed_zone_and_continues() {
    let mut failing = StaticSource::sample();
    failing.fail_location_search = true;

    let client = Arc::new(MemoryObjectClient::new());
    let storage: Arc<dyn Storage> = Arc::new(ObjectStorage::new(client.clone(), "air-quality", "bronze"));

    let zones = vec![
        zone(),
        Zone::new("Saltillo", BoundingBox::new(-101.1, 25.3, -100.8, 25.6).unwrap()),
    ];
    let summary = IngestRun::new(zones, window())
        .with_ingest_date(ingest_date())
        .execute(Arc::new(failing), storage)
        .await;

    assert_eq!(summary.failed_zones(), vec!["Monterrey_Metropolitan", "Saltillo"]);
    assert_eq!(summary.storage_location, "s3://air-quality/bronze");
    assert!(client.keys("air-quality").is_empty());
}
