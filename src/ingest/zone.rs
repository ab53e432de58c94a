//! Per-zone extraction
//!
//! For one zone the processor:
//!
//! 1. searches locations inside the bbox and saves `locations_index.json`
//! 2. lists the sensors of every location and saves `sensors_loc-<id>.json`
//! 3. saves the consolidated `sensors_index.json`
//! 4. fetches the measurement pages of every sensor and saves them as `page-<n>.json`
//!
//! A failed sensor listing or measurement fetch skips that location or sensor. A failed
//! location search or any storage error aborts the zone.

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{info, warn};

use super::summary::ZoneSummary;
use super::{TimeWindow, ZoneError};
use crate::fetcher::AirQualitySource;
use crate::metrics::{record_fetch_skipped, ZoneMetrics};
use crate::storage::Storage;
use crate::{Location, SensorIndexEntry, Zone};

/// Extracts one zone at a time from a source into a storage backend
pub struct ZoneProcessor {
    source: Arc<dyn AirQualitySource>,
    storage: Arc<dyn Storage>,
}

impl ZoneProcessor {
    /// Processor reading from `source` and writing to `storage`
    pub fn new(source: Arc<dyn AirQualitySource>, storage: Arc<dyn Storage>) -> Self {
        Self { source, storage }
    }

    /// Extract locations, sensors and raw measurements of `zone` within `window`
    ///
    /// # Errors
    /// [`ZoneError::Locations`] when the location search fails, [`ZoneError::Storage`] when
    /// a write fails.
    pub async fn extract_zone_data(
        &self,
        zone: &Zone,
        window: &TimeWindow,
        ingest_date: NaiveDate,
    ) -> Result<ZoneSummary, ZoneError> {
        let metrics = ZoneMetrics::start(&zone.name);

        match self.process(zone, window, ingest_date).await {
            Ok(summary) => {
                metrics.record_success(&summary);
                Ok(summary)
            }
            Err(e) => {
                metrics.record_failure(&e.to_string());
                Err(e)
            }
        }
    }

    async fn process(
        &self,
        zone: &Zone,
        window: &TimeWindow,
        ingest_date: NaiveDate,
    ) -> Result<ZoneSummary, ZoneError> {
        info!(
            zone = %zone.name,
            bbox = %zone.bbox,
            from = %window.from_param(),
            to = %window.to_param(),
            "Processing zone"
        );
        let mut summary = ZoneSummary::new(&zone.name);

        let locations = self
            .source
            .fetch_locations_by_bbox(&zone.bbox)
            .await
            .map_err(|source| ZoneError::Locations {
                zone: zone.name.clone(),
                source,
            })?;
        summary.locations_found = locations.len() as u64;

        self.storage
            .save_locations_index(&zone.name, &locations, ingest_date)
            .await?;

        if locations.is_empty() {
            info!(zone = %zone.name, "No locations found in this area");
            return Ok(summary);
        }

        let sensors = self
            .collect_sensors(zone, &locations, ingest_date, &mut summary)
            .await?;

        self.storage
            .save_sensors_index(&zone.name, &sensors, ingest_date)
            .await?;

        self.collect_measurements(zone, &sensors, window, ingest_date, &mut summary)
            .await?;

        Ok(summary)
    }

    /// List sensors per location, persisting each location's list
    ///
    /// Returns one index entry per sensor occurrence; a sensor reported by two locations
    /// appears twice.
    async fn collect_sensors(
        &self,
        zone: &Zone,
        locations: &[Location],
        ingest_date: NaiveDate,
        summary: &mut ZoneSummary,
    ) -> Result<Vec<SensorIndexEntry>, ZoneError> {
        let mut entries = Vec::new();

        for location in locations {
            let sensors = match self.source.fetch_sensors_for_location(location.id()).await {
                Ok(sensors) => sensors,
                Err(e) => {
                    warn!(
                        zone = %zone.name,
                        location_id = location.id(),
                        error = %e,
                        "Skipping location after sensor fetch failure"
                    );
                    summary.locations_failed += 1;
                    record_fetch_skipped("location");
                    continue;
                }
            };

            self.storage
                .save_sensors_for_location(&zone.name, location.id(), &sensors, ingest_date)
                .await?;

            entries.extend(
                sensors
                    .iter()
                    .map(|sensor| SensorIndexEntry::new(location, sensor)),
            );
        }

        summary.sensors_found = entries.len() as u64;
        info!(
            zone = %zone.name,
            locations = locations.len(),
            sensors = entries.len(),
            "Collected sensors"
        );
        Ok(entries)
    }

    async fn collect_measurements(
        &self,
        zone: &Zone,
        sensors: &[SensorIndexEntry],
        window: &TimeWindow,
        ingest_date: NaiveDate,
        summary: &mut ZoneSummary,
    ) -> Result<(), ZoneError> {
        for (index, entry) in sensors.iter().enumerate() {
            let pages = match self
                .source
                .fetch_measurements_for_sensor(entry.sensor_id, window)
                .await
            {
                Ok(pages) => pages,
                Err(e) => {
                    warn!(
                        zone = %zone.name,
                        sensor_id = entry.sensor_id,
                        location_id = entry.location_id,
                        error = %e,
                        "Skipping sensor after measurement fetch failure"
                    );
                    summary.sensors_failed += 1;
                    record_fetch_skipped("sensor");
                    continue;
                }
            };

            let written = self
                .storage
                .save_measurements_raw(&zone.name, entry.sensor_id, &pages, ingest_date)
                .await?;

            let records: usize = pages.iter().map(|p| p.result_count()).sum();
            summary.sensors_succeeded += 1;
            summary.pages_written += written.len() as u64;
            summary.measurements += records as u64;

            info!(
                zone = %zone.name,
                sensor_id = entry.sensor_id,
                parameter = entry.parameter.as_deref().unwrap_or("unknown"),
                pages = written.len(),
                records,
                progress = %format!("{}/{}", index + 1, sensors.len()),
                "Saved measurements"
            );
        }

        Ok(())
    }
}
