//! Per-zone and per-run extraction summaries

use chrono::NaiveDate;
use serde::Serialize;

use super::TimeWindow;

/// Counters for one processed zone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ZoneSummary {
    /// Zone name
    pub zone: String,
    /// Locations returned by the bbox search
    pub locations_found: u64,
    /// Locations whose sensor listing failed
    pub locations_failed: u64,
    /// Sensor occurrences discovered across all locations
    pub sensors_found: u64,
    /// Sensors whose measurements were fetched and stored
    pub sensors_succeeded: u64,
    /// Sensors whose measurement fetch failed
    pub sensors_failed: u64,
    /// Measurement page files written
    pub pages_written: u64,
    /// Measurement records across all written pages
    pub measurements: u64,
}

impl ZoneSummary {
    /// Empty summary for `zone`
    pub fn new(zone: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            ..Self::default()
        }
    }

    /// Whether any location or sensor was skipped
    pub fn has_skips(&self) -> bool {
        self.locations_failed > 0 || self.sensors_failed > 0
    }
}

/// Result of processing one zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ZoneOutcome {
    /// Zone processed; individual locations or sensors may have been skipped
    Completed(ZoneSummary),
    /// Zone aborted
    Failed {
        /// Zone name
        zone: String,
        /// Failure description
        error: String,
    },
}

impl ZoneOutcome {
    /// Zone name
    pub fn zone(&self) -> &str {
        match self {
            ZoneOutcome::Completed(summary) => &summary.zone,
            ZoneOutcome::Failed { zone, .. } => zone,
        }
    }

    /// Summary of a completed zone
    pub fn summary(&self) -> Option<&ZoneSummary> {
        match self {
            ZoneOutcome::Completed(summary) => Some(summary),
            ZoneOutcome::Failed { .. } => None,
        }
    }

    /// Whether the zone failed
    pub fn is_failed(&self) -> bool {
        matches!(self, ZoneOutcome::Failed { .. })
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Partition date of everything written by the run
    pub ingest_date: NaiveDate,
    /// Extraction window
    pub window: TimeWindow,
    /// Storage root the run wrote under
    pub storage_location: String,
    /// Per-zone outcomes, in processing order
    pub zones: Vec<ZoneOutcome>,
}

impl RunSummary {
    /// Empty summary
    pub fn new(ingest_date: NaiveDate, window: TimeWindow, storage_location: String) -> Self {
        Self {
            ingest_date,
            window,
            storage_location,
            zones: Vec::new(),
        }
    }

    /// True when no zone failed
    pub fn is_success(&self) -> bool {
        !self.zones.iter().any(ZoneOutcome::is_failed)
    }

    /// Names of failed zones
    pub fn failed_zones(&self) -> Vec<&str> {
        self.zones
            .iter()
            .filter(|z| z.is_failed())
            .map(ZoneOutcome::zone)
            .collect()
    }

    /// Completed zone summaries
    pub fn completed(&self) -> impl Iterator<Item = &ZoneSummary> {
        self.zones.iter().filter_map(ZoneOutcome::summary)
    }

    /// Locations found across completed zones
    pub fn total_locations(&self) -> u64 {
        self.completed().map(|z| z.locations_found).sum()
    }

    /// Sensors whose measurements were stored
    pub fn total_sensors_succeeded(&self) -> u64 {
        self.completed().map(|z| z.sensors_succeeded).sum()
    }

    /// Sensors and locations skipped after fetch failures
    pub fn total_skipped(&self) -> u64 {
        self.completed()
            .map(|z| z.locations_failed + z.sensors_failed)
            .sum()
    }

    /// Measurement pages written
    pub fn total_pages_written(&self) -> u64 {
        self.completed().map(|z| z.pages_written).sum()
    }

    /// Measurement records written
    pub fn total_measurements(&self) -> u64 {
        self.completed().map(|z| z.measurements).sum()
    }
}
