//! Bronze partition layout
//!
//! Every backend writes under the same relative paths:
//!
//! ```text
//! zone=<zone>/metadata/ingest_date=YYYY-MM-DD/locations_index.json
//! zone=<zone>/metadata/ingest_date=YYYY-MM-DD/sensors_loc-<location_id>.json
//! zone=<zone>/metadata/ingest_date=YYYY-MM-DD/sensors_index.json
//! zone=<zone>/measurements/pages/ingest_date=YYYY-MM-DD/sensor_id=<sensor_id>/page-<n>.json
//! ```
//!
//! The local backend joins these onto its root directory, the object-store backend onto its
//! key prefix.
//!
//! # Usage Example
//!
//! ```rust
//! use openaq_bronze::storage::PartitionPath;
//! use chrono::NaiveDate;
//!
//! let date = NaiveDate::from_ymd_opt(2025, 10, 2).unwrap();
//! let partition = PartitionPath::new("Monterrey_Metropolitan", date);
//!
//! assert_eq!(
//!     partition.measurement_page(3917, 2),
//!     "zone=Monterrey_Metropolitan/measurements/pages/ingest_date=2025-10-02/sensor_id=3917/page-2.json"
//! );
//! ```

use chrono::NaiveDate;

/// Relative paths for one zone and ingest date
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPath {
    zone: String,
    ingest_date: String,
}

impl PartitionPath {
    /// Layout for `zone` written on `ingest_date`
    pub fn new(zone: &str, ingest_date: NaiveDate) -> Self {
        Self {
            zone: sanitize_partition_value(zone),
            ingest_date: format_ingest_date(ingest_date),
        }
    }

    /// Sanitized zone partition value
    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// `zone=<zone>/metadata/ingest_date=<date>`
    pub fn metadata_dir(&self) -> String {
        format!("zone={}/metadata/ingest_date={}", self.zone, self.ingest_date)
    }

    /// `zone=<zone>/measurements/pages/ingest_date=<date>/sensor_id=<id>`
    pub fn measurement_pages_dir(&self, sensor_id: i64) -> String {
        format!(
            "zone={}/measurements/pages/ingest_date={}/sensor_id={}",
            self.zone, self.ingest_date, sensor_id
        )
    }

    /// Locations index of the zone
    pub fn locations_index(&self) -> String {
        format!("{}/locations_index.json", self.metadata_dir())
    }

    /// Sensor list of one location
    pub fn sensors_for_location(&self, location_id: i64) -> String {
        format!("{}/sensors_loc-{}.json", self.metadata_dir(), location_id)
    }

    /// Consolidated sensors index of the zone
    pub fn sensors_index(&self) -> String {
        format!("{}/sensors_index.json", self.metadata_dir())
    }

    /// Raw measurements page `page_number` (1-based) of a sensor
    pub fn measurement_page(&self, sensor_id: i64, page_number: usize) -> String {
        format!(
            "{}/page-{}.json",
            self.measurement_pages_dir(sensor_id),
            page_number
        )
    }
}

/// `YYYY-MM-DD`
pub fn format_ingest_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Make a zone name safe to use as a single path segment
///
/// Path separators and `:` become `_`, and `..` becomes `__`, so a zone name can never
/// escape its partition directory.
pub fn sanitize_partition_value(value: &str) -> String {
    value
        .trim()
        .replace("..", "__")
        .replace(['/', '\\', ':'], "_")
}
