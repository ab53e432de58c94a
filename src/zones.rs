//! Zone configuration loading and validation
//!
//! Zones are read from a JSON document of the form
//! `{"zones": [{"name": "...", "bbox": [west, south, east, north]}, ...]}`.

use crate::ingest::ConfigError;
use crate::storage::path::sanitize_partition_value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

/// Geographic filter `[west, south, east, north]` in decimal degrees
///
/// # Examples
///
/// ```
/// use openaq_bronze::zones::BoundingBox;
///
/// let bbox = BoundingBox::new(-100.6, 25.5, -99.95, 25.85).unwrap();
/// assert_eq!(bbox.to_query_param(), "-100.6,25.5,-99.95,25.85");
/// assert!(BoundingBox::new(1.0, 0.0, 0.0, 1.0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    west: f64,
    south: f64,
    east: f64,
    north: f64,
}

impl BoundingBox {
    /// Build a bounding box, enforcing `west < east` and `south < north`
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Result<Self, String> {
        if [west, south, east, north].iter().any(|v| !v.is_finite()) {
            return Err("bbox coordinates must be finite numbers".to_string());
        }
        if !(-180.0..=180.0).contains(&west) || !(-180.0..=180.0).contains(&east) {
            return Err(format!(
                "bbox longitudes must be within [-180, 180], got west={west} east={east}"
            ));
        }
        if !(-90.0..=90.0).contains(&south) || !(-90.0..=90.0).contains(&north) {
            return Err(format!(
                "bbox latitudes must be within [-90, 90], got south={south} north={north}"
            ));
        }
        if west >= east {
            return Err(format!("bbox west ({west}) must be less than east ({east})"));
        }
        if south >= north {
            return Err(format!(
                "bbox south ({south}) must be less than north ({north})"
            ));
        }

        Ok(Self {
            west,
            south,
            east,
            north,
        })
    }

    /// Western longitude
    pub fn west(&self) -> f64 {
        self.west
    }

    /// Southern latitude
    pub fn south(&self) -> f64 {
        self.south
    }

    /// Eastern longitude
    pub fn east(&self) -> f64 {
        self.east
    }

    /// Northern latitude
    pub fn north(&self) -> f64 {
        self.north
    }

    /// Render as the provider's `bbox` query value: `west,south,east,north`
    pub fn to_query_param(&self) -> String {
        format!("{},{},{},{}", self.west, self.south, self.east, self.north)
    }
}

impl TryFrom<[f64; 4]> for BoundingBox {
    type Error = String;

    fn try_from(value: [f64; 4]) -> Result<Self, Self::Error> {
        let [west, south, east, north] = value;
        Self::new(west, south, east, north)
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(bbox: BoundingBox) -> Self {
        [bbox.west, bbox.south, bbox.east, bbox.north]
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.west, self.south, self.east, self.north
        )
    }
}

/// Named extraction zone; the name becomes the `zone=<name>` partition value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    /// Zone name
    pub name: String,
    /// Zone bounding box
    pub bbox: BoundingBox,
}

impl Zone {
    /// Create a zone
    pub fn new(name: impl Into<String>, bbox: BoundingBox) -> Self {
        Self {
            name: name.into(),
            bbox,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ZonesDocument {
    #[serde(default)]
    zones: Vec<Zone>,
}

/// Parse a zones document from a JSON string
///
/// # Errors
///
/// Returns [`ConfigError::MalformedZones`] for invalid JSON, a missing field, an invalid
/// bounding box, an empty zone name, or two zone names that map to the same `zone=`
/// partition.
pub fn parse_zones(contents: &str, source: &str) -> Result<Vec<Zone>, ConfigError> {
    let document: ZonesDocument =
        serde_json::from_str(contents).map_err(|e| ConfigError::MalformedZones {
            path: source.to_string(),
            reason: e.to_string(),
        })?;

    let mut seen = std::collections::HashMap::new();
    for zone in &document.zones {
        if zone.name.trim().is_empty() {
            return Err(ConfigError::MalformedZones {
                path: source.to_string(),
                reason: "zone name cannot be empty".to_string(),
            });
        }
        let partition = sanitize_partition_value(&zone.name);
        if let Some(previous) = seen.insert(partition.clone(), zone.name.as_str()) {
            let reason = if previous == zone.name {
                format!("duplicate zone name '{}'", zone.name)
            } else {
                format!(
                    "zones '{previous}' and '{}' both write to partition 'zone={partition}'",
                    zone.name
                )
            };
            return Err(ConfigError::MalformedZones {
                path: source.to_string(),
                reason,
            });
        }
    }

    if document.zones.is_empty() {
        warn!(path = %source, "No zones found in zones document");
    }

    Ok(document.zones)
}

/// Load zone definitions from a JSON file
pub fn load_zones(path: &Path) -> Result<Vec<Zone>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ZonesFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let zones = parse_zones(&contents, &path.display().to_string())?;
    debug!(path = %path.display(), count = zones.len(), "Loaded zone definitions");
    Ok(zones)
}

/// Narrow the zone list to `target` when one is requested
///
/// # Errors
///
/// Returns [`ConfigError::ZoneNotFound`] listing the available zones when nothing matches.
pub fn select_zones(zones: Vec<Zone>, target: Option<&str>) -> Result<Vec<Zone>, ConfigError> {
    let Some(target) = target else {
        return Ok(zones);
    };

    let available: Vec<String> = zones.iter().map(|z| z.name.clone()).collect();
    let selected: Vec<Zone> = zones.into_iter().filter(|z| z.name == target).collect();

    if selected.is_empty() {
        return Err(ConfigError::ZoneNotFound {
            zone: target.to_string(),
            available,
        });
    }

    Ok(selected)
}
