//! Zones document shipped with the repository

use openaq_bronze::ingest::ConfigError;
use openaq_bronze::zones::{load_zones, parse_zones, select_zones};
use std::path::Path;

fn bundled_zones_path() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("zones_config.json")
}

#[test]
fn test_bundled_zones_load() {
    let zones = load_zones(&bundled_zones_path()).unwrap();

    assert!(!zones.is_empty());
    let monterrey = zones
        .iter()
        .find(|z| z.name == "Monterrey_Metropolitan")
        .unwrap();
    assert_eq!(monterrey.bbox.to_query_param(), "-100.6,25.5,-99.95,25.85");
}

#[test]
fn test_select_single_bundled_zone() {
    let zones = load_zones(&bundled_zones_path()).unwrap();
    let selected = select_zones(zones, Some("Saltillo")).unwrap();

    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].name, "Saltillo");
}

#[test]
fn test_inverted_bbox_rejected() {
    let result = parse_zones(
        r#"{"zones": [{"name": "Backwards", "bbox": [-99.95, 25.5, -100.6, 25.85]}]}"#,
        "inline",
    );
    assert!(matches!(result, Err(ConfigError::MalformedZones { .. })));
}

#[test]
fn test_short_bbox_rejected() {
    let result = parse_zones(
        r#"{"zones": [{"name": "Short", "bbox": [-100.6, 25.5, -99.95]}]}"#,
        "inline",
    );
    assert!(matches!(result, Err(ConfigError::MalformedZones { .. })));
}
