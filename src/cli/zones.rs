//! Zones command implementation

use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;

use super::{CliError, OutputFormat};
use crate::ingest::orchestrator::DEFAULT_ZONES_PATH;
use crate::storage::PartitionPath;
use crate::zones::load_zones;
use crate::Zone;

/// Zones command arguments
#[derive(Parser, Debug)]
pub struct ZonesArgs {
    /// Zones document
    #[arg(long, default_value = DEFAULT_ZONES_PATH)]
    pub zones: PathBuf,
}

impl ZonesArgs {
    /// Validate the zones document and list its zones
    pub async fn execute(&self, output_format: OutputFormat) -> Result<Vec<Zone>, CliError> {
        let zones = load_zones(&self.zones)?;

        match output_format {
            OutputFormat::Json => match serde_json::to_string(&zones) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("Failed to serialize zones: {e}"),
            },
            OutputFormat::Human => {
                let today = Utc::now().date_naive();
                println!("{} zones in {}:", zones.len(), self.zones.display());
                for zone in &zones {
                    let partition = PartitionPath::new(&zone.name, today);
                    println!(
                        "  {} bbox={} partition=zone={}",
                        zone.name,
                        zone.bbox,
                        partition.zone()
                    );
                }
            }
        }

        Ok(zones)
    }
}
