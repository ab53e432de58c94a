//! CLI command implementations

pub mod error;
pub mod extract;
pub mod zones;

pub use error::CliError;
pub use extract::ExtractArgs;
pub use zones::ZonesArgs;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::str::FromStr;

/// OpenAQ bronze extractor CLI
#[derive(Parser, Debug)]
#[command(name = "openaq-bronze")]
#[command(
    about = "Extract OpenAQ air-quality data into a partitioned bronze layer",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Maximum number of retries for failed requests (default: 5, range: 1-20)
    #[arg(long, global = true, default_value = "5", value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_retries: u32,

    /// Serve Prometheus metrics on this address (e.g. 0.0.0.0:9090)
    #[arg(long, global = true, env = "METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract locations, sensors and raw measurements for the configured zones
    Extract(ExtractArgs),

    /// List the zones defined in a zones file
    Zones(ZonesArgs),
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}
