//! Extract command implementation

use chrono::{DateTime, Days, NaiveDate, Utc};
use clap::{Args, Parser};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use super::{Cli, CliError, OutputFormat};
use crate::ingest::config::{
    ApiSettings, ObjectStoreSettings, RetryPolicy, DEFAULT_API_BASE, DEFAULT_OBJECT_PREFIX,
    DEFAULT_PAGE_LIMIT, DEFAULT_REGION,
};
use crate::ingest::orchestrator::{DEFAULT_OUT_DIR, DEFAULT_ZONES_PATH};
use crate::ingest::{Orchestrator, RunRequest, RunSummary, TimeWindow, ZoneOutcome};
use crate::storage::StorageBackend;

/// Try to parse datetime from RFC3339 format
///
/// Handles both inputs with and without timezone designators:
/// - "2025-10-01T00:00:00Z" - explicit UTC
/// - "2025-10-01T00:00:00-06:00" - explicit offset
/// - "2025-10-01T00:00:00" - no timezone, assumed UTC
fn try_parse_datetime_rfc3339(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&format!("{input}Z")) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}

/// Parse the window start from YYYY-MM-DD or RFC3339 datetime format.
///
/// For date-only format, uses start-of-day (00:00:00 UTC).
pub fn parse_from_time(input: &str) -> Result<DateTime<Utc>, CliError> {
    if let Some(dt) = try_parse_datetime_rfc3339(input) {
        return Ok(dt);
    }

    let date = NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|e| CliError::InvalidArgument(format!("Invalid --from '{input}': {e}")))?;
    start_of_day(date)
        .ok_or_else(|| CliError::InvalidArgument(format!("Invalid --from '{input}'")))
}

/// Parse the window end from YYYY-MM-DD or RFC3339 datetime format.
///
/// The window is half-open, so a date-only end resolves to the start of the following
/// day and the given date is fully included.
pub fn parse_to_time(input: &str) -> Result<DateTime<Utc>, CliError> {
    if let Some(dt) = try_parse_datetime_rfc3339(input) {
        return Ok(dt);
    }

    let date = NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|e| CliError::InvalidArgument(format!("Invalid --to '{input}': {e}")))?;
    date.checked_add_days(Days::new(1))
        .and_then(start_of_day)
        .ok_or_else(|| CliError::InvalidArgument(format!("Invalid --to '{input}'")))
}

fn start_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc())
}

/// Object-store settings, each falling back to the standard AWS environment variable
#[derive(Args, Debug, Clone)]
pub struct ObjectStoreArgs {
    /// Bucket for object storage; selects object storage when --storage is not given
    #[arg(long, env = "AWS_S3_BUCKET_NAME")]
    pub bucket: Option<String>,

    /// Key prefix inside the bucket
    #[arg(long, env = "AWS_S3_PREFIX", default_value = DEFAULT_OBJECT_PREFIX)]
    pub prefix: String,

    /// Bucket region
    #[arg(long, env = "AWS_REGION", default_value = DEFAULT_REGION)]
    pub region: String,

    /// Custom endpoint for S3-compatible stores (enables path-style addressing)
    #[arg(long, env = "AWS_ENDPOINT_URL")]
    pub endpoint_url: Option<String>,

    /// Access key id
    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub access_key_id: Option<String>,

    /// Secret access key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub secret_access_key: Option<String>,
}

impl ObjectStoreArgs {
    /// Convert to object-store settings
    pub fn to_settings(&self) -> ObjectStoreSettings {
        ObjectStoreSettings {
            bucket: self.bucket.clone(),
            prefix: self.prefix.clone(),
            region: self.region.clone(),
            endpoint_url: self.endpoint_url.clone(),
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.clone(),
        }
    }
}

/// Extract command arguments
#[derive(Parser, Debug)]
pub struct ExtractArgs {
    /// Window start, inclusive (YYYY-MM-DD or RFC3339, e.g. 2025-10-01T00:00:00Z)
    #[arg(long = "from")]
    pub from: String,

    /// Window end, exclusive (YYYY-MM-DD or RFC3339)
    #[arg(long = "to")]
    pub to: String,

    /// Zones document
    #[arg(long, default_value = DEFAULT_ZONES_PATH)]
    pub zones: PathBuf,

    /// Only extract this zone
    #[arg(long)]
    pub zone: Option<String>,

    /// Output root for local storage
    #[arg(long, env = "OUT_DIR", default_value = DEFAULT_OUT_DIR)]
    pub out: PathBuf,

    /// Storage backend: local or s3 (default: s3 when a bucket is configured)
    #[arg(long)]
    pub storage: Option<StorageBackend>,

    /// OpenAQ API key
    #[arg(long, env = "OPENAQ_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// OpenAQ API base URL
    #[arg(long, env = "API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// Page size for paginated requests (max 1000)
    #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT, value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub page_limit: u32,

    /// Object-store settings
    #[command(flatten)]
    pub object_store: ObjectStoreArgs,
}

impl ExtractArgs {
    /// Parsed extraction window
    pub fn window(&self) -> Result<TimeWindow, CliError> {
        let from = parse_from_time(&self.from)?;
        let to = parse_to_time(&self.to)?;
        Ok(TimeWindow::new(from, to)?)
    }

    /// API settings for this invocation
    pub fn api_settings(&self, max_retries: u32) -> ApiSettings {
        ApiSettings::new(self.api_key.clone())
            .with_base_url(self.api_base.clone())
            .with_page_limit(self.page_limit)
            .with_retry_policy(RetryPolicy::default().with_max_retries(max_retries))
    }

    /// Run request for this invocation
    pub fn run_request(&self, window: TimeWindow) -> RunRequest {
        RunRequest::new(self.zones.clone(), self.out.clone(), window)
            .with_target_zone(self.zone.clone())
            .with_storage(self.storage)
    }

    /// Execute the extract command
    ///
    /// Returns the run summary; a run in which any zone failed is reported as
    /// [`CliError::ZonesFailed`] after the summary has been printed.
    pub async fn execute(&self, cli: &Cli) -> Result<RunSummary, CliError> {
        let window = self.window()?;
        info!(
            from = %window.from_param(),
            to = %window.to_param(),
            zones = %self.zones.display(),
            "Starting extract"
        );

        let orchestrator = Orchestrator::new(
            self.api_settings(cli.max_retries),
            self.object_store.to_settings(),
        );
        let summary = orchestrator.run(&self.run_request(window)).await?;

        match cli.output_format {
            OutputFormat::Json => output_json(&summary),
            OutputFormat::Human => output_human(&summary),
        }

        let failed = summary.failed_zones();
        if !failed.is_empty() {
            return Err(CliError::ZonesFailed {
                failed: failed.len(),
                total: summary.zones.len(),
                zones: failed.join(", "),
            });
        }

        Ok(summary)
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    success: bool,
    total_locations: u64,
    total_sensors: u64,
    total_skipped: u64,
    total_pages: u64,
    total_measurements: u64,
    #[serde(flatten)]
    summary: &'a RunSummary,
}

/// Output result as JSON
fn output_json(summary: &RunSummary) {
    let report = JsonReport {
        success: summary.is_success(),
        total_locations: summary.total_locations(),
        total_sensors: summary.total_sensors_succeeded(),
        total_skipped: summary.total_skipped(),
        total_pages: summary.total_pages_written(),
        total_measurements: summary.total_measurements(),
        summary,
    };

    match serde_json::to_string(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Failed to serialize summary: {e}"),
    }
}

/// Output result in human-readable format
fn output_human(summary: &RunSummary) {
    if summary.is_success() {
        println!("\nExtraction completed successfully!");
    } else {
        println!("\nExtraction finished with failed zones!");
    }
    println!("Ingest date: {}", summary.ingest_date);
    println!(
        "Window: {} to {}",
        summary.window.from_param(),
        summary.window.to_param()
    );
    println!("Storage: {}", summary.storage_location);

    for outcome in &summary.zones {
        match outcome {
            ZoneOutcome::Completed(zone) => {
                println!(
                    "  [OK] {}: {} locations, {}/{} sensors, {} pages, {} measurements",
                    zone.zone,
                    zone.locations_found,
                    zone.sensors_succeeded,
                    zone.sensors_found,
                    zone.pages_written,
                    zone.measurements
                );
                if zone.has_skips() {
                    println!(
                        "       skipped: {} locations, {} sensors",
                        zone.locations_failed, zone.sensors_failed
                    );
                }
            }
            ZoneOutcome::Failed { zone, error } => {
                println!("  [FAILED] {zone}: {error}");
            }
        }
    }

    println!("Pages written: {}", summary.total_pages_written());
    println!("Measurements: {}", summary.total_measurements());
}
