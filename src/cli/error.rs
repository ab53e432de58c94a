//! CLI error types and conversions

use crate::ingest::{ConfigError, IngestError};

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration rejected before any request
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Run could not start
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Metrics exporter could not be started
    #[error("metrics error: {0}")]
    Metrics(String),

    /// One or more zones failed
    #[error("{failed} of {total} zones failed: {zones}")]
    ZonesFailed {
        /// Failed zone count
        failed: usize,
        /// Processed zone count
        total: usize,
        /// Failed zone names
        zones: String,
    },
}
