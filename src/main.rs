//! Main entry point for the openaq-bronze CLI

use clap::Parser;
use openaq_bronze::cli::{Cli, CliError, Commands};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("openaq_bronze=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run(cli: &Cli) -> Result<(), CliError> {
    if let Some(addr) = cli.metrics_addr {
        openaq_bronze::metrics::init_metrics(addr)
            .await
            .map_err(|e| CliError::Metrics(e.to_string()))?;
    }

    match cli.command {
        Commands::Extract(ref args) => args.execute(cli).await.map(|_| ()),
        Commands::Zones(ref args) => args.execute(cli.output_format).await.map(|_| ()),
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    if let Err(e) = run(&cli).await.map_err(anyhow::Error::from) {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }
}
