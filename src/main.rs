//! Passdeck - satellite overpass scene scheduling daemon
//!
//! Reads scene notifications (JSON lines) from stdin, deduplicates
//! overlapping passes, prepares orbital elements and runs the configured
//! external processing stages.
//!
//! # Usage
//!
//! ```bash
//! # Bridge the station message broker to stdin
//! broker-subscribe scenes | passdeck --config /etc/passdeck/passdeck.toml
//!
//! # Validate a configuration file without starting the daemon
//! passdeck --config passdeck.toml --check-config
//! ```
//!
//! # Environment Variables
//!
//! - `PASSDECK_CONFIG`: configuration file path (overridden by `--config`)
//! - `PASSDECK_TLE_USER` / `PASSDECK_TLE_PASSWD`: TLE download credentials
//! - `RUST_LOG`: logging level (default: info)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use passdeck::config::RunnerConfig;
use passdeck::scheduler::{SceneScheduler, StdinSource};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "passdeck")]
#[command(about = "Satellite overpass scene scheduling daemon")]
#[command(version)]
struct CliArgs {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "PASSDECK_CONFIG")]
    config: Option<PathBuf>,

    /// Load and validate the configuration, then exit
    #[arg(long)]
    check_config: bool,

    /// Log in JSON format (for log shippers)
    #[arg(long)]
    json_log: bool,
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.json_log);

    let config = RunnerConfig::load_or_default(args.config.as_deref())?;
    if args.check_config {
        println!("Configuration OK");
        return Ok(());
    }

    info!(
        "Passdeck starting for station {} ({} NOAA / {} Metop platforms, {} stages)",
        config.station,
        config.supported_noaa.len(),
        config.supported_metop.len(),
        config.stages.len()
    );

    // Graceful shutdown via Ctrl+C
    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_signal.cancel();
    });

    let scheduler = SceneScheduler::new(Arc::new(config));
    let mut source = StdinSource::new();
    let stats = scheduler.run(&mut source, shutdown).await;

    info!(
        "Passdeck shutdown complete ({} scenes processed)",
        stats.processed
    );
    Ok(())
}
