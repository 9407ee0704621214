//! Strata Ingest - telemetry fragment ingestion service
//!
//! Runs the repair-merge-promote pipeline against a local data
//! directory, once or on an interval, mirroring promoted artifacts
//! into a staging root an external transfer agent drains. Also offers
//! an inspect mode that summarises a persisted ledger per record type.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use strata_common::config::IngestConfig;
use strata_ingest::services::projector::{Projector, RecordKind};
use strata_ingest::{IngestPipeline, MirrorUploader};

/// Command-line arguments for strata-ingest
#[derive(Parser, Debug)]
#[command(name = "strata-ingest")]
#[command(about = "Telemetry fragment ingestion pipeline")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "STRATA_CONFIG")]
    config: Option<PathBuf>,

    /// Directory the collection agent drops fragments into
    #[arg(short, long, env = "STRATA_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Staging root promoted artifacts are mirrored into
    #[arg(short, long, env = "STRATA_MIRROR_ROOT", default_value = "./mirror")]
    mirror_root: PathBuf,

    /// Run a single batch pass and exit
    #[arg(long)]
    once: bool,

    /// Seconds between batch passes (overrides config)
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Summarise a persisted ledger per record type and exit
    #[arg(long, value_name = "LEDGER_CSV")]
    inspect: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strata_ingest=info,strata_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if let Some(ledger) = args.inspect {
        return inspect_ledger(&ledger);
    }

    let mut config = IngestConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(secs) = args.interval_secs {
        config.interval_secs = secs;
    }

    info!("Starting Strata ingest pipeline");
    info!("Data directory: {}", config.data_dir.display());
    info!("Mirror root: {}", args.mirror_root.display());
    info!("Active clients: {}", config.active_clients().count());

    let interval_secs = config.interval_secs.max(1);
    let uploader = Arc::new(MirrorUploader::new(args.mirror_root));
    let pipeline = IngestPipeline::new(config, uploader);

    if args.once {
        pipeline.run_batch().await;
        return Ok(());
    }

    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                pipeline.run_batch().await;
            }
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}

/// Print a per-record-type summary of a persisted ledger.
fn inspect_ledger(path: &PathBuf) -> Result<()> {
    let mut projector = Projector::open(path)
        .with_context(|| format!("Failed to open ledger {}", path.display()))?;

    println!(
        "{} - {} record(s)",
        path.display(),
        projector.record_count()
    );
    for kind in RecordKind::ALL {
        let projection = projector.projection_for(kind);
        if projection.records.is_empty() {
            continue;
        }
        println!(
            "  {:?} ({}): {} record(s), columns: {}",
            kind,
            kind.code(),
            projection.records.len(),
            projection.columns.join(", ")
        );
    }
    Ok(())
}
