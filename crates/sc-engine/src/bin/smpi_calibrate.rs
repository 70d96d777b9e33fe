use anyhow::{bail, Context};
use clap::Parser;
use sc_engine::{run_calibration, CalibrationConfig};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Calibrate SMPI platform parameters against measured benchmark data.
#[derive(Debug, Parser)]
#[command(name = "smpi-calibrate", version)]
struct Args {
    /// Run configuration (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Search algorithm: grid, random, gradient-descent, bayesian-optimization
    #[arg(short, long)]
    algorithm: Option<String>,

    /// Wall-clock budget in seconds
    #[arg(short, long)]
    time_limit: Option<u64>,

    /// Number of parallel evaluations
    #[arg(short, long)]
    workers: Option<usize>,

    /// Result artifact path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Seed for the search strategy
    #[arg(long)]
    seed: Option<u64>,

    /// Keep per-evaluation work directories
    #[arg(long)]
    keep_work_dirs: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = CalibrationConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    if let Some(algorithm) = args.algorithm {
        config.algorithm = algorithm;
    }
    if let Some(secs) = args.time_limit {
        config.time_limit_secs = secs;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(output) = args.output {
        config.output = output;
    }
    if args.seed.is_some() {
        config.strategy.seed = args.seed;
    }
    if args.keep_work_dirs {
        config.simulator.keep_work_dirs = true;
    }

    let report = run_calibration(&config)
        .map_err(|e| {
            error!("{} ({})", e, e.kind());
            e
        })
        .context("calibration aborted")?;

    println!("{}", serde_json::to_string_pretty(&report.calibration)?);
    if let Some(failure) = &report.error {
        bail!(
            "calibration failed after {} evaluations: {}: {}",
            report.evaluations,
            failure.kind,
            failure.message
        );
    }
    info!(
        "Calibration {:?}: loss {:?} after {} evaluations in {:.1}s",
        report.state, report.loss, report.evaluations, report.elapsed_seconds
    );
    Ok(())
}
