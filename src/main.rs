//! memwatch - in-process memory profiler for the trading bot deployment
//!
//! Samples process memory on a fixed interval, watches configured ceilings,
//! applies a sustained-growth leak heuristic, and writes a JSON report.
//!
//! Usage:
//!   memwatch [duration_ms] [interval_ms] [output_file]
//!
//! All arguments are optional; defaults are 300000 ms, 1000 ms, and
//! memory-profile-report.json. A TOML config file (MEMWATCH_CONFIG_PATH,
//! default ./memwatch.toml) supplies anything the command line does not.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memwatch::config::ProfilerConfig;
use memwatch::profiler::allocator::TrackingAllocator;
use memwatch::profiler::MemoryProfiler;

#[global_allocator]
static ALLOCATOR: TrackingAllocator = TrackingAllocator::new();

#[derive(Parser, Debug)]
#[command(name = "memwatch")]
#[command(about = "Sampling memory profiler with heuristic leak detection")]
struct Args {
    /// Total profiling duration in milliseconds
    duration_ms: Option<u64>,

    /// Sampling interval in milliseconds
    interval_ms: Option<u64>,

    /// Report output path
    output_file: Option<PathBuf>,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memwatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let args = Args::parse();

    let mut config = ProfilerConfig::from_env();
    if let Some(duration_ms) = args.duration_ms {
        config.duration_ms = duration_ms;
    }
    if let Some(interval_ms) = args.interval_ms {
        config.interval_ms = interval_ms;
    }
    if let Some(output_file) = args.output_file {
        config.output_file = output_file;
    }

    info!(
        duration_ms = config.duration_ms,
        interval_ms = config.interval_ms,
        output = %config.output_file.display(),
        "starting memory profiler"
    );

    let profiler = MemoryProfiler::new(config);
    profiler.start()?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, stopping profiler");
        }
        _ = profiler.finished() => {}
    }

    let report = profiler.stop().await?;
    println!("{}", report.text_summary());

    Ok(())
}
