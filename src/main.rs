// src/main.rs
use clap::Parser;
use fundamentals_ingest::engine::{IngestConfig, IngestionEngine};
use fundamentals_ingest::utils::{self, AppError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Command Line Interface for the resumable fundamentals ingestion pipeline
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// EODHD API token (falls back to the EODHD_API_TOKEN environment variable)
    #[arg(long)]
    api_token: Option<String>,

    /// Base URL of the data provider API
    #[arg(long, default_value = "https://eodhd.com/api")]
    base_url: String,

    /// Output table file
    #[arg(short, long, default_value = "financial_reports.csv")]
    output: PathBuf,

    /// Success checkpoint file (one ticker per line)
    #[arg(long, default_value = "progress_tracker.txt")]
    progress_file: PathBuf,

    /// Failure checkpoint file (one ticker per line)
    #[arg(long, default_value = "failed_tickers.txt")]
    failed_file: PathBuf,

    /// Number of most recent reporting years to keep per ticker
    #[arg(long, default_value = "6")]
    years: usize,

    /// Buffered rows per flush to the output table
    #[arg(long, default_value = "50")]
    flush_every: usize,

    /// Minimum delay between fundamentals requests, in milliseconds
    #[arg(long, default_value = "1000")]
    rate_limit_ms: u64,

    /// Per-request timeout, in seconds
    #[arg(long, default_value = "30")]
    fetch_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Setup Logging (reads RUST_LOG env var)
    utils::logging::setup_logging();

    // 2. Parse CLI Arguments
    let args = Args::parse();
    tracing::info!(
        "Starting fundamentals ingestion: provider {}, output {}",
        args.base_url,
        args.output.display()
    );

    let api_token = args
        .api_token
        .clone()
        .or_else(|| std::env::var("EODHD_API_TOKEN").ok())
        .ok_or_else(|| {
            AppError::Config(
                "No API token: pass --api-token or set EODHD_API_TOKEN".to_string(),
            )
        })?;

    // 3. Assemble the engine configuration; no ambient global state
    let config = IngestConfig {
        base_url: args.base_url,
        api_token,
        summary_path: args.output.with_extension("run.json"),
        output_path: args.output,
        progress_path: args.progress_file,
        failed_path: args.failed_file,
        years_to_include: args.years,
        flush_every: args.flush_every,
        rate_limit: Duration::from_millis(args.rate_limit_ms),
        fetch_timeout: Duration::from_secs(args.fetch_timeout_secs),
    };

    // 4. Ctrl-C drains instead of aborting, so buffered rows and
    //    checkpoints are never lost to an interrupt
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received - draining after the current ticker");
                shutdown.store(true, Ordering::SeqCst);
            }
        });
    }

    // 5. Run the pipeline
    let engine = IngestionEngine::new(config, shutdown)?;
    let summary = engine.run().await?;

    tracing::info!(
        "Ingestion complete. {} rows written, {} tickers failed, {} empty",
        summary.flushed_rows,
        summary.failed,
        summary.empty
    );

    Ok(())
}
