// src/engine/mod.rs
use crate::checkpoint::CheckpointStore;
use crate::eodhd::EodhdClient;
use crate::flatten::{flatten, FlatRow};
use crate::storage::{self, CsvAppender};
use crate::utils::error::{AppError, ProviderError};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Everything the engine needs, passed explicitly at construction.
/// There is no ambient global state.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub base_url: String,
    pub api_token: String,
    pub output_path: PathBuf,
    pub summary_path: PathBuf,
    pub progress_path: PathBuf,
    pub failed_path: PathBuf,
    pub years_to_include: usize,
    pub flush_every: usize,
    pub rate_limit: Duration,
    pub fetch_timeout: Duration,
}

/// Terminal classification of one ticker's fetch + flatten.
enum TickerOutcome {
    /// Fundamentals arrived and flattened into a row.
    Row(FlatRow),
    /// Provider answered but had nothing to report. Not a failure: the
    /// ticker gets no checkpoint and stays eligible for a future run.
    Empty,
    /// Transport fault, timeout, or malformed body. Terminal for this run.
    Fault(ProviderError),
}

/// End-of-run accounting, also persisted as JSON next to the output table.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub exchanges: usize,
    pub discovered: usize,
    pub skipped_known: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub empty: usize,
    pub flushed_rows: usize,
    pub interrupted: bool,
    pub finished_at: String,
}

/// Orchestrates discovery, checkpoint filtering, fetch, flatten, buffering
/// and periodic flushes.
///
/// Per-ticker faults are recorded and skipped, a failed symbol listing costs
/// only that exchange, and only a failed exchange listing aborts the run.
/// An interrupt (or the fatal error) drains: buffered rows are flushed and
/// the summary written before the engine returns.
pub struct IngestionEngine {
    config: IngestConfig,
    client: EodhdClient,
    checkpoints: CheckpointStore,
    appender: CsvAppender,
    buffer: Vec<FlatRow>,
    shutdown: Arc<AtomicBool>,
    summary: RunSummary,
}

impl IngestionEngine {
    pub fn new(config: IngestConfig, shutdown: Arc<AtomicBool>) -> Result<Self, AppError> {
        let client = EodhdClient::new(
            &config.base_url,
            &config.api_token,
            config.fetch_timeout,
            config.rate_limit,
        )?;
        let checkpoints = CheckpointStore::open(&config.progress_path, &config.failed_path)?;
        let appender = CsvAppender::new(&config.output_path);

        Ok(Self {
            config,
            client,
            checkpoints,
            appender,
            buffer: Vec::new(),
            shutdown,
            summary: RunSummary::default(),
        })
    }

    /// Runs the pipeline to completion (or interrupt, or fatal error),
    /// always draining buffered rows before returning.
    pub async fn run(mut self) -> Result<RunSummary, AppError> {
        let ingest_result = self.ingest().await;

        // Drain even after a fatal error: buffered rows are flushed and the
        // summary written, then the fatal error (if any) surfaces.
        let drain_result = self.drain();

        self.summary.interrupted = self.shutdown.load(Ordering::SeqCst);
        self.summary.finished_at = chrono::Utc::now().to_rfc3339();
        tracing::info!(
            "Run finished. Succeeded: {}, failed: {}, empty: {}, skipped (checkpointed): {}, interrupted: {}",
            self.summary.succeeded,
            self.summary.failed,
            self.summary.empty,
            self.summary.skipped_known,
            self.summary.interrupted
        );

        if let Err(e) = storage::write_run_summary(&self.config.summary_path, &self.summary) {
            tracing::warn!("Failed to write run summary: {}", e);
        }

        ingest_result?;
        drain_result?;
        Ok(self.summary)
    }

    async fn ingest(&mut self) -> Result<(), AppError> {
        tracing::info!("Fetching list of exchanges...");
        // No exchanges means no work is possible; this error is fatal.
        let exchanges = self.client.list_exchanges().await?;
        tracing::info!("Found {} exchanges", exchanges.len());
        self.summary.exchanges = exchanges.len();

        let (prior_ok, prior_failed) = self.checkpoints.loaded_counts();
        if prior_ok + prior_failed > 0 {
            tracing::info!(
                "Resuming from previous run: {} processed, {} failed",
                prior_ok,
                prior_failed
            );
        }

        'exchanges: for exchange in exchanges {
            if self.drain_requested() {
                break;
            }

            let tickers = self.client.list_symbols(&exchange).await;
            let found = tickers.len();
            self.summary.discovered += found;

            let pending: Vec<String> = tickers
                .into_iter()
                .filter(|t| !self.checkpoints.is_known(t))
                .collect();
            self.summary.skipped_known += found - pending.len();
            tracing::info!(
                "{}: {} common stock tickers, {} new to process",
                exchange,
                found,
                pending.len()
            );

            for ticker in pending {
                if self.drain_requested() {
                    break 'exchanges;
                }
                self.process_one(&ticker).await?;
            }
        }

        Ok(())
    }

    /// Fetches, flattens, checkpoints and buffers a single ticker.
    /// Faults are terminal for the ticker, never for the run; only a
    /// checkpoint or flush write failure propagates, since losing those
    /// breaks resumability.
    async fn process_one(&mut self, ticker: &str) -> Result<(), AppError> {
        match self.fetch_outcome(ticker).await {
            TickerOutcome::Row(row) => {
                self.buffer.push(row);
                // Checkpoint before the data flush: quota is already spent,
                // so the ticker must never be re-fetched.
                self.checkpoints.record_success(ticker)?;
                self.summary.succeeded += 1;

                if self.buffer.len() >= self.config.flush_every.max(1) {
                    self.flush_buffer()?;
                }
            }
            TickerOutcome::Empty => {
                tracing::debug!("No fundamentals reported for {}", ticker);
                self.summary.empty += 1;
            }
            TickerOutcome::Fault(e) => {
                tracing::warn!("Error with {}: {}", ticker, e);
                self.checkpoints.record_failure(ticker)?;
                self.summary.failed += 1;
            }
        }
        Ok(())
    }

    async fn fetch_outcome(&self, ticker: &str) -> TickerOutcome {
        match self.client.fetch_fundamentals(ticker).await {
            Ok(report) if report.is_empty() => TickerOutcome::Empty,
            Ok(report) => {
                TickerOutcome::Row(flatten(ticker, &report, self.config.years_to_include))
            }
            Err(e) => TickerOutcome::Fault(e),
        }
    }

    fn flush_buffer(&mut self) -> Result<(), AppError> {
        self.appender.flush(&self.buffer)?;
        self.summary.flushed_rows += self.buffer.len();
        self.buffer.clear();
        Ok(())
    }

    fn drain(&mut self) -> Result<(), AppError> {
        if !self.buffer.is_empty() {
            tracing::info!("Draining {} buffered rows", self.buffer.len());
        }
        self.flush_buffer()
    }

    fn drain_requested(&self) -> bool {
        let requested = self.shutdown.load(Ordering::SeqCst);
        if requested {
            tracing::info!("Shutdown requested - no further fetches will start");
        }
        requested
    }
}
