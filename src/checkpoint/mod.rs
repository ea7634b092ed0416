// src/checkpoint/mod.rs
use crate::utils::error::StorageError;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Durable record of tickers that have reached a terminal outcome.
///
/// Two append-only line files back the store: one for successes, one for
/// permanent failures. Both are read fully at startup into the known set,
/// and every record call appends and flushes before returning, so a crash
/// can never lose a checkpoint that a caller already observed as written.
/// Records are never updated or deleted.
pub struct CheckpointStore {
    known: HashSet<String>,
    progress_file: File,
    failed_file: File,
    succeeded_at_open: usize,
    failed_at_open: usize,
}

impl CheckpointStore {
    /// Opens (creating if absent) both checkpoint files and loads the full
    /// set of known tickers for fast filtering.
    pub fn open<P: AsRef<Path>>(progress_path: P, failed_path: P) -> Result<Self, StorageError> {
        let mut known = HashSet::new();
        let succeeded_at_open = read_tickers(progress_path.as_ref(), &mut known)?;
        let failed_at_open = read_tickers(failed_path.as_ref(), &mut known)?;

        let progress_file = open_append(progress_path.as_ref())?;
        let failed_file = open_append(failed_path.as_ref())?;

        tracing::info!(
            "Loaded checkpoints: {} previously processed, {} previously failed",
            succeeded_at_open,
            failed_at_open
        );

        Ok(Self {
            known,
            progress_file,
            failed_file,
            succeeded_at_open,
            failed_at_open,
        })
    }

    /// True if the ticker already has a terminal outcome of either kind.
    pub fn is_known(&self, ticker: &str) -> bool {
        self.known.contains(ticker)
    }

    /// Records a ticker as successfully processed. Durable on return.
    pub fn record_success(&mut self, ticker: &str) -> Result<(), StorageError> {
        append_line(&mut self.progress_file, ticker)?;
        self.known.insert(ticker.to_string());
        Ok(())
    }

    /// Records a ticker as permanently failed. Durable on return.
    pub fn record_failure(&mut self, ticker: &str) -> Result<(), StorageError> {
        append_line(&mut self.failed_file, ticker)?;
        self.known.insert(ticker.to_string());
        Ok(())
    }

    /// Counts loaded from disk when the store was opened.
    pub fn loaded_counts(&self) -> (usize, usize) {
        (self.succeeded_at_open, self.failed_at_open)
    }
}

fn read_tickers(path: &Path, into: &mut HashSet<String>) -> Result<usize, StorageError> {
    if !path.exists() {
        return Ok(0);
    }

    let mut count = 0;
    let reader = BufReader::new(File::open(path)?);
    for line in reader.lines() {
        let line = line?;
        let ticker = line.trim();
        if !ticker.is_empty() {
            into.insert(ticker.to_string());
            count += 1;
        }
    }
    Ok(count)
}

fn open_append(path: &Path) -> Result<File, StorageError> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

fn append_line(file: &mut File, ticker: &str) -> Result<(), StorageError> {
    writeln!(file, "{}", ticker)?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn records_survive_reopen() {
        let dir = tempdir().unwrap();
        let progress = dir.path().join("progress_tracker.txt");
        let failed = dir.path().join("failed_tickers.txt");

        {
            let mut store = CheckpointStore::open(&progress, &failed).unwrap();
            store.record_success("AAPL.US").unwrap();
            store.record_failure("BROKEN.XFRA").unwrap();
            assert!(store.is_known("AAPL.US"));
            assert!(store.is_known("BROKEN.XFRA"));
        }

        let store = CheckpointStore::open(&progress, &failed).unwrap();
        assert!(store.is_known("AAPL.US"));
        assert!(store.is_known("BROKEN.XFRA"));
        assert!(!store.is_known("MSFT.US"));
        assert_eq!(store.loaded_counts(), (1, 1));
    }

    #[test]
    fn opens_cleanly_with_no_prior_files() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::open(
            &dir.path().join("progress_tracker.txt"),
            &dir.path().join("failed_tickers.txt"),
        )
        .unwrap();
        assert!(!store.is_known("AAPL.US"));
        assert_eq!(store.loaded_counts(), (0, 0));
    }

    #[test]
    fn blank_lines_are_ignored_on_load() {
        let dir = tempdir().unwrap();
        let progress = dir.path().join("progress_tracker.txt");
        let failed = dir.path().join("failed_tickers.txt");
        std::fs::write(&progress, "AAPL.US\n\n  \nMSFT.US\n").unwrap();

        let store = CheckpointStore::open(&progress, &failed).unwrap();
        assert!(store.is_known("AAPL.US"));
        assert!(store.is_known("MSFT.US"));
        assert_eq!(store.loaded_counts(), (2, 0));
    }
}
