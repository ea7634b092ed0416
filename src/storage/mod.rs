// src/storage/mod.rs
use crate::flatten::FlatRow;
use crate::utils::error::StorageError;
use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Incremental writer for the output table.
///
/// The very first flush establishes the header as the union of the batch's
/// columns (`Ticker` first, remaining columns sorted). Every later flush is
/// reconciled against that header: existing columns missing from a row are
/// back-filled empty, and the row's cells are emitted in header order. The
/// header itself is never rewritten, so columns first discovered after the
/// initial flush are dropped (with a warning naming them).
pub struct CsvAppender {
    path: PathBuf,
    table_exists: bool,
}

impl CsvAppender {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let table_exists = path.exists();
        Self { path, table_exists }
    }

    /// True if no table existed when the appender was created and nothing
    /// has been flushed yet.
    pub fn is_initial_run(&self) -> bool {
        !self.table_exists
    }

    /// Durably appends a batch of rows, reconciling columns per the header.
    ///
    /// The whole batch is serialized to memory first and written with a
    /// single append, so a failed flush cannot leave a torn row behind.
    pub fn flush(&mut self, rows: &[FlatRow]) -> Result<(), StorageError> {
        if rows.is_empty() {
            return Ok(());
        }

        if self.table_exists {
            self.append_batch(rows)
        } else {
            self.write_initial_batch(rows)?;
            self.table_exists = true;
            Ok(())
        }
    }

    fn write_initial_batch(&self, rows: &[FlatRow]) -> Result<(), StorageError> {
        let mut columns: BTreeSet<&str> = BTreeSet::new();
        for row in rows {
            columns.extend(row.fields.keys().map(String::as_str));
        }

        let mut header: Vec<&str> = vec!["Ticker"];
        header.extend(&columns);

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&header)?;
        for row in rows {
            writer.write_record(render_row(row, &header))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        std::fs::write(&self.path, bytes)?;
        tracing::info!(
            "Created output table {} with {} columns, {} rows",
            self.path.display(),
            header.len(),
            rows.len()
        );
        Ok(())
    }

    fn append_batch(&self, rows: &[FlatRow]) -> Result<(), StorageError> {
        let header = self.read_header()?;
        warn_on_dropped_columns(rows, &header);

        let header_refs: Vec<&str> = header.iter().map(String::as_str).collect();
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        for row in rows {
            writer.write_record(render_row(row, &header_refs))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(&bytes)?;
        file.flush()?;

        tracing::info!("Appended {} rows to {}", rows.len(), self.path.display());
        Ok(())
    }

    fn read_header(&self) -> Result<Vec<String>, StorageError> {
        let mut reader = csv::Reader::from_path(&self.path)?;
        Ok(reader.headers()?.iter().map(str::to_string).collect())
    }
}

/// Cells for one row in header order; columns the row lacks come out empty.
fn render_row(row: &FlatRow, header: &[&str]) -> Vec<String> {
    header
        .iter()
        .map(|&col| {
            if col == "Ticker" {
                row.ticker.clone()
            } else {
                row.fields.get(col).map(|v| v.to_string()).unwrap_or_default()
            }
        })
        .collect()
}

fn warn_on_dropped_columns(rows: &[FlatRow], header: &[String]) {
    let header_set: BTreeSet<&str> = header.iter().map(String::as_str).collect();
    let dropped: BTreeSet<&str> = rows
        .iter()
        .flat_map(|row| row.fields.keys().map(String::as_str))
        .filter(|col| !header_set.contains(col))
        .collect();

    if !dropped.is_empty() {
        tracing::warn!(
            "Dropping {} columns absent from the existing header: {:?}",
            dropped.len(),
            dropped
        );
    }
}

/// Writes the end-of-run summary as pretty JSON next to the output table.
pub fn write_run_summary<P: AsRef<Path>, T: serde::Serialize>(
    path: P,
    summary: &T,
) -> Result<PathBuf, StorageError> {
    let path = path.as_ref().to_path_buf();
    let summary_str = serde_json::to_string_pretty(summary)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    std::fs::write(&path, summary_str)?;
    tracing::info!("Saved run summary to {}", path.display());
    Ok(path)
}
