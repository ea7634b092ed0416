// src/flatten/mod.rs
use crate::eodhd::models::RawReport;
use std::collections::{BTreeMap, BTreeSet};

/// One wide output row: the ticker plus `<field>_<year>` numeric columns.
///
/// The column set varies row to row with what each company reported; the
/// output table's schema is the union of the column sets it has seen.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRow {
    pub ticker: String,
    pub fields: BTreeMap<String, f64>,
}

impl FlatRow {
    pub fn new(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            fields: BTreeMap::new(),
        }
    }
}

/// Flattens a nested per-section, per-date report into a single row,
/// keeping only the `years_to_include` most recent reporting years.
///
/// Reporting dates whose leading four characters do not parse as a year are
/// skipped silently, and individual values that cannot be coerced to a float
/// are dropped without failing the row. A report with no usable dates still
/// yields a valid (ticker-only) row.
pub fn flatten(ticker: &str, report: &RawReport, years_to_include: usize) -> FlatRow {
    let mut row = FlatRow::new(ticker);
    let mut year_data: Vec<(i32, &BTreeMap<String, serde_json::Value>)> = Vec::new();

    for yearly in report.0.values() {
        for (date_str, metrics) in yearly {
            if let Some(year) = parse_report_year(date_str) {
                year_data.push((year, metrics));
            }
        }
    }

    let mut unique_years: BTreeSet<i32> = year_data.iter().map(|(y, _)| *y).collect();
    while unique_years.len() > years_to_include {
        // BTreeSet iterates ascending, so the first element is the oldest.
        let oldest = *unique_years.iter().next().unwrap_or(&0);
        unique_years.remove(&oldest);
    }

    for (year, metrics) in year_data {
        if !unique_years.contains(&year) {
            continue;
        }
        for (field, value) in metrics {
            if let Some(number) = coerce_to_f64(value) {
                row.fields.insert(format!("{}_{}", field, year), number);
            }
        }
    }

    row
}

/// Leading four characters of the reporting date as a year, if they parse.
fn parse_report_year(date_str: &str) -> Option<i32> {
    date_str.get(..4)?.parse::<i32>().ok()
}

fn coerce_to_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
