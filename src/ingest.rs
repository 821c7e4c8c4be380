//! Execution history ingestion
//!
//! Loads [`ExecutionRecord`]s from a CSV export, a JSON file, or a directory
//! of JSON run reports. Rows that fail to parse or violate the record
//! invariants are skipped with a warning and counted; structural problems
//! (missing file, missing CSV column, malformed JSON document) are errors.

use crate::record::{parse_timestamp, ExecutionRecord};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Input source layout
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    /// Decide from the path (see [`detect_format`])
    #[default]
    Auto,
    Csv,
    Json,
    /// Directory of `*.json` run reports
    Directory,
}

/// Records loaded from a source, plus the number of entries rejected
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub records: Vec<ExecutionRecord>,
    pub skipped: usize,
}

impl IngestReport {
    fn merge(&mut self, other: IngestReport) {
        self.records.extend(other.records);
        self.skipped += other.skipped;
    }
}

const REQUIRED_COLUMNS: [&str; 7] = [
    "test_id",
    "execution_id",
    "timestamp",
    "build_number",
    "pass_count",
    "fail_count",
    "total_runs",
];

/// Resolve `Auto` to a concrete format
///
/// Directories are directories; `.csv` and `.json` extensions are trusted;
/// anything else is sniffed: a first non-blank `{` or `[` means JSON,
/// otherwise CSV.
pub fn detect_format(path: &Path) -> InputFormat {
    if path.is_dir() {
        return InputFormat::Directory;
    }

    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => return InputFormat::Csv,
        Some(ext) if ext.eq_ignore_ascii_case("json") => return InputFormat::Json,
        _ => {}
    }

    let looks_like_json = fs::read_to_string(path)
        .ok()
        .and_then(|content| content.trim_start().chars().next())
        .is_some_and(|c| c == '{' || c == '[');

    if looks_like_json {
        InputFormat::Json
    } else {
        InputFormat::Csv
    }
}

/// Load every valid record from `path`
pub fn load_records(path: &Path, format: InputFormat) -> Result<IngestReport> {
    if !path.exists() {
        anyhow::bail!("Input not found: {}", path.display());
    }

    let format = match format {
        InputFormat::Auto => detect_format(path),
        explicit => explicit,
    };
    tracing::info!("Loading {:?} input from {}", format, path.display());

    let report = match format {
        InputFormat::Directory => load_directory(path)?,
        InputFormat::Json => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            parse_json_records(&content)
                .with_context(|| format!("Failed to parse JSON in {}", path.display()))?
        }
        InputFormat::Csv | InputFormat::Auto => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            parse_csv_records(&content)
                .with_context(|| format!("Failed to parse CSV in {}", path.display()))?
        }
    };

    tracing::info!(
        "Loaded {} execution records ({} skipped)",
        report.records.len(),
        report.skipped
    );
    Ok(report)
}

/// Parse a CSV export with a header row naming the columns
pub fn parse_csv_records(content: &str) -> Result<IngestReport> {
    let mut rows = split_csv(content).into_iter();
    let Some(header) = rows.next() else {
        return Ok(IngestReport::default());
    };

    let header: Vec<String> = header.iter().map(|h| h.trim().to_string()).collect();
    let mut positions = [0usize; REQUIRED_COLUMNS.len()];
    for (slot, column) in positions.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = header
            .iter()
            .position(|h| h == column)
            .with_context(|| format!("Missing required column '{}'", column))?;
    }

    let mut report = IngestReport::default();
    for (line, row) in rows.enumerate() {
        if row.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        match record_from_row(&row, &positions) {
            Ok(record) => report.records.push(record),
            Err(reason) => {
                // +2: one for the header, one for 1-based numbering
                tracing::warn!("Skipping CSV row {}: {}", line + 2, reason);
                report.skipped += 1;
            }
        }
    }

    Ok(report)
}

fn record_from_row(row: &[String], positions: &[usize; 7]) -> Result<ExecutionRecord, String> {
    let field = |i: usize| -> Result<&str, String> {
        row.get(positions[i])
            .map(|s| s.trim())
            .ok_or_else(|| format!("missing value for '{}'", REQUIRED_COLUMNS[i]))
    };
    let number = |i: usize| -> Result<u64, String> {
        let raw = field(i)?;
        raw.parse()
            .map_err(|_| format!("invalid {} '{}'", REQUIRED_COLUMNS[i], raw))
    };

    let raw_timestamp = field(2)?;
    let timestamp = parse_timestamp(raw_timestamp)
        .ok_or_else(|| format!("invalid timestamp '{}'", raw_timestamp))?;
    let raw_build = field(3)?;
    let build_number = raw_build
        .parse()
        .map_err(|_| format!("invalid build_number '{}'", raw_build))?;

    let record = ExecutionRecord {
        test_id: field(0)?.to_string(),
        execution_id: field(1)?.to_string(),
        timestamp,
        build_number,
        pass_count: number(4)?,
        fail_count: number(5)?,
        total_runs: number(6)?,
    };
    record.validate().map_err(|e| e.to_string())?;
    Ok(record)
}

/// Split CSV text into rows of fields (RFC 4180 quoting)
///
/// Quoted fields may contain commas, doubled quotes and line breaks.
/// Both `\n` and `\r\n` end a row.
fn split_csv(content: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows
}

/// Parse a JSON document holding one record or an array of records
pub fn parse_json_records(content: &str) -> Result<IngestReport> {
    let document: Value = serde_json::from_str(content).context("Malformed JSON")?;
    Ok(records_from_items(json_items(document), "JSON item"))
}

/// Pull the record list out of a run report
///
/// Accepts `{"test_runs": [...]}`, `{"results": [...]}`, a bare array, or a
/// single record object.
fn json_items(document: Value) -> Vec<Value> {
    match document {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            for key in ["test_runs", "results"] {
                if let Some(Value::Array(items)) = map.remove(key) {
                    return items;
                }
            }
            vec![Value::Object(map)]
        }
        other => vec![other],
    }
}

fn records_from_items(items: Vec<Value>, what: &str) -> IngestReport {
    let mut report = IngestReport::default();
    for (idx, item) in items.into_iter().enumerate() {
        let parsed = serde_json::from_value::<ExecutionRecord>(item)
            .map_err(|e| e.to_string())
            .and_then(|record| record.validate().map(|_| record).map_err(|e| e.to_string()));
        match parsed {
            Ok(record) => report.records.push(record),
            Err(reason) => {
                tracing::warn!("Skipping {} {}: {}", what, idx, reason);
                report.skipped += 1;
            }
        }
    }
    report
}

/// Load every `*.json` report in a directory, in file-name order
fn load_directory(dir: &Path) -> Result<IngestReport> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        })
        .collect();
    files.sort();

    if files.is_empty() {
        tracing::warn!("No JSON files found in {}", dir.display());
        return Ok(IngestReport::default());
    }
    tracing::info!("Found {} JSON files to process", files.len());

    let mut report = IngestReport::default();
    for file in &files {
        let document = fs::read_to_string(file)
            .map_err(anyhow::Error::from)
            .and_then(|content| serde_json::from_str::<Value>(&content).map_err(Into::into));

        match document {
            Ok(document) => {
                let name = file.display().to_string();
                let loaded = records_from_items(json_items(document), &format!("item in {name}"));
                tracing::debug!("Loaded {} records from {}", loaded.records.len(), name);
                report.merge(loaded);
            }
            Err(e) => tracing::warn!("Error reading {}: {}", file.display(), e),
        }
    }

    Ok(report)
}
