//! Input table loading.
//!
//! Reads the recorded changes from a CSV file (header row required) or a
//! JSONL file into ordered [`Row`]s, and resolves which columns hold the
//! fields the pipeline reads. Column names in the config may be glob
//! patterns (`file_before_*sha`); the first header column matching the
//! pattern wins.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobMatcher};
use serde_json::Value;
use std::io::BufRead;
use std::path::Path;

use crate::config::{ColumnsConfig, InputConfig, TableFormat};
use crate::models::Row;

/// A loaded input table.
#[derive(Debug, Clone, Default)]
pub struct Table {
    /// Column names in table order.
    pub header: Vec<String>,
    pub rows: Vec<Row>,
}

/// Actual column names for each field the pipeline reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub repository: String,
    pub line: String,
    pub before_id: String,
    pub after_id: String,
    pub line_before: String,
    pub line_after: String,
}

pub fn load_table(input: &InputConfig) -> Result<Table> {
    let format = input.table_format()?;
    let table = match format {
        TableFormat::Csv => read_csv(&input.path)?,
        TableFormat::Jsonl => read_jsonl(&input.path)?,
    };
    Ok(table)
}

fn read_csv(path: &Path) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        // Short rows become record-level errors instead of failing the load.
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open input table: {}", path.display()))?;

    let header: Vec<String> = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        // Row 1 is the header.
        let record = record.with_context(|| format!("{}: row {}", path.display(), i + 2))?;
        let mut row = Row::new();
        for (name, cell) in header.iter().zip(record.iter()) {
            row.insert(name.clone(), Value::String(cell.to_string()));
        }
        rows.push(row);
    }

    Ok(Table { header, rows })
}

fn read_jsonl(path: &Path) -> Result<Table> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open input table: {}", path.display()))?;
    let reader = std::io::BufReader::new(file);

    let mut rows = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("{}: line {}", path.display(), i + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(&line)
            .with_context(|| format!("{}: line {} is not valid JSON", path.display(), i + 1))?;
        match value {
            Value::Object(row) => rows.push(row),
            _ => bail!("{}: line {} is not a JSON object", path.display(), i + 1),
        }
    }

    let header = rows
        .first()
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default();

    Ok(Table { header, rows })
}

/// Map each configured column (name or glob pattern) onto the header.
///
/// A required column that matches nothing is an error: no row of the table
/// could be processed without it.
pub fn resolve_columns(header: &[String], columns: &ColumnsConfig) -> Result<ResolvedColumns> {
    Ok(ResolvedColumns {
        repository: resolve_one(header, "repository", &columns.repository)?,
        line: resolve_one(header, "line", &columns.line)?,
        before_id: resolve_one(header, "before_id", &columns.before_id)?,
        after_id: resolve_one(header, "after_id", &columns.after_id)?,
        line_before: resolve_one(header, "line_before", &columns.line_before)?,
        line_after: resolve_one(header, "line_after", &columns.line_after)?,
    })
}

fn resolve_one(header: &[String], field: &str, pattern: &str) -> Result<String> {
    if header.iter().any(|h| h == pattern) {
        return Ok(pattern.to_string());
    }

    if is_glob(pattern) {
        let matcher = build_matcher(pattern)?;
        if let Some(found) = header.iter().find(|h| matcher.is_match(h.as_str())) {
            return Ok(found.clone());
        }
    }

    bail!(
        "input.columns.{}: no column matches '{}' (columns: {})",
        field,
        pattern,
        header.join(", ")
    )
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{'])
}

fn build_matcher(pattern: &str) -> Result<GlobMatcher> {
    Ok(Glob::new(pattern)
        .with_context(|| format!("Invalid column pattern: '{}'", pattern))?
        .compile_matcher())
}
