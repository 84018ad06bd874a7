//! Core data models used throughout the pair builder.
//!
//! A [`Row`] is read from the input table, converted into a [`Record`], and,
//! when both versions of the changed file yield an enclosing function, turned
//! into a [`Sample`] that is written to a batch file.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::table::ResolvedColumns;

/// One raw table row: column name → value, in table column order.
pub type Row = Map<String, Value>;

/// A recorded single-line change, with every column of its row kept for
/// passthrough.
#[derive(Debug, Clone)]
pub struct Record {
    pub repository: String,
    /// 1-based line number of the changed line.
    pub line_number: usize,
    pub content_id_before: String,
    pub content_id_after: String,
    pub line_before: String,
    pub line_after: String,
    pub fields: Row,
}

impl Record {
    /// Convert a table row using the resolved column names.
    ///
    /// Fails when the repository or either content id is missing or empty,
    /// or when the line number is not a positive integer.
    pub fn from_row(row: &Row, columns: &ResolvedColumns) -> Result<Self> {
        let repository = required_text(row, &columns.repository)?;
        let content_id_before = required_text(row, &columns.before_id)?;
        let content_id_after = required_text(row, &columns.after_id)?;
        let line_number = line_number(row, &columns.line)?;

        Ok(Self {
            repository,
            line_number,
            content_id_before,
            content_id_after,
            line_before: optional_text(row, &columns.line_before),
            line_after: optional_text(row, &columns.line_after),
            fields: row.clone(),
        })
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            repository: self.repository.clone(),
            content_id_before: self.content_id_before.clone(),
            content_id_after: self.content_id_after.clone(),
            line_number: self.line_number,
        }
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn required_text(row: &Row, column: &str) -> Result<String> {
    let text = row
        .get(column)
        .and_then(text_of)
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    if text.is_empty() {
        bail!("column '{}' is missing or empty", column);
    }
    Ok(text)
}

fn optional_text(row: &Row, column: &str) -> String {
    row.get(column).and_then(text_of).unwrap_or_default()
}

fn line_number(row: &Row, column: &str) -> Result<usize> {
    let value = row
        .get(column)
        .with_context(|| format!("column '{}' is missing", column))?;
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n >= 1 => Ok(n as usize),
        _ => bail!(
            "column '{}' must be a positive integer, got {}",
            column,
            value
        ),
    }
}

/// Identity of one fetch/locate/assemble unit of work within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub repository: String,
    pub content_id_before: String,
    pub content_id_after: String,
    pub line_number: usize,
}

/// Inclusive, 1-based line range of one function definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSpan {
    pub start_line: usize,
    pub end_line: usize,
}

impl FunctionSpan {
    pub fn contains(&self, line: usize) -> bool {
        self.start_line <= line && line <= self.end_line
    }
}

/// One output training pair.
///
/// Serialized as a flat JSON object: the four named keys first, then every
/// passthrough column in table order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub input: String,
    pub output: String,
    pub line_before: String,
    pub line_after: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
