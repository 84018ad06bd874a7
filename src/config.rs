//! TOML configuration for the pair builder.
//!
//! ```toml
//! [input]
//! path = "data/sstubs.csv"
//!
//! [input.columns]
//! repository = "project_name"
//! before_id = "file_before_*sha"
//!
//! [output]
//! dir = "out"
//! batch_size = 100
//!
//! [remote]
//! delay_ms = 1000
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub input: InputConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub sample: SampleConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub path: PathBuf,
    /// `csv` or `jsonl`. Inferred from the file extension when absent.
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub columns: ColumnsConfig,
}

/// Column names (or glob patterns over the header) for each field the
/// pipeline reads. Every other column is passed through untouched.
#[derive(Debug, Deserialize, Clone)]
pub struct ColumnsConfig {
    #[serde(default = "default_repository_column")]
    pub repository: String,
    #[serde(default = "default_line_column")]
    pub line: String,
    #[serde(default = "default_before_id_column")]
    pub before_id: String,
    #[serde(default = "default_after_id_column")]
    pub after_id: String,
    #[serde(default = "default_line_before_column")]
    pub line_before: String,
    #[serde(default = "default_line_after_column")]
    pub line_after: String,
}

impl Default for ColumnsConfig {
    fn default() -> Self {
        Self {
            repository: default_repository_column(),
            line: default_line_column(),
            before_id: default_before_id_column(),
            after_id: default_after_id_column(),
            line_before: default_line_before_column(),
            line_after: default_line_after_column(),
        }
    }
}

fn default_repository_column() -> String {
    "project_name".to_string()
}
fn default_line_column() -> String {
    "line_changed".to_string()
}
fn default_before_id_column() -> String {
    "file_before_*sha".to_string()
}
fn default_after_id_column() -> String {
    "file_after_*sha".to_string()
}
fn default_line_before_column() -> String {
    "line_before".to_string()
}
fn default_line_after_column() -> String {
    "line_after".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub dir: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            token_env: default_token_env(),
            delay_ms: default_delay_ms(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.github.com".to_string()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_delay_ms() -> u64 {
    1000
}
fn default_user_agent() -> String {
    "fixpair".to_string()
}

impl RemoteConfig {
    /// The explicit `token`, falling back to the `token_env` variable.
    /// Empty values count as no credential.
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var(&self.token_env).ok())
            .filter(|t| !t.trim().is_empty())
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SampleConfig {
    #[serde(default = "default_instruction")]
    pub instruction: String,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            instruction: default_instruction(),
        }
    }
}

fn default_instruction() -> String {
    "Fix the bug in the following function:\n".to_string()
}

/// Input table encodings understood by [`crate::table::load_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Jsonl,
}

impl InputConfig {
    /// Resolve the table format from `format` or the file extension.
    pub fn table_format(&self) -> Result<TableFormat> {
        if let Some(ref format) = self.format {
            return parse_format(format);
        }
        let ext = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("csv") => Ok(TableFormat::Csv),
            Some("jsonl" | "ndjson") => Ok(TableFormat::Jsonl),
            _ => anyhow::bail!(
                "Cannot infer table format for {}; set input.format to csv or jsonl",
                self.path.display()
            ),
        }
    }
}

fn parse_format(format: &str) -> Result<TableFormat> {
    match format {
        "csv" => Ok(TableFormat::Csv),
        "jsonl" | "ndjson" => Ok(TableFormat::Jsonl),
        other => anyhow::bail!("Unknown input.format: '{}'. Must be csv or jsonl.", other),
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.output.batch_size == 0 {
        anyhow::bail!("output.batch_size must be > 0");
    }

    if config.remote.base_url.trim().is_empty() {
        anyhow::bail!("remote.base_url must not be empty");
    }

    if let Some(ref format) = config.input.format {
        parse_format(format)?;
    }

    let columns = &config.input.columns;
    for (field, name) in [
        ("repository", &columns.repository),
        ("line", &columns.line),
        ("before_id", &columns.before_id),
        ("after_id", &columns.after_id),
        ("line_before", &columns.line_before),
        ("line_after", &columns.line_after),
    ] {
        if name.trim().is_empty() {
            anyhow::bail!("input.columns.{} must not be empty", field);
        }
    }

    Ok(())
}
