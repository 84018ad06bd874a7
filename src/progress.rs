//! Build progress reporting.
//!
//! Reports observable progress during `fixpair build` so users see which
//! batches are skipped as already complete, which are being processed, and
//! which records were dropped and why. Progress is emitted on **stderr** so
//! stdout remains parseable for scripts.

use std::io::Write;
use std::path::PathBuf;

/// Why a record produced no sample.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SkipReason {
    /// Same dedup key already processed in this batch.
    Duplicate,
    /// Before or after content could not be fetched or decoded.
    FetchFailed,
    /// No function encloses the changed line in one of the versions, or the
    /// source did not parse.
    NoFunction,
    /// The row could not be turned into a record.
    Error,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Duplicate => "duplicate",
            SkipReason::FetchFailed => "fetch_failed",
            SkipReason::NoFunction => "no_function",
            SkipReason::Error => "error",
        }
    }
}

/// A single progress event for a build.
#[derive(Clone, Debug)]
pub enum BuildProgressEvent {
    /// The batch's output file already exists.
    BatchSkipped {
        index: usize,
        total: usize,
        path: PathBuf,
    },
    BatchStarted {
        index: usize,
        total: usize,
        rows: usize,
    },
    RecordSkipped {
        index: usize,
        row: usize,
        reason: SkipReason,
    },
    BatchWritten {
        index: usize,
        total: usize,
        samples: usize,
        path: PathBuf,
    },
}

/// Reports build progress. Implementations write to stderr (human or JSON).
pub trait BuildProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the build orchestrator.
    fn report(&self, event: BuildProgressEvent);
}

/// Human-friendly progress on stderr: "batch 3 / 12  written  87 samples -> out/batch_002.jsonl".
pub struct StderrProgress;

impl BuildProgressReporter for StderrProgress {
    fn report(&self, event: BuildProgressEvent) {
        let line = match &event {
            BuildProgressEvent::BatchSkipped { index, total, path } => format!(
                "batch {} / {}  skipped  {} exists\n",
                index + 1,
                total,
                path.display()
            ),
            BuildProgressEvent::BatchStarted { index, total, rows } => format!(
                "batch {} / {}  processing  {} rows\n",
                index + 1,
                total,
                format_number(*rows as u64)
            ),
            BuildProgressEvent::RecordSkipped { index, row, reason } => format!(
                "batch {}  row {}  skipped ({})\n",
                index + 1,
                row + 1,
                reason.as_str()
            ),
            BuildProgressEvent::BatchWritten {
                index,
                total,
                samples,
                path,
            } => format!(
                "batch {} / {}  written  {} samples -> {}\n",
                index + 1,
                total,
                format_number(*samples as u64),
                path.display()
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl BuildProgressReporter for JsonProgress {
    fn report(&self, event: BuildProgressEvent) {
        let obj = match &event {
            BuildProgressEvent::BatchSkipped { index, total, path } => serde_json::json!({
                "event": "batch_skipped",
                "batch": index,
                "total": total,
                "path": path.display().to_string(),
            }),
            BuildProgressEvent::BatchStarted { index, total, rows } => serde_json::json!({
                "event": "batch_started",
                "batch": index,
                "total": total,
                "rows": rows,
            }),
            BuildProgressEvent::RecordSkipped { index, row, reason } => serde_json::json!({
                "event": "record_skipped",
                "batch": index,
                "row": row,
                "reason": reason.as_str(),
            }),
            BuildProgressEvent::BatchWritten {
                index,
                total,
                samples,
                path,
            } => serde_json::json!({
                "event": "batch_written",
                "batch": index,
                "total": total,
                "samples": samples,
                "path": path.display().to_string(),
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl BuildProgressReporter for NoProgress {
    fn report(&self, _event: BuildProgressEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn BuildProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
