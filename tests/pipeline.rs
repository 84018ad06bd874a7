//! Library-level tests for the build pipeline.
//!
//! Blobs come from an in-memory store that counts requests, and the rate
//! limiter counts pauses instead of sleeping, so these tests exercise the
//! batching, resumability, dedup, and row-level failure paths without any
//! network access or real delays.

use anyhow::{bail, Result};
use async_trait::async_trait;
use fixpair::assemble::SampleAssembler;
use fixpair::build::{build_batches, BuildSummary, Pipeline};
use fixpair::config::ColumnsConfig;
use fixpair::fetch::{BlobStore, ContentFetcher, RateLimit};
use fixpair::models::{Row, Sample};
use fixpair::progress::{BuildProgressEvent, BuildProgressReporter, NoProgress, SkipReason};
use fixpair::table::{resolve_columns, ResolvedColumns};
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const BUGGY: &str = "\
import os


def add(a, b):
    return a - b


VALUE = 3
";

const FIXED: &str = "\
import os


def add(a, b):
    return a + b


VALUE = 3
";

const NESTED_BUGGY: &str = "\
def outer(items):
    total = 0

    def inner(x):
        return x * 3

    for item in items:
        total += inner(item)
    return total
";

const NESTED_FIXED: &str = "\
def outer(items):
    total = 0

    def inner(x):
        return x * 2

    for item in items:
        total += inner(item)
    return total
";

// ─── Test doubles ───────────────────────────────────────────────────

/// Blobs keyed by content id; unknown ids fail like an HTTP 404.
struct MemoryStore {
    blobs: HashMap<String, String>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn fetch_blob(&self, _repository: &str, content_id: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.blobs.get(content_id) {
            Some(text) => Ok(text.clone()),
            None => bail!("HTTP 404 Not Found"),
        }
    }
}

struct CountingLimit(Arc<AtomicUsize>);

#[async_trait]
impl RateLimit for CountingLimit {
    async fn pause(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct RecordingReporter {
    events: Mutex<Vec<BuildProgressEvent>>,
}

impl BuildProgressReporter for RecordingReporter {
    fn report(&self, event: BuildProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl RecordingReporter {
    fn started_sizes(&self) -> Vec<usize> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                BuildProgressEvent::BatchStarted { rows, .. } => Some(*rows),
                _ => None,
            })
            .collect()
    }

    fn skip_reasons(&self) -> Vec<SkipReason> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                BuildProgressEvent::RecordSkipped { reason, .. } => Some(*reason),
                _ => None,
            })
            .collect()
    }
}

struct Harness {
    pipeline: Pipeline,
    calls: Arc<AtomicUsize>,
    pauses: Arc<AtomicUsize>,
}

fn harness() -> Harness {
    let calls = Arc::new(AtomicUsize::new(0));
    let pauses = Arc::new(AtomicUsize::new(0));
    let blobs = HashMap::from([
        ("buggy".to_string(), BUGGY.to_string()),
        ("fixed".to_string(), FIXED.to_string()),
        ("nested_buggy".to_string(), NESTED_BUGGY.to_string()),
        ("nested_fixed".to_string(), NESTED_FIXED.to_string()),
        ("broken".to_string(), "def f(:\n  pass\n".to_string()),
    ]);
    let store = MemoryStore {
        blobs,
        calls: calls.clone(),
    };
    let fetcher = ContentFetcher::new(Box::new(store), Box::new(CountingLimit(pauses.clone())));
    Harness {
        pipeline: Pipeline::new(fetcher, SampleAssembler::new("Fix the bug:\n")),
        calls,
        pauses,
    }
}

fn row(repo: &str, line: &str, before: &str, after: &str) -> Row {
    json!({
        "project_name": repo,
        "line_changed": line,
        "file_before_sha": before,
        "file_after_sha": after,
        "line_before": "    return a - b",
        "line_after": "    return a + b",
        "bug_type": "CHANGE_BINARY_OPERATOR",
    })
    .as_object()
    .cloned()
    .unwrap()
}

fn good_row(repo: &str) -> Row {
    row(repo, "5", "buggy", "fixed")
}

fn columns(rows: &[Row]) -> ResolvedColumns {
    let header: Vec<String> = rows[0].keys().cloned().collect();
    resolve_columns(&header, &ColumnsConfig::default()).unwrap()
}

fn read_samples(path: &Path) -> Vec<Sample> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

async fn build(
    h: &Harness,
    rows: &[Row],
    batch_size: usize,
    out: &Path,
    reporter: &dyn BuildProgressReporter,
) -> BuildSummary {
    build_batches(rows, &columns(rows), batch_size, out, &h.pipeline, reporter)
        .await
        .unwrap()
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn five_rows_batch_size_two_writes_three_files() {
    let tmp = TempDir::new().unwrap();
    let h = harness();
    let rows: Vec<Row> = (0..5).map(|i| good_row(&format!("acme/repo{}", i))).collect();
    let reporter = RecordingReporter::default();

    let summary = build(&h, &rows, 2, tmp.path(), &reporter).await;

    assert_eq!(summary.batches_total, 3);
    assert_eq!(summary.batches_written, 3);
    assert_eq!(summary.samples_written, 5);
    assert_eq!(reporter.started_sizes(), [2, 2, 1]);

    let mut names: Vec<String> = std::fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    assert_eq!(
        names,
        ["batch_000.jsonl", "batch_001.jsonl", "batch_002.jsonl"]
    );
    assert_eq!(read_samples(&tmp.path().join("batch_000.jsonl")).len(), 2);
    assert_eq!(read_samples(&tmp.path().join("batch_002.jsonl")).len(), 1);
}

#[tokio::test]
async fn sample_contents_and_passthrough() {
    let tmp = TempDir::new().unwrap();
    let h = harness();
    let rows = vec![good_row("acme/widgets")];

    build(&h, &rows, 10, tmp.path(), &NoProgress).await;

    let samples = read_samples(&tmp.path().join("batch_000.jsonl"));
    assert_eq!(samples.len(), 1);
    let s = &samples[0];
    assert_eq!(s.input, "Fix the bug:\ndef add(a, b):\n    return a - b");
    assert_eq!(s.output, "def add(a, b):\n    return a + b");
    assert_eq!(s.line_before, "    return a - b");
    assert_eq!(s.line_after, "    return a + b");
    assert_eq!(s.extra["project_name"], json!("acme/widgets"));
    assert_eq!(s.extra["bug_type"], json!("CHANGE_BINARY_OPERATOR"));
    assert_eq!(s.extra["file_before_sha"], json!("buggy"));
}

#[tokio::test]
async fn nested_function_is_chosen_over_parent() {
    let tmp = TempDir::new().unwrap();
    let h = harness();
    let rows = vec![row("acme/widgets", "5", "nested_buggy", "nested_fixed")];

    build(&h, &rows, 10, tmp.path(), &NoProgress).await;

    let samples = read_samples(&tmp.path().join("batch_000.jsonl"));
    assert_eq!(samples[0].output, "    def inner(x):\n        return x * 2");
}

#[tokio::test]
async fn second_run_makes_no_requests_and_keeps_files() {
    let tmp = TempDir::new().unwrap();
    let h = harness();
    let rows: Vec<Row> = (0..5).map(|i| good_row(&format!("acme/repo{}", i))).collect();

    build(&h, &rows, 2, tmp.path(), &NoProgress).await;
    let calls_after_first = h.calls.load(Ordering::SeqCst);
    assert_eq!(calls_after_first, 10);
    let first: Vec<Vec<u8>> = (0..3)
        .map(|i| std::fs::read(tmp.path().join(format!("batch_{:03}.jsonl", i))).unwrap())
        .collect();

    let summary = build(&h, &rows, 2, tmp.path(), &NoProgress).await;
    assert_eq!(summary.batches_skipped, 3);
    assert_eq!(summary.batches_written, 0);
    assert_eq!(h.calls.load(Ordering::SeqCst), calls_after_first);

    let second: Vec<Vec<u8>> = (0..3)
        .map(|i| std::fs::read(tmp.path().join(format!("batch_{:03}.jsonl", i))).unwrap())
        .collect();
    assert_eq!(first, second);
}

#[tokio::test]
async fn resumes_at_first_missing_batch() {
    let tmp = TempDir::new().unwrap();
    let h = harness();
    let rows: Vec<Row> = (0..4).map(|i| good_row(&format!("acme/repo{}", i))).collect();

    build(&h, &rows, 2, tmp.path(), &NoProgress).await;
    std::fs::remove_file(tmp.path().join("batch_001.jsonl")).unwrap();
    // A leftover temp file is not a completion signal.
    std::fs::write(tmp.path().join("batch_001.jsonl.tmp"), "{\"partial\"").unwrap();
    h.calls.store(0, Ordering::SeqCst);

    let summary = build(&h, &rows, 2, tmp.path(), &NoProgress).await;
    assert_eq!(summary.batches_skipped, 1);
    assert_eq!(summary.batches_written, 1);
    assert_eq!(h.calls.load(Ordering::SeqCst), 4);
    assert_eq!(read_samples(&tmp.path().join("batch_001.jsonl")).len(), 2);
}

#[tokio::test]
async fn duplicates_within_a_batch_are_processed_once() {
    let tmp = TempDir::new().unwrap();
    let h = harness();
    let rows = vec![
        good_row("acme/widgets"),
        good_row("acme/widgets"),
        good_row("acme/gadgets"),
    ];
    let reporter = RecordingReporter::default();

    let summary = build(&h, &rows, 3, tmp.path(), &reporter).await;

    assert_eq!(summary.duplicates, 1);
    assert_eq!(summary.samples_written, 2);
    assert_eq!(h.calls.load(Ordering::SeqCst), 4);
    assert_eq!(reporter.skip_reasons(), [SkipReason::Duplicate]);
}

#[tokio::test]
async fn duplicates_across_batches_are_not_suppressed() {
    let tmp = TempDir::new().unwrap();
    let h = harness();
    let rows = vec![good_row("acme/widgets"), good_row("acme/widgets")];

    let summary = build(&h, &rows, 1, tmp.path(), &NoProgress).await;

    assert_eq!(summary.duplicates, 0);
    assert_eq!(summary.samples_written, 2);
    assert_eq!(h.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn failed_fetch_drops_only_that_row() {
    let tmp = TempDir::new().unwrap();
    let h = harness();
    let mut rows: Vec<Row> = (0..9).map(|i| good_row(&format!("acme/repo{}", i))).collect();
    rows.insert(4, row("acme/missing", "5", "no-such-blob", "fixed"));

    let summary = build(&h, &rows, 10, tmp.path(), &NoProgress).await;

    assert_eq!(summary.fetch_failures, 1);
    assert_eq!(summary.samples_written, 9);
    assert_eq!(read_samples(&tmp.path().join("batch_000.jsonl")).len(), 9);
    // Both sides are requested even when the first fails.
    assert_eq!(h.calls.load(Ordering::SeqCst), 20);
}

#[tokio::test]
async fn every_request_is_followed_by_a_pause() {
    let tmp = TempDir::new().unwrap();
    let h = harness();
    let rows = vec![
        good_row("acme/widgets"),
        row("acme/missing", "5", "no-such-blob", "also-missing"),
    ];

    build(&h, &rows, 10, tmp.path(), &NoProgress).await;

    assert_eq!(h.calls.load(Ordering::SeqCst), 4);
    assert_eq!(h.pauses.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn unlocatable_and_malformed_rows_are_skipped() {
    let tmp = TempDir::new().unwrap();
    let h = harness();
    let rows = vec![
        // Module-level line: no enclosing function.
        row("acme/widgets", "8", "buggy", "fixed"),
        // Before version does not parse.
        row("acme/widgets", "1", "broken", "fixed"),
        // Line number is not an integer.
        row("acme/widgets", "five", "buggy", "fixed"),
        good_row("acme/widgets"),
    ];
    let reporter = RecordingReporter::default();

    let summary = build(&h, &rows, 10, tmp.path(), &reporter).await;

    assert_eq!(summary.missing_functions, 2);
    assert_eq!(summary.record_errors, 1);
    assert_eq!(summary.samples_written, 1);
    assert_eq!(
        reporter.skip_reasons(),
        [
            SkipReason::NoFunction,
            SkipReason::NoFunction,
            SkipReason::Error
        ]
    );
    // The malformed row never reached the store.
    assert_eq!(h.calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn batch_with_no_samples_is_still_written() {
    let tmp = TempDir::new().unwrap();
    let h = harness();
    let rows = vec![row("acme/missing", "5", "nope", "nope")];

    let summary = build(&h, &rows, 10, tmp.path(), &NoProgress).await;

    assert_eq!(summary.batches_written, 1);
    let path = tmp.path().join("batch_000.jsonl");
    assert!(path.exists());
    assert!(std::fs::read_to_string(path).unwrap().is_empty());
}
