//! Build orchestration.
//!
//! Coordinates the full flow: table → batches → fetch before/after →
//! locate enclosing functions → assemble samples → one JSONL file per batch.
//!
//! Batches whose output file already exists are skipped, so an interrupted
//! build resumes at the first unwritten batch. All state that lives for the
//! duration of a batch (the dedup set and the collected samples) is held in a
//! [`BatchArena`] created fresh for that batch and dropped once its file is
//! written. Every step runs sequentially; records are never fetched
//! concurrently.

use anyhow::{Context, Result};
use std::path::Path;

use crate::assemble::SampleAssembler;
use crate::batch::{plan_batches, write_batch, BatchPlan};
use crate::config::Config;
use crate::dedup::Deduplicator;
use crate::fetch::ContentFetcher;
use crate::locate::locate;
use crate::models::{Record, Row, Sample};
use crate::progress::{BuildProgressEvent, BuildProgressReporter, SkipReason};
use crate::table::{load_table, resolve_columns, ResolvedColumns};

/// Counters for one build run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub batches_total: usize,
    /// Batches whose output file already existed.
    pub batches_skipped: usize,
    pub batches_written: usize,
    /// Records visited in written batches.
    pub records_seen: usize,
    pub samples_written: usize,
    pub duplicates: usize,
    pub fetch_failures: usize,
    pub missing_functions: usize,
    pub record_errors: usize,
}

impl BuildSummary {
    fn count_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Duplicate => self.duplicates += 1,
            SkipReason::FetchFailed => self.fetch_failures += 1,
            SkipReason::NoFunction => self.missing_functions += 1,
            SkipReason::Error => self.record_errors += 1,
        }
    }
}

/// What happened to one record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Emitted(Sample),
    Skipped(SkipReason),
}

/// State scoped to a single batch's processing pass.
#[derive(Debug, Default)]
pub struct BatchArena {
    pub dedup: Deduplicator,
    pub samples: Vec<Sample>,
}

/// The per-record stages: fetch, locate, assemble.
pub struct Pipeline {
    fetcher: ContentFetcher,
    assembler: SampleAssembler,
}

impl Pipeline {
    pub fn new(fetcher: ContentFetcher, assembler: SampleAssembler) -> Self {
        Self { fetcher, assembler }
    }

    /// Process one row against the batch's dedup set.
    ///
    /// Returns `Err` only when the row cannot be read as a record; every
    /// expected failure is a [`RecordOutcome::Skipped`].
    pub async fn process_record(
        &self,
        row: &Row,
        columns: &ResolvedColumns,
        dedup: &mut Deduplicator,
    ) -> Result<RecordOutcome> {
        let record = Record::from_row(row, columns)?;

        let key = record.dedup_key();
        if dedup.seen(&key) {
            return Ok(RecordOutcome::Skipped(SkipReason::Duplicate));
        }
        dedup.mark(key);

        let before_source = self
            .fetcher
            .fetch(&record.repository, &record.content_id_before)
            .await;
        let after_source = self
            .fetcher
            .fetch(&record.repository, &record.content_id_after)
            .await;
        let (Some(before_source), Some(after_source)) = (before_source, after_source) else {
            return Ok(RecordOutcome::Skipped(SkipReason::FetchFailed));
        };

        let before = locate(&before_source, record.line_number);
        let after = locate(&after_source, record.line_number);
        let (Some(before), Some(after)) = (before, after) else {
            return Ok(RecordOutcome::Skipped(SkipReason::NoFunction));
        };

        Ok(RecordOutcome::Emitted(
            self.assembler.assemble(&record, &before, &after),
        ))
    }

    /// Process every row of one batch and write its file.
    async fn run_batch(
        &self,
        plan: &BatchPlan,
        rows: &[Row],
        columns: &ResolvedColumns,
        reporter: &dyn BuildProgressReporter,
        summary: &mut BuildSummary,
    ) -> Result<()> {
        let mut arena = BatchArena::default();

        for (row_index, row) in rows.iter().enumerate().take(plan.rows.end).skip(plan.rows.start) {
            summary.records_seen += 1;
            let outcome = match self.process_record(row, columns, &mut arena.dedup).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    eprintln!("Warning: skipping row {}: {:#}", row_index + 1, e);
                    RecordOutcome::Skipped(SkipReason::Error)
                }
            };

            match outcome {
                RecordOutcome::Emitted(sample) => arena.samples.push(sample),
                RecordOutcome::Skipped(reason) => {
                    summary.count_skip(reason);
                    reporter.report(BuildProgressEvent::RecordSkipped {
                        index: plan.index,
                        row: row_index,
                        reason,
                    });
                }
            }
        }

        write_batch(&plan.path, &arena.samples)?;
        summary.samples_written += arena.samples.len();
        summary.batches_written += 1;
        Ok(())
    }
}

/// Run every unfinished batch over `rows`, in ascending batch order.
pub async fn build_batches(
    rows: &[Row],
    columns: &ResolvedColumns,
    batch_size: usize,
    out_dir: &Path,
    pipeline: &Pipeline,
    reporter: &dyn BuildProgressReporter,
) -> Result<BuildSummary> {
    let plans = plan_batches(rows.len(), batch_size, out_dir)?;
    let total = plans.len();
    let mut summary = BuildSummary {
        batches_total: total,
        ..BuildSummary::default()
    };

    for plan in &plans {
        if plan.is_complete() {
            eprintln!(
                "Skipping batch {:03}: {} already exists",
                plan.index,
                plan.path.display()
            );
            summary.batches_skipped += 1;
            reporter.report(BuildProgressEvent::BatchSkipped {
                index: plan.index,
                total,
                path: plan.path.clone(),
            });
            continue;
        }

        reporter.report(BuildProgressEvent::BatchStarted {
            index: plan.index,
            total,
            rows: plan.len(),
        });

        let before = summary.samples_written;
        pipeline
            .run_batch(plan, rows, columns, reporter, &mut summary)
            .await?;

        reporter.report(BuildProgressEvent::BatchWritten {
            index: plan.index,
            total,
            samples: summary.samples_written - before,
            path: plan.path.clone(),
        });
    }

    Ok(summary)
}

/// Load the configured table and build every unfinished batch.
pub async fn run_build(
    config: &Config,
    reporter: &dyn BuildProgressReporter,
) -> Result<BuildSummary> {
    let table = load_table(&config.input)?;
    if table.rows.is_empty() {
        println!("No rows in {}.", config.input.path.display());
        return Ok(BuildSummary::default());
    }
    let columns = resolve_columns(&table.header, &config.input.columns)?;

    std::fs::create_dir_all(&config.output.dir).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            config.output.dir.display()
        )
    })?;

    let pipeline = Pipeline::new(
        ContentFetcher::from_config(&config.remote)?,
        SampleAssembler::new(config.sample.instruction.clone()),
    );

    let summary = build_batches(
        &table.rows,
        &columns,
        config.output.batch_size,
        &config.output.dir,
        &pipeline,
        reporter,
    )
    .await?;

    println!("build {}", config.input.path.display());
    println!("  rows: {}", table.rows.len());
    println!(
        "  batches: {} total, {} already complete, {} written",
        summary.batches_total, summary.batches_skipped, summary.batches_written
    );
    println!("  records processed: {}", summary.records_seen);
    println!("  samples written: {}", summary.samples_written);
    println!("  duplicates: {}", summary.duplicates);
    println!("  fetch failures: {}", summary.fetch_failures);
    println!("  no enclosing function: {}", summary.missing_functions);
    println!("  row errors: {}", summary.record_errors);
    println!("ok");

    Ok(summary)
}
