//! Batch completion overview.
//!
//! Plans batches over the configured table and reports which already have
//! an output file. Touches neither the network nor the output directory.

use anyhow::Result;

use crate::batch::{plan_batches, BatchPlan};
use crate::config::Config;
use crate::table::load_table;

/// Completion state of one planned batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchStatus {
    pub plan: BatchPlan,
    pub complete: bool,
}

pub fn batch_statuses(config: &Config) -> Result<Vec<BatchStatus>> {
    let table = load_table(&config.input)?;
    let plans = plan_batches(
        table.rows.len(),
        config.output.batch_size,
        &config.output.dir,
    )?;
    Ok(plans
        .into_iter()
        .map(|plan| {
            let complete = plan.is_complete();
            BatchStatus { plan, complete }
        })
        .collect())
}

pub fn print_status(config: &Config) -> Result<()> {
    let statuses = batch_statuses(config)?;

    if statuses.is_empty() {
        println!("No rows in {}.", config.input.path.display());
        return Ok(());
    }

    println!("{:<8} {:<16} {:<8} FILE", "BATCH", "ROWS", "STATE");
    for status in &statuses {
        let rows = format!("{}..{}", status.plan.rows.start + 1, status.plan.rows.end);
        let state = if status.complete { "done" } else { "pending" };
        println!(
            "{:<8} {:<16} {:<8} {}",
            status.plan.index,
            rows,
            state,
            status.plan.path.display()
        );
    }

    let done = statuses.iter().filter(|s| s.complete).count();
    println!();
    println!("{} of {} batches complete", done, statuses.len());
    Ok(())
}
