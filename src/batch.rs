//! Batch planning and batch file output.
//!
//! The input table is split into consecutive, order-preserving batches. Batch
//! `i` is written to `batch_{i:03}.jsonl` in the output directory, and the
//! existence of that file is the only record that the batch is done.
//!
//! Files are written to a `.tmp` sibling and renamed into place, so a run
//! interrupted mid-write never leaves a file at the final path.

use anyhow::{ensure, Context, Result};
use std::fmt::Write as _;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::models::Sample;

/// One planned batch: its index, its rows in the table, and its output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub index: usize,
    pub rows: Range<usize>,
    pub path: PathBuf,
}

impl BatchPlan {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// A batch is complete exactly when its output file exists.
    pub fn is_complete(&self) -> bool {
        self.path.exists()
    }
}

pub fn batch_file_name(index: usize) -> String {
    format!("batch_{:03}.jsonl", index)
}

/// Split `total_rows` rows into batches of `batch_size` (the last may be
/// shorter).
pub fn plan_batches(total_rows: usize, batch_size: usize, out_dir: &Path) -> Result<Vec<BatchPlan>> {
    ensure!(batch_size > 0, "batch size must be > 0");

    Ok((0..total_rows)
        .step_by(batch_size)
        .enumerate()
        .map(|(index, start)| BatchPlan {
            index,
            rows: start..(start + batch_size).min(total_rows),
            path: out_dir.join(batch_file_name(index)),
        })
        .collect())
}

/// Write `samples` as JSONL to `path`, in order.
///
/// The whole file is rendered in memory first, written to a temporary
/// sibling, then renamed onto `path`.
pub fn write_batch(path: &Path, samples: &[Sample]) -> Result<()> {
    let mut body = String::new();
    for sample in samples {
        let line = serde_json::to_string(sample)?;
        writeln!(body, "{}", line)?;
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }

    let temp_path = temp_path_for(path);
    std::fs::write(&temp_path, body)
        .with_context(|| format!("Failed to write {}", temp_path.display()))?;
    std::fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;

    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
