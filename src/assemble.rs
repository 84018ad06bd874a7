//! Sample assembly.

use crate::models::{Record, Sample};

/// Keys written explicitly on every sample. A passthrough column with one of
/// these names is dropped rather than overwriting the explicit value.
pub const RESERVED_KEYS: [&str; 4] = ["input", "output", "line_before", "line_after"];

/// Builds [`Sample`]s from a record and its located before/after functions.
#[derive(Debug, Clone)]
pub struct SampleAssembler {
    instruction: String,
}

impl SampleAssembler {
    /// `instruction` is prefixed verbatim to the buggy function in `input`.
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
        }
    }

    pub fn assemble(&self, record: &Record, before: &str, after: &str) -> Sample {
        let extra = record
            .fields
            .iter()
            .filter(|(name, _)| !RESERVED_KEYS.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Sample {
            input: format!("{}{}", self.instruction, before),
            output: after.to_string(),
            line_before: record.line_before.clone(),
            line_after: record.line_after.clone(),
            extra,
        }
    }
}
