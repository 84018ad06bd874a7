//! Per-batch suppression of repeated work.

use std::collections::HashSet;

use crate::models::DedupKey;

/// Keys already processed in the current batch. Created empty for each
/// batch and dropped with it, so identical keys in different batches are
/// each processed once per batch.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<DedupKey>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self, key: &DedupKey) -> bool {
        self.seen.contains(key)
    }

    pub fn mark(&mut self, key: DedupKey) {
        self.seen.insert(key);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
