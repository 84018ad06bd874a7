//! # fixpair
//!
//! Builds a supervised "buggy function → fixed function" dataset from a table
//! of recorded single-line code changes.
//!
//! For every row the two versions of the changed file are fetched from a
//! content-addressed store, the Python function enclosing the changed line is
//! located in each version, and the pair is written as one JSON object. Rows
//! are processed in fixed-size batches, one JSONL file per batch, so an
//! interrupted build resumes at the first batch whose file is missing.
//!
//! ## Architecture
//!
//! ```text
//! table (CSV / JSONL)
//!   └─▶ batches of N rows ──▶ fetch before/after blobs (rate limited)
//!         └─▶ locate enclosing function (tree-sitter) ──▶ assemble sample
//!               └─▶ out/batch_NNN.jsonl
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`table`] | Input table loading and column resolution |
//! | [`fetch`] | Blob store access with rate limiting |
//! | [`locate`] | Enclosing-function lookup |
//! | [`dedup`] | Per-batch duplicate suppression |
//! | [`assemble`] | Sample construction |
//! | [`batch`] | Batch planning and JSONL output |
//! | [`build`] | Build orchestration |
//! | [`progress`] | Progress reporting |
//! | [`status`] | Batch completion overview |

pub mod assemble;
pub mod batch;
pub mod build;
pub mod config;
pub mod dedup;
pub mod fetch;
pub mod locate;
pub mod models;
pub mod progress;
pub mod status;
pub mod table;
