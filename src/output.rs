//! Result types returned by the batch orchestrator.
//!
//! A [`BatchOutput`] collects one [`KeyResult`] per attempt (a key retried
//! once appears twice, with different `pass` numbers) plus aggregate
//! [`BatchStats`], so callers can render summaries or serialize the whole
//! run for later inspection.

use crate::error::FetchFailure;
use crate::key::LookupKey;
use crate::ledger::FailedEntry;
use crate::pipeline::extract::DocumentSource;
use serde::{Deserialize, Serialize};

/// Terminal state of one attempt at one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    /// Artifact written by this attempt.
    Stored,
    /// Artifact already existed; no network request was made.
    AlreadyStored,
    /// No artifact; `error` holds the reason.
    Failed,
}

/// Outcome of one attempt at one lookup key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyResult {
    pub key: LookupKey,
    /// Deterministic artifact name the attempt targeted.
    pub filename: String,
    pub status: KeyStatus,
    /// Where the document came from, for stored results.
    pub source: Option<DocumentSource>,
    /// The failure, for failed results.
    pub error: Option<FetchFailure>,
    /// Wall-clock time for this attempt.
    pub duration_ms: u64,
    /// Pass number: 0 = initial, 1.. = retry passes.
    pub pass: u32,
}

impl KeyResult {
    /// Whether this attempt left an artifact in the store.
    pub fn is_resolved(&self) -> bool {
        matches!(self.status, KeyStatus::Stored | KeyStatus::AlreadyStored)
    }
}

/// Aggregate counters for a whole run (initial pass + retry passes).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    /// Keys the run started from (input keys, or ledger entries for a
    /// retry-only run).
    pub total_keys: usize,
    /// Artifacts written during this run.
    pub stored: usize,
    /// Keys skipped because their artifact already existed.
    pub already_present: usize,
    /// Keys still failing when the run ended (== remaining ledger entries).
    pub failed: usize,
    /// Keys that failed the initial pass but resolved during a retry pass.
    pub recovered_on_retry: usize,
    /// Passes actually run (1 initial + retries attempted).
    pub passes_run: u32,
    /// Wall-clock duration of the whole run.
    pub total_duration_ms: u64,
}

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    /// One entry per attempt, in execution order.
    pub results: Vec<KeyResult>,
    /// Ledger entries still pending after the final pass (also persisted
    /// to the ledger file).
    pub remaining: Vec<FailedEntry>,
    pub stats: BatchStats,
}

impl BatchOutput {
    /// Whether every key of the run ended with an artifact in the store.
    pub fn is_complete(&self) -> bool {
        self.remaining.is_empty()
    }
}
