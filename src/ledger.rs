//! The failure ledger: durable record of keys not yet resolved.
//!
//! The ledger is a single JSON file holding the ordered list of failed
//! entries, rewritten whole at pass boundaries (read-modify-write, not an
//! append-only log). Absence of the file means an empty ledger; the file
//! is deleted once the last entry recovers. That makes the ledger the sole
//! source of retry work: deleting it externally cancels pending retries
//! without resurrecting completed ones, because the artifact store's
//! skip-if-exists check is what protects finished work.

use crate::error::EcFetchError;
use crate::key::LookupKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One key that failed to resolve, with a human-readable reason.
///
/// Identity for ledger bookkeeping is `key` + `filename`; the reason and
/// timestamp describe the *latest* failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedEntry {
    pub key: LookupKey,
    /// Artifact name the key resolves to (stored so a retry after a code
    /// change still targets the file the earlier pass intended).
    pub filename: String,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

impl FailedEntry {
    /// Record a failure for `key` with the given reason, stamped now.
    pub fn new(key: LookupKey, reason: impl Into<String>) -> Self {
        let filename = key.artifact_name();
        Self {
            key,
            filename,
            reason: reason.into(),
            recorded_at: Utc::now(),
        }
    }

    fn same_target(&self, other: &FailedEntry) -> bool {
        self.key == other.key && self.filename == other.filename
    }
}

/// In-memory view of the durable ledger file.
///
/// Loaded once per run; mutated in memory during a pass; persisted only at
/// pass boundaries so an interrupt mid-pass never leaves a half-written
/// ledger.
#[derive(Debug)]
pub struct FailureLedger {
    path: PathBuf,
    entries: Vec<FailedEntry>,
}

impl FailureLedger {
    /// Load the ledger from `path`. A missing file is an empty ledger; a
    /// file that exists but cannot be read or parsed is fatal (treating it
    /// as empty would silently discard pending retries).
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, EcFetchError> {
        let path = path.into();
        if !path.exists() {
            debug!("no ledger at {}, starting empty", path.display());
            return Ok(Self {
                path,
                entries: Vec::new(),
            });
        }
        let raw = std::fs::read(&path).map_err(|e| EcFetchError::LedgerRead {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        let entries: Vec<FailedEntry> =
            serde_json::from_slice(&raw).map_err(|e| EcFetchError::LedgerRead {
                path: path.clone(),
                detail: e.to_string(),
            })?;
        info!("loaded {} ledger entries from {}", entries.len(), path.display());
        Ok(Self { path, entries })
    }

    /// An empty in-memory ledger that will persist to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[FailedEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Record a failure. A key already in the ledger keeps a single entry;
    /// its reason and timestamp are refreshed to the latest failure.
    pub fn record(&mut self, entry: FailedEntry) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.same_target(&entry)) {
            existing.reason = entry.reason;
            existing.recorded_at = entry.recorded_at;
        } else {
            self.entries.push(entry);
        }
    }

    /// Take every entry out for a retry pass, leaving the ledger empty in
    /// memory. Still-failing entries are recorded back before `persist`.
    pub fn drain(&mut self) -> Vec<FailedEntry> {
        std::mem::take(&mut self.entries)
    }

    /// Write the ledger to its file — or delete the file when empty.
    pub fn persist(&self) -> Result<(), EcFetchError> {
        if self.entries.is_empty() {
            match std::fs::remove_file(&self.path) {
                Ok(()) => info!("ledger cleared: {}", self.path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(EcFetchError::LedgerWrite {
                        path: self.path.clone(),
                        source: e,
                    })
                }
            }
            return Ok(());
        }

        let json = serde_json::to_string_pretty(&self.entries).map_err(|e| {
            EcFetchError::LedgerWrite {
                path: self.path.clone(),
                source: std::io::Error::other(e),
            }
        })?;
        std::fs::write(&self.path, json).map_err(|e| EcFetchError::LedgerWrite {
            path: self.path.clone(),
            source: e,
        })?;
        info!(
            "ledger persisted: {} entries at {}",
            self.entries.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(survey: &str) -> LookupKey {
        LookupKey::new("29", "08", "040", survey, "-")
    }

    #[test]
    fn missing_file_is_an_empty_ledger() {
        let dir = TempDir::new().unwrap();
        let ledger = FailureLedger::load(dir.path().join("failed_entries.json")).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn corrupt_file_is_fatal_not_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("failed_entries.json");
        std::fs::write(&path, b"{not json").unwrap();
        let err = FailureLedger::load(&path).unwrap_err();
        assert!(matches!(err, EcFetchError::LedgerRead { .. }));
    }

    #[test]
    fn entries_round_trip_through_persist_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("failed_entries.json");

        let mut ledger = FailureLedger::load(&path).unwrap();
        ledger.record(FailedEntry::new(key("384"), "no document in response"));
        ledger.record(FailedEntry::new(key("385/1"), "network error: timed out"));
        ledger.persist().unwrap();

        let reloaded = FailureLedger::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.entries()[0].key, key("384"));
        assert_eq!(reloaded.entries()[1].reason, "network error: timed out");
    }

    #[test]
    fn recording_the_same_key_twice_keeps_one_entry() {
        let dir = TempDir::new().unwrap();
        let mut ledger = FailureLedger::empty(dir.path().join("l.json"));
        ledger.record(FailedEntry::new(key("384"), "first reason"));
        ledger.record(FailedEntry::new(key("384"), "second reason"));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.entries()[0].reason, "second reason");
    }

    #[test]
    fn persisting_empty_deletes_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("failed_entries.json");

        let mut ledger = FailureLedger::empty(&path);
        ledger.record(FailedEntry::new(key("384"), "transient"));
        ledger.persist().unwrap();
        assert!(path.exists());

        ledger.drain();
        ledger.persist().unwrap();
        assert!(!path.exists());

        // Persisting empty when the file never existed is fine too.
        ledger.persist().unwrap();
    }

    #[test]
    fn drain_empties_in_memory_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("l.json");
        let mut ledger = FailureLedger::empty(&path);
        ledger.record(FailedEntry::new(key("1"), "x"));
        ledger.record(FailedEntry::new(key("2"), "y"));
        let taken = ledger.drain();
        assert_eq!(taken.len(), 2);
        assert!(ledger.is_empty());
    }
}
