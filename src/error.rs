//! Error types for the ec-fetch library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`EcFetchError`] — **Fatal**: the batch cannot proceed at all
//!   (invalid configuration, unreadable ledger, unusable output directory).
//!   Returned as `Err(EcFetchError)` from the top-level `fetch_*` functions.
//!
//! * [`FetchFailure`] — **Non-fatal**: a single lookup key failed (network
//!   blip, unparseable response, no document located) but the rest of the
//!   batch is fine. Stored inside [`crate::output::KeyResult`] and recorded
//!   in the failure ledger so the key can be retried later.
//!
//! The separation keeps the batch alive through per-key trouble while still
//! aborting loudly when the ledger or the store itself is broken — silently
//! dropping ledger entries would lose track of work.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the ec-fetch library.
///
/// Per-key failures use [`FetchFailure`] and are recorded in the ledger
/// rather than propagated here.
#[derive(Debug, Error)]
pub enum EcFetchError {
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A session header value could not be encoded for the wire.
    #[error("Invalid session context: {detail}")]
    InvalidSession { detail: String },

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {detail}")]
    HttpClient { detail: String },

    /// The output directory could not be created or opened.
    #[error("Cannot open artifact directory '{path}': {source}")]
    StoreDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The ledger file exists but could not be read or parsed.
    ///
    /// A corrupt ledger is fatal rather than treated as empty: treating it
    /// as empty would silently discard every pending retry.
    #[error("Cannot read failure ledger '{path}': {detail}")]
    LedgerRead { path: PathBuf, detail: String },

    /// The ledger file could not be written or deleted.
    #[error("Cannot write failure ledger '{path}': {source}")]
    LedgerWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A non-fatal failure for a single lookup key.
///
/// Converted into a ledger entry (via its `Display` rendering) at the end
/// of a pass. The batch continues with the next key.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum FetchFailure {
    /// Connection, DNS, or timeout failure before a response arrived.
    #[error("network error: {detail}")]
    Network { detail: String },

    /// The body was neither a PDF nor parseable JSON.
    #[error("not PDF / not JSON (HTTP {status}): {snippet}")]
    Unparseable { status: u16, snippet: String },

    /// Well-formed structured response, but no document located by any
    /// extraction strategy.
    #[error("no document in response: {diagnostic}")]
    NotFound { diagnostic: String },

    /// A payload candidate was found but its base64 encoding was invalid.
    #[error("base64 decode failed: {detail}")]
    Decode { detail: String },

    /// The artifact could not be written to the store.
    #[error("cannot store artifact '{name}': {detail}")]
    Store { name: String, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparseable_display_carries_status_and_snippet() {
        let e = FetchFailure::Unparseable {
            status: 502,
            snippet: "<html>Bad Gateway".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("502"), "got: {msg}");
        assert!(msg.contains("Bad Gateway"));
    }

    #[test]
    fn not_found_display_carries_diagnostic() {
        let e = FetchFailure::NotFound {
            diagnostic: r#"{"message":"No Data Found"}"#.into(),
        };
        assert!(e.to_string().contains("No Data Found"));
    }

    #[test]
    fn fetch_failure_round_trips_through_json() {
        let e = FetchFailure::Decode {
            detail: "invalid padding".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: FetchFailure = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, FetchFailure::Decode { .. }));
    }

    #[test]
    fn ledger_read_display_names_the_path() {
        let e = EcFetchError::LedgerRead {
            path: PathBuf::from("failed_entries.json"),
            detail: "expected value at line 1".into(),
        };
        assert!(e.to_string().contains("failed_entries.json"));
    }
}
