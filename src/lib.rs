//! # ec-fetch
//!
//! Paced bulk retrieval of server-rendered encumbrance-certificate PDFs.
//!
//! ## Why this crate?
//!
//! The certificate service renders each document on demand and answers in
//! whatever shape it feels like: raw PDF bytes, a JSON envelope with the
//! PDF base64-encoded somewhere inside, or a JSON envelope pointing at a
//! secondary URL — frequently with a wrong `Content-Type` on top. Driving
//! it by hand means re-downloading hundreds of documents every time the
//! session cookie expires mid-batch. This crate classifies and extracts
//! the document from whichever shape comes back, stores each one exactly
//! once under a deterministic name, and keeps a durable ledger of failures
//! so a re-run (or a fresh process after a crash) retries only what is
//! actually missing.
//!
//! ## Pipeline Overview
//!
//! ```text
//! lookup keys
//!  │
//!  ├─ 1. Request   one paced POST per key (strictly sequential)
//!  ├─ 2. Classify  PDF magic / JSON / unparseable-with-snippet
//!  ├─ 3. Extract   known field paths → exhaustive scan → secondary URL
//!  ├─ 4. Store     atomic write, skip-if-exists
//!  └─ 5. Ledger    failures recorded, retried at a slower pace
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ec_fetch::{fetch_batch, FetchConfig, LookupKey, SessionContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // The session cookie comes from outside (browser DevTools, login
//!     // automation); it is injected once and never refreshed implicitly.
//!     let session = SessionContext::new("PHPSESSID=...");
//!     let config = FetchConfig::default();
//!
//!     let keys = vec![
//!         LookupKey::new("29", "08", "040", "384", "2A"),
//!         LookupKey::new("29", "08", "040", "385", "-"),
//!     ];
//!
//!     let output = fetch_batch(&keys, &session, &config).await?;
//!     eprintln!(
//!         "{} stored, {} still failing",
//!         output.stats.stored, output.stats.failed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Sequential by design
//!
//! There is deliberately no concurrency knob. The service throttles and
//! misbehaves under parallel load, so the pipeline resolves one key fully
//! before touching the next and pauses between items (configurable via
//! [`PacingPolicy`]). Retry passes pace even slower.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ecfetch` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! ec-fetch = { version = "0.2", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod fetch;
pub mod key;
pub mod ledger;
pub mod output;
pub mod pacing;
pub mod pipeline;
pub mod progress;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{FetchConfig, FetchConfigBuilder, PacingPolicy};
pub use error::{EcFetchError, FetchFailure};
pub use fetch::{fetch_batch, retry_from_ledger};
pub use key::{LookupKey, NO_SUB_DIVISION};
pub use ledger::{FailedEntry, FailureLedger};
pub use output::{BatchOutput, BatchStats, KeyResult, KeyStatus};
pub use pacing::{NoopPacer, Pacer, TokioPacer};
pub use pipeline::classify::{classify, ClassifiedResponse};
pub use pipeline::extract::{extract_document, DocumentSource, ExtractionOutcome};
pub use pipeline::request::{RawResponse, RequestExecutor};
pub use pipeline::store::{ArtifactStore, StoreOutcome};
pub use progress::{FetchProgressCallback, NoopProgressCallback, PassKind, ProgressCallback};
pub use session::SessionContext;
