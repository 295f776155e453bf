//! Progress-callback trait for per-key batch events.
//!
//! Inject an [`Arc<dyn FetchProgressCallback>`] via
//! [`crate::config::FetchConfigBuilder::progress_callback`] to receive
//! real-time events as the pipeline walks a pass.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers
//! can forward events to a terminal progress bar, a log file, or a channel
//! of their own without the library knowing how the host application
//! communicates. All methods default to no-ops so implementors override
//! only what they care about.

use crate::key::LookupKey;
use std::sync::Arc;

/// Which kind of pass is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// First sweep over the caller-supplied keys.
    Initial,
    /// A sweep over ledger entries, with the longer pacing interval.
    Retry,
}

/// Called by the batch orchestrator as it processes each lookup key.
///
/// The pipeline is strictly sequential, so events for one pass arrive in
/// order and never concurrently; `Send + Sync` is still required because
/// the callback crosses `await` points.
pub trait FetchProgressCallback: Send + Sync {
    /// Called once at the start of each pass.
    fn on_pass_start(&self, kind: PassKind, total_keys: usize) {
        let _ = (kind, total_keys);
    }

    /// Called just before a key's request is issued (or its store check runs).
    fn on_key_start(&self, index: usize, total_keys: usize, key: &LookupKey) {
        let _ = (index, total_keys, key);
    }

    /// Called when a key resolves to a stored (or already-present) artifact.
    fn on_key_complete(&self, index: usize, total_keys: usize, key: &LookupKey, filename: &str) {
        let _ = (index, total_keys, key, filename);
    }

    /// Called when a key fails with a ledger-worthy reason.
    fn on_key_failed(&self, index: usize, total_keys: usize, key: &LookupKey, reason: &str) {
        let _ = (index, total_keys, key, reason);
    }

    /// Called once after every key of the pass has been attempted.
    fn on_pass_complete(&self, kind: PassKind, total_keys: usize, succeeded: usize) {
        let _ = (kind, total_keys, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl FetchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::FetchConfig`].
pub type ProgressCallback = Arc<dyn FetchProgressCallback>;
