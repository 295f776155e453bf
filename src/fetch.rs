//! Batch orchestration: the two-phase pass/retry state machine.
//!
//! ## Why two phases instead of inline retries?
//!
//! Retrying a key immediately after it fails hits the same overloaded
//! generation path that just refused it, and it doubles the request rate
//! against a service that rate-limits. Instead the initial pass records
//! failures in the durable ledger and moves on; retry passes then sweep
//! the ledger with a strictly longer pacing interval. Because the ledger
//! is persisted only at pass boundaries and artifacts are written
//! atomically, an interrupt between items always leaves a state a fresh
//! run can continue from: finished keys are protected by the store's
//! skip-if-exists check, unfinished ones are still in the ledger.

use crate::config::FetchConfig;
use crate::error::{EcFetchError, FetchFailure};
use crate::key::LookupKey;
use crate::ledger::{FailedEntry, FailureLedger};
use crate::output::{BatchOutput, BatchStats, KeyResult, KeyStatus};
use crate::pipeline::classify::{classify, ClassifiedResponse};
use crate::pipeline::extract::{extract_document, DocumentSource, ExtractionOutcome};
use crate::pipeline::request::RequestExecutor;
use crate::pipeline::store::{ArtifactStore, StoreOutcome};
use crate::progress::PassKind;
use crate::session::SessionContext;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Resolve a batch of lookup keys: one initial pass, then up to
/// `pacing.retry_passes` retry passes over whatever failed.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// Returns `Err(EcFetchError)` only for fatal conditions — bad session
/// headers, unusable output directory, unreadable or unwritable ledger.
/// Per-key trouble never aborts the batch; it lands in the ledger and in
/// the returned [`BatchOutput`].
pub async fn fetch_batch(
    keys: &[LookupKey],
    session: &SessionContext,
    config: &FetchConfig,
) -> Result<BatchOutput, EcFetchError> {
    let total_start = Instant::now();
    info!("starting batch: {} keys", keys.len());

    // ── Step 1: open collaborators ───────────────────────────────────────
    let store = ArtifactStore::open(&config.output_dir)?;
    let executor = RequestExecutor::new(session, config)?;
    let mut ledger = FailureLedger::load(&config.ledger_path)?;

    // ── Step 2: initial pass ─────────────────────────────────────────────
    let mut results = run_pass(&executor, &store, keys, config, PassKind::Initial, 0).await;
    record_failures(&mut ledger, &results);
    ledger.persist()?;
    let mut passes_run = 1;

    // ── Step 3: retry passes over the ledger ─────────────────────────────
    let mut pass_num: u32 = 1;
    while pass_num <= config.pacing.retry_passes && !ledger.is_empty() {
        info!("retry pass {pass_num}: {} entries", ledger.len());
        // The service needs a breather before being asked again.
        config.pacer.pause(config.pacing.between_retries).await;

        let pending = ledger.drain();
        let retry_keys: Vec<LookupKey> = pending.into_iter().map(|e| e.key).collect();
        let retry_results =
            run_pass(&executor, &store, &retry_keys, config, PassKind::Retry, pass_num).await;
        record_failures(&mut ledger, &retry_results);
        ledger.persist()?;

        results.extend(retry_results);
        passes_run += 1;
        pass_num += 1;
    }

    // ── Step 4: assemble output ──────────────────────────────────────────
    let stats = compute_stats(&results, keys.len(), ledger.len(), passes_run, total_start);
    info!(
        "batch complete: {} stored, {} already present, {} still failing",
        stats.stored, stats.already_present, stats.failed
    );
    Ok(BatchOutput {
        results,
        remaining: ledger.entries().to_vec(),
        stats,
    })
}

/// Resolve only what the durable ledger holds — the restart path.
///
/// A fresh process can continue a previous run's retry work without
/// re-running keys that already produced artifacts. An absent or empty
/// ledger means there is nothing to do.
pub async fn retry_from_ledger(
    session: &SessionContext,
    config: &FetchConfig,
) -> Result<BatchOutput, EcFetchError> {
    let total_start = Instant::now();
    let store = ArtifactStore::open(&config.output_dir)?;
    let executor = RequestExecutor::new(session, config)?;
    let mut ledger = FailureLedger::load(&config.ledger_path)?;

    let total_keys = ledger.len();
    if total_keys == 0 {
        info!("ledger is empty, nothing to retry");
        return Ok(BatchOutput {
            results: Vec::new(),
            remaining: Vec::new(),
            stats: BatchStats {
                total_duration_ms: total_start.elapsed().as_millis() as u64,
                ..BatchStats::default()
            },
        });
    }
    info!("retrying {} ledger entries", total_keys);

    let mut results = Vec::new();
    let mut passes_run = 0;
    let mut pass_num: u32 = 1;
    // A retry-only run always gets at least one pass, whatever the policy says.
    let max_passes = config.pacing.retry_passes.max(1);
    while pass_num <= max_passes && !ledger.is_empty() {
        if pass_num > 1 {
            config.pacer.pause(config.pacing.between_retries).await;
        }
        let pending = ledger.drain();
        let retry_keys: Vec<LookupKey> = pending.into_iter().map(|e| e.key).collect();
        let retry_results =
            run_pass(&executor, &store, &retry_keys, config, PassKind::Retry, pass_num).await;
        record_failures(&mut ledger, &retry_results);
        ledger.persist()?;

        results.extend(retry_results);
        passes_run += 1;
        pass_num += 1;
    }

    let stats = compute_stats(&results, total_keys, ledger.len(), passes_run, total_start);
    Ok(BatchOutput {
        results,
        remaining: ledger.entries().to_vec(),
        stats,
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// One strictly sequential sweep over `keys`, pacing between items.
async fn run_pass(
    executor: &RequestExecutor,
    store: &ArtifactStore,
    keys: &[LookupKey],
    config: &FetchConfig,
    kind: PassKind,
    pass: u32,
) -> Vec<KeyResult> {
    let total = keys.len();
    let interval = match kind {
        PassKind::Initial => config.pacing.between_items,
        PassKind::Retry => config.pacing.between_retries,
    };
    if let Some(ref cb) = config.progress_callback {
        cb.on_pass_start(kind, total);
    }

    let mut results = Vec::with_capacity(total);
    for (i, key) in keys.iter().enumerate() {
        if let Some(ref cb) = config.progress_callback {
            cb.on_key_start(i + 1, total, key);
        }

        let result = resolve_key(executor, store, key, config, pass).await;

        if let Some(ref cb) = config.progress_callback {
            match &result.error {
                None => cb.on_key_complete(i + 1, total, key, &result.filename),
                Some(e) => cb.on_key_failed(i + 1, total, key, &e.to_string()),
            }
        }
        results.push(result);

        // Pause after every item except the last of the pass.
        if i + 1 < total {
            config.pacer.pause(interval).await;
        }
    }

    let succeeded = results.iter().filter(|r| r.is_resolved()).count();
    if let Some(ref cb) = config.progress_callback {
        cb.on_pass_complete(kind, total, succeeded);
    }
    results
}

/// Resolve one key end to end: store check, request, classify, extract,
/// store. Every failure mode is caught here and returned as a `KeyResult`;
/// nothing per-key escapes to abort the pass.
async fn resolve_key(
    executor: &RequestExecutor,
    store: &ArtifactStore,
    key: &LookupKey,
    config: &FetchConfig,
    pass: u32,
) -> KeyResult {
    let start = Instant::now();
    let filename = key.artifact_name();

    // Already resolved by an earlier run or pass: success without a request.
    if store.contains(&filename) {
        debug!("{filename} already in store, skipping request");
        return finish(key, &filename, KeyStatus::AlreadyStored, None, None, start, pass);
    }

    let raw = match executor.execute(key).await {
        Ok(raw) => raw,
        Err(e) => return finish(key, &filename, KeyStatus::Failed, None, Some(e), start, pass),
    };

    match classify(raw) {
        ClassifiedResponse::Pdf(bytes) => store_document(
            store,
            key,
            &filename,
            &bytes,
            DocumentSource::Body,
            start,
            pass,
        ),
        ClassifiedResponse::Unparseable { status, snippet } => {
            write_diagnostic(config, snippet.as_bytes());
            let failure = FetchFailure::Unparseable { status, snippet };
            finish(key, &filename, KeyStatus::Failed, None, Some(failure), start, pass)
        }
        ClassifiedResponse::Structured(tree) => {
            write_diagnostic_json(config, &tree);
            if let Some(message) = tree.get("message").and_then(Value::as_str) {
                debug!("server message for {key}: {message}");
            }
            match extract_document(executor, &tree).await {
                ExtractionOutcome::Document { bytes, source } => {
                    store_document(store, key, &filename, &bytes, source, start, pass)
                }
                ExtractionOutcome::NotFound {
                    diagnostic,
                    decode_error,
                } => {
                    let failure = match decode_error {
                        Some(detail) => FetchFailure::Decode { detail },
                        None => FetchFailure::NotFound { diagnostic },
                    };
                    finish(key, &filename, KeyStatus::Failed, None, Some(failure), start, pass)
                }
            }
        }
    }
}

fn store_document(
    store: &ArtifactStore,
    key: &LookupKey,
    filename: &str,
    bytes: &[u8],
    source: DocumentSource,
    start: Instant,
    pass: u32,
) -> KeyResult {
    match store.store(filename, bytes) {
        Ok(StoreOutcome::Stored(_)) => finish(
            key,
            filename,
            KeyStatus::Stored,
            Some(source),
            None,
            start,
            pass,
        ),
        Ok(StoreOutcome::AlreadyExists(_)) => finish(
            key,
            filename,
            KeyStatus::AlreadyStored,
            Some(source),
            None,
            start,
            pass,
        ),
        Err(e) => finish(key, filename, KeyStatus::Failed, None, Some(e), start, pass),
    }
}

fn finish(
    key: &LookupKey,
    filename: &str,
    status: KeyStatus,
    source: Option<DocumentSource>,
    error: Option<FetchFailure>,
    start: Instant,
    pass: u32,
) -> KeyResult {
    KeyResult {
        key: key.clone(),
        filename: filename.to_string(),
        status,
        source,
        error,
        duration_ms: start.elapsed().as_millis() as u64,
        pass,
    }
}

/// Append this pass's failures to the in-memory ledger.
fn record_failures(ledger: &mut FailureLedger, results: &[KeyResult]) {
    for result in results {
        if let Some(ref error) = result.error {
            ledger.record(FailedEntry::new(result.key.clone(), error.to_string()));
        }
    }
}

/// Best-effort diagnostic sink for structured responses.
///
/// Overwritten on every structured response so it always holds the last
/// one; failures are logged and ignored — the sink is for offline
/// inspection, not correctness.
fn write_diagnostic_json(config: &FetchConfig, tree: &Value) {
    let Some(ref path) = config.diagnostic_path else {
        return;
    };
    match serde_json::to_string_pretty(tree) {
        Ok(json) => {
            if let Err(e) = std::fs::write(path, json) {
                warn!("cannot write diagnostic file {}: {e}", path.display());
            }
        }
        Err(e) => warn!("cannot serialize diagnostic response: {e}"),
    }
}

/// Best-effort diagnostic sink for unparseable bodies.
fn write_diagnostic(config: &FetchConfig, body: &[u8]) {
    let Some(ref path) = config.diagnostic_path else {
        return;
    };
    if let Err(e) = std::fs::write(path, body) {
        warn!("cannot write diagnostic file {}: {e}", path.display());
    }
}

fn compute_stats(
    results: &[KeyResult],
    total_keys: usize,
    remaining: usize,
    passes_run: u32,
    total_start: Instant,
) -> BatchStats {
    BatchStats {
        total_keys,
        stored: results
            .iter()
            .filter(|r| r.status == KeyStatus::Stored)
            .count(),
        already_present: results
            .iter()
            .filter(|r| r.status == KeyStatus::AlreadyStored)
            .count(),
        failed: remaining,
        recovered_on_retry: results
            .iter()
            .filter(|r| r.pass > 0 && r.is_resolved())
            .count(),
        passes_run,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: KeyStatus, pass: u32) -> KeyResult {
        let key = LookupKey::new("29", "08", "040", "384", "-");
        KeyResult {
            filename: key.artifact_name(),
            key,
            status,
            source: None,
            error: match status {
                KeyStatus::Failed => Some(FetchFailure::Network {
                    detail: "reset".into(),
                }),
                _ => None,
            },
            duration_ms: 1,
            pass,
        }
    }

    #[test]
    fn stats_count_recoveries_separately() {
        let results = vec![
            result(KeyStatus::Stored, 0),
            result(KeyStatus::Failed, 0),
            result(KeyStatus::AlreadyStored, 0),
            result(KeyStatus::Stored, 1), // the pass-0 failure, recovered
        ];
        let stats = compute_stats(&results, 3, 0, 2, Instant::now());
        assert_eq!(stats.total_keys, 3);
        assert_eq!(stats.stored, 2);
        assert_eq!(stats.already_present, 1);
        assert_eq!(stats.recovered_on_retry, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.passes_run, 2);
    }

    #[test]
    fn record_failures_skips_successes() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut ledger = FailureLedger::empty(dir.path().join("l.json"));
        let results = vec![
            result(KeyStatus::Stored, 0),
            result(KeyStatus::Failed, 0),
        ];
        record_failures(&mut ledger, &results);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.entries()[0].reason.contains("reset"));
    }
}
