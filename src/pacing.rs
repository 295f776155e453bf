//! Cooperative pacing between requests.
//!
//! The remote service rate-limits and misbehaves under rapid-fire load, so
//! the pipeline pauses between items — this is a design constraint, not a
//! politeness nicety. The pause goes through a [`Pacer`] trait object so
//! tests can assert *that* and *how long* the pipeline would have paused
//! without any real time passing.

use async_trait::async_trait;
use std::time::Duration;

/// Cooperative delay abstraction.
///
/// Implementations must be `Send + Sync`; the orchestrator holds one behind
/// an `Arc` for the whole run.
#[async_trait]
pub trait Pacer: Send + Sync {
    /// Suspend the current task for roughly `duration`.
    async fn pause(&self, duration: Duration);
}

/// Real pacing via `tokio::time::sleep`. The default.
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A pacer that never waits.
///
/// For tests, and for callers that point the pipeline at a service of
/// their own where pacing is not needed.
pub struct NoopPacer;

#[async_trait]
impl Pacer for NoopPacer {
    async fn pause(&self, _duration: Duration) {}
}
