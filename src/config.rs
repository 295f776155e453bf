//! Configuration types for batch certificate retrieval.
//!
//! All batch behaviour is controlled through [`FetchConfig`], built via its
//! [`FetchConfigBuilder`]. Keeping every knob in one struct makes it trivial
//! to share a config across passes and to see, in one place, why two runs
//! behaved differently.
//!
//! # Design choice: builder over constructor
//! The builder lets callers set only what they care about and rely on
//! validated defaults for the rest; `build()` rejects nonsensical pacing
//! (a retry interval not longer than the initial interval defeats the
//! point of the retry pass).

use crate::error::EcFetchError;
use crate::pacing::{Pacer, TokioPacer};
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// How the pipeline spaces requests out.
///
/// The remote service needs more breathing room when a key is retried after
/// failing — retries hammer the same server-side generation path that just
/// choked — so the retry interval must be strictly longer than the initial
/// one. Exact values are deliberately configurable: the service's tolerance
/// drifts, and there is no single correct constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacingPolicy {
    /// Pause between consecutive items of the initial pass. Default: 6 s.
    pub between_items: Duration,
    /// Pause between consecutive items of a retry pass. Default: 10 s.
    /// Must be strictly longer than `between_items`.
    pub between_retries: Duration,
    /// How many retry passes to run after the initial pass. Default: 1.
    pub retry_passes: u32,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            between_items: Duration::from_secs(6),
            between_retries: Duration::from_secs(10),
            retry_passes: 1,
        }
    }
}

/// Configuration for a batch run.
///
/// Built via [`FetchConfig::builder()`] or using [`FetchConfig::default()`].
///
/// # Example
/// ```rust
/// use ec_fetch::FetchConfig;
/// use std::time::Duration;
///
/// let config = FetchConfig::builder()
///     .output_dir("village_ec")
///     .between_items(Duration::from_secs(8))
///     .between_retries(Duration::from_secs(15))
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct FetchConfig {
    /// Directory artifacts are written into. Created if absent. Default: `ec_output`.
    pub output_dir: PathBuf,

    /// Path of the durable failure ledger. Default: `failed_entries.json`.
    ///
    /// Absence of the file means an empty ledger; the file is deleted when
    /// the last entry is recovered.
    pub ledger_path: PathBuf,

    /// Optional diagnostic sink: the last structured or unparseable response
    /// body is written here (overwritten each time) for offline inspection.
    /// Write-only and best-effort — not part of correctness. Default: off.
    pub diagnostic_path: Option<PathBuf>,

    /// Request timeout in seconds for the certificate POST and the secondary
    /// GET. Default: 45.
    ///
    /// Certificate generation happens server-side on demand and routinely
    /// takes tens of seconds; short timeouts misclassify slow successes as
    /// network failures and inflate the ledger.
    pub request_timeout_secs: u64,

    /// Pacing between items and across retry passes.
    pub pacing: PacingPolicy,

    /// Delay implementation. Default: [`TokioPacer`] (real sleeps).
    ///
    /// Tests inject a recording pacer to assert pacing without real time.
    pub pacer: Arc<dyn Pacer>,

    /// Optional per-key progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("ec_output"),
            ledger_path: PathBuf::from("failed_entries.json"),
            diagnostic_path: None,
            request_timeout_secs: 45,
            pacing: PacingPolicy::default(),
            pacer: Arc::new(TokioPacer),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for FetchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchConfig")
            .field("output_dir", &self.output_dir)
            .field("ledger_path", &self.ledger_path)
            .field("diagnostic_path", &self.diagnostic_path)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("pacing", &self.pacing)
            .field("pacer", &"<dyn Pacer>")
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn FetchProgressCallback>"),
            )
            .finish()
    }
}

impl FetchConfig {
    /// Create a new builder for `FetchConfig`.
    pub fn builder() -> FetchConfigBuilder {
        FetchConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`FetchConfig`].
#[derive(Debug)]
pub struct FetchConfigBuilder {
    config: FetchConfig,
}

impl FetchConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn ledger_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ledger_path = path.into();
        self
    }

    pub fn diagnostic_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.diagnostic_path = Some(path.into());
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn pacing(mut self, policy: PacingPolicy) -> Self {
        self.config.pacing = policy;
        self
    }

    pub fn between_items(mut self, interval: Duration) -> Self {
        self.config.pacing.between_items = interval;
        self
    }

    pub fn between_retries(mut self, interval: Duration) -> Self {
        self.config.pacing.between_retries = interval;
        self
    }

    pub fn retry_passes(mut self, passes: u32) -> Self {
        self.config.pacing.retry_passes = passes;
        self
    }

    pub fn pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.config.pacer = pacer;
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.config.progress_callback = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<FetchConfig, EcFetchError> {
        let c = &self.config;
        if c.request_timeout_secs == 0 {
            return Err(EcFetchError::InvalidConfig(
                "request timeout must be ≥ 1 second".into(),
            ));
        }
        if c.pacing.between_retries <= c.pacing.between_items {
            return Err(EcFetchError::InvalidConfig(format!(
                "retry interval ({:?}) must be strictly longer than the initial interval ({:?})",
                c.pacing.between_retries, c.pacing.between_items
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = FetchConfig::builder().build().unwrap();
        assert_eq!(config.request_timeout_secs, 45);
        assert_eq!(config.pacing.between_items, Duration::from_secs(6));
        assert_eq!(config.pacing.between_retries, Duration::from_secs(10));
        assert_eq!(config.pacing.retry_passes, 1);
    }

    #[test]
    fn retry_interval_must_exceed_initial_interval() {
        let err = FetchConfig::builder()
            .between_items(Duration::from_secs(10))
            .between_retries(Duration::from_secs(10))
            .build()
            .unwrap_err();
        assert!(matches!(err, EcFetchError::InvalidConfig(_)));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = FetchConfig::builder()
            .request_timeout_secs(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, EcFetchError::InvalidConfig(_)));
    }

    #[test]
    fn debug_does_not_require_pacer_debug() {
        let config = FetchConfig::default();
        let rendered = format!("{config:?}");
        assert!(rendered.contains("<dyn Pacer>"));
    }
}
