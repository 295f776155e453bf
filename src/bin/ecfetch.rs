//! CLI binary for ec-fetch.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `FetchConfig`, reads the key file, and prints results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use ec_fetch::{
    fetch_batch, retry_from_ledger, BatchOutput, FetchConfig, FetchProgressCallback, LookupKey,
    PassKind, SessionContext, NO_SUB_DIVISION,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar per pass, a log line per key.
/// Keys are processed strictly in order, so no out-of-order handling is
/// needed here.
struct CliProgressCallback {
    bar: ProgressBar,
    failures: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} keys  ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            failures: AtomicUsize::new(0),
        })
    }
}

impl FetchProgressCallback for CliProgressCallback {
    fn on_pass_start(&self, kind: PassKind, total_keys: usize) {
        self.bar.set_length(total_keys as u64);
        self.bar.set_position(0);
        self.bar.set_prefix(match kind {
            PassKind::Initial => "Fetching",
            PassKind::Retry => "Retrying",
        });
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "{} {total_keys} keys…",
                match kind {
                    PassKind::Initial => "Fetching",
                    PassKind::Retry => "Retrying",
                }
            ))
        ));
    }

    fn on_key_start(&self, _index: usize, _total: usize, key: &LookupKey) {
        self.bar.set_message(key.to_string());
    }

    fn on_key_complete(&self, index: usize, total: usize, _key: &LookupKey, filename: &str) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}",
            green("✓"),
            index,
            total,
            dim(filename),
        ));
        self.bar.inc(1);
    }

    fn on_key_failed(&self, index: usize, total: usize, key: &LookupKey, reason: &str) {
        self.failures.fetch_add(1, Ordering::SeqCst);
        // Truncate very long reasons to keep output tidy.
        let reason: String = if reason.chars().count() > 80 {
            let mut r: String = reason.chars().take(79).collect();
            r.push('\u{2026}');
            r
        } else {
            reason.to_string()
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            index,
            total,
            key,
            red(&reason),
        ));
        self.bar.inc(1);
    }

    fn on_pass_complete(&self, _kind: PassKind, total_keys: usize, succeeded: usize) {
        let failed = total_keys.saturating_sub(succeeded);
        if failed == 0 {
            self.bar
                .println(format!("{} all {total_keys} keys resolved", green("✔")));
        } else {
            self.bar.println(format!(
                "{} {succeeded}/{total_keys} resolved  ({} failed)",
                cyan("⚠"),
                red(&failed.to_string()),
            ));
        }
    }
}

const AFTER_HELP: &str = r#"KEY FILE FORMAT:
  One certificate per line: village,survey,sub-division
  Lines starting with '#' and a header line are skipped.
  An empty sub-division (or '-') means "no sub-division".

    # village,survey,subdiv
    040,384,2A
    040,385,-
    112,12/1,

EXAMPLES:
  # Fetch a batch (district/taluk apply to every row)
  ecfetch keys.csv --district 29 --taluk 08 --cookie "PHPSESSID=..."

  # Re-run later: existing PDFs are skipped, only missing ones are fetched
  ecfetch keys.csv --district 29 --taluk 08 --cookie "PHPSESSID=..."

  # Drain the failure ledger from a previous run, nothing else
  ecfetch --retry-only --cookie "PHPSESSID=..."

  # Slower pacing for a grumpy service day
  ecfetch keys.csv --district 29 --taluk 08 --delay 12 --retry-delay 30 \
      --cookie "PHPSESSID=..."

SESSION COOKIE:
  The service authenticates by cookie. Open the certificate viewer in a
  browser, copy the Cookie header from DevTools → Network, and pass it via
  --cookie or ECFETCH_COOKIE. When downloads start failing with
  unparseable/HTML responses, the cookie has usually expired — grab a
  fresh one and re-run; completed files are never re-fetched.

ENVIRONMENT VARIABLES:
  ECFETCH_COOKIE        Session cookie (alternative to --cookie)
  ECFETCH_DISTRICT      District code
  ECFETCH_TALUK         Taluk code
  ECFETCH_OUTPUT_DIR    Artifact directory
  ECFETCH_API_URL       Override the service endpoint
"#;

/// Bulk-download encumbrance certificate PDFs with ledger-backed retry.
#[derive(Parser, Debug)]
#[command(
    name = "ecfetch",
    version,
    about = "Bulk-download encumbrance certificate PDFs with ledger-backed retry",
    long_about = "Retrieve server-rendered encumbrance certificates for a batch of survey \
numbers. Handles the service's inconsistent response shapes (raw PDF, embedded base64, \
secondary URL), stores each certificate exactly once, and records failures in a durable \
ledger for paced retry.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Key file (village,survey,sub-division per line). Optional with --retry-only.
    key_file: Option<PathBuf>,

    /// District code applied to every row.
    #[arg(long, env = "ECFETCH_DISTRICT")]
    district: Option<String>,

    /// Taluk code applied to every row.
    #[arg(long, env = "ECFETCH_TALUK")]
    taluk: Option<String>,

    /// Session cookie copied from a logged-in browser.
    #[arg(long, env = "ECFETCH_COOKIE", hide_env_values = true)]
    cookie: String,

    /// Service endpoint.
    #[arg(long, env = "ECFETCH_API_URL")]
    api_url: Option<String>,

    /// Value for the service's x-app-name header.
    #[arg(long, default_value = "demo")]
    app_name: String,

    /// Directory certificates are written into.
    #[arg(short, long, env = "ECFETCH_OUTPUT_DIR", default_value = "ec_output")]
    output_dir: PathBuf,

    /// Failure-ledger file.
    #[arg(long, default_value = "failed_entries.json")]
    ledger: PathBuf,

    /// Write the last structured/unparseable response here for inspection.
    #[arg(long)]
    diagnostic: Option<PathBuf>,

    /// Seconds between requests in the initial pass.
    #[arg(long, default_value_t = 6)]
    delay: u64,

    /// Seconds between requests in retry passes (must exceed --delay).
    #[arg(long, default_value_t = 10)]
    retry_delay: u64,

    /// Retry passes after the initial pass.
    #[arg(long, default_value_t = 1)]
    retry_passes: u32,

    /// Request timeout in seconds.
    #[arg(long, default_value_t = 45)]
    timeout: u64,

    /// Only drain the failure ledger; do not read a key file.
    #[arg(long)]
    retry_only: bool,

    /// Disable the progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Session + config ─────────────────────────────────────────────────
    let mut session = SessionContext::new(cli.cookie.as_str()).with_app_name(cli.app_name.as_str());
    if let Some(ref url) = cli.api_url {
        session = session.with_api_url(url.as_str());
    }

    let mut builder = FetchConfig::builder()
        .output_dir(&cli.output_dir)
        .ledger_path(&cli.ledger)
        .request_timeout_secs(cli.timeout)
        .between_items(Duration::from_secs(cli.delay))
        .between_retries(Duration::from_secs(cli.retry_delay))
        .retry_passes(cli.retry_passes);
    if let Some(ref path) = cli.diagnostic {
        builder = builder.diagnostic_path(path);
    }
    if show_progress {
        builder = builder.progress_callback(CliProgressCallback::new());
    }
    let config = builder.build().context("invalid configuration")?;

    // ── Run ──────────────────────────────────────────────────────────────
    let output = if cli.retry_only {
        retry_from_ledger(&session, &config)
            .await
            .context("retry run failed")?
    } else {
        let Some(ref key_file) = cli.key_file else {
            bail!("a key file is required unless --retry-only is given");
        };
        let district = cli
            .district
            .as_deref()
            .context("--district (or ECFETCH_DISTRICT) is required")?;
        let taluk = cli
            .taluk
            .as_deref()
            .context("--taluk (or ECFETCH_TALUK) is required")?;
        let keys = read_key_file(key_file, district, taluk)
            .with_context(|| format!("cannot read key file '{}'", key_file.display()))?;
        if keys.is_empty() {
            bail!("key file '{}' contains no keys", key_file.display());
        }
        fetch_batch(&keys, &session, &config)
            .await
            .context("batch run failed")?
    };

    // ── Summary ──────────────────────────────────────────────────────────
    if !cli.quiet {
        print_summary(&output, &cli.ledger);
    }
    if !output.is_complete() {
        std::process::exit(1);
    }
    Ok(())
}

/// Parse the key file: one `village,survey,sub-division` row per line.
///
/// Commas or tabs separate fields. `#` lines and a leading header row are
/// skipped; a missing or empty sub-division means `"-"`.
fn read_key_file(path: &PathBuf, district: &str, taluk: &str) -> Result<Vec<LookupKey>> {
    let raw = std::fs::read_to_string(path)?;
    let mut keys = Vec::new();
    for (lineno, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line
            .split(|c| c == ',' || c == '\t')
            .map(str::trim)
            .collect();
        if lineno == 0 && fields.iter().any(|f| f.eq_ignore_ascii_case("survey")) {
            continue; // header row
        }
        if fields.len() < 2 {
            bail!("line {}: expected village,survey[,sub-division]", lineno + 1);
        }
        let sub_division = match fields.get(2) {
            Some(s) if !s.is_empty() => *s,
            _ => NO_SUB_DIVISION,
        };
        keys.push(LookupKey::new(
            district, taluk, fields[0], fields[1], sub_division,
        ));
    }
    Ok(keys)
}

fn print_summary(output: &BatchOutput, ledger: &PathBuf) {
    let s = &output.stats;
    eprintln!();
    eprintln!(
        "{} {} stored, {} already present, {} recovered on retry",
        green("✔"),
        bold(&s.stored.to_string()),
        s.already_present,
        s.recovered_on_retry,
    );
    if s.failed > 0 {
        eprintln!(
            "{} {} still failing — recorded in {} for a later --retry-only run:",
            red("✘"),
            bold(&s.failed.to_string()),
            ledger.display(),
        );
        for entry in &output.remaining {
            eprintln!("    {}  {}", entry.filename, dim(&entry.reason));
        }
    }
    eprintln!(
        "{}",
        dim(&format!(
            "{} passes, {:.1}s total",
            s.passes_run,
            s.total_duration_ms as f64 / 1000.0
        ))
    );
}
