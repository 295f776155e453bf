//! Pipeline stages for resolving one lookup key to a stored artifact.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! change, say, the extraction heuristics without touching HTTP concerns.
//!
//! ## Data Flow
//!
//! ```text
//! request ──▶ classify ──▶ extract ──▶ store
//! (one POST)  (pdf/json)   (payload)   (atomic write)
//! ```
//!
//! 1. [`request`]  — issue one POST for one key and hand back the raw
//!    response; the only stage with primary network I/O
//! 2. [`classify`] — decide whether the body is already the PDF, parses as
//!    JSON, or is junk worth a diagnostic snippet
//! 3. [`extract`]  — locate the document inside a structured response:
//!    known field paths, exhaustive scan, or a secondary URL (which loops
//!    back through [`request`] and [`classify`])
//! 4. [`store`]    — idempotent, atomic persistence under the key's
//!    deterministic artifact name

pub mod classify;
pub mod extract;
pub mod request;
pub mod store;
