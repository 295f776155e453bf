//! Payload extraction: locate the document inside a structured response.
//!
//! The envelope shape is not documented anywhere and has changed under us,
//! so extraction is an ordered pipeline of three strategies rather than a
//! schema:
//!
//! 1. **Direct field paths** the service is known to use (`EC.Base64String`).
//! 2. **Exhaustive scan** — a depth-first walk over the whole tree visiting
//!    every string leaf, qualifying leaves by the base64 image of the PDF
//!    magic (`%PDF` encodes to `JVBER`), so a payload survives the next
//!    envelope reshuffle too.
//! 3. **Secondary URL** — a handful of known fields may point at the file
//!    instead of embedding it.
//!
//! The first candidate from steps 1–2 wins outright; a candidate that then
//! fails to decode is not fatal — the pipeline still tries step 3 before
//! giving up, and the decode error travels with the outcome.

use crate::pipeline::classify::{classify, ClassifiedResponse};
use crate::pipeline::request::RequestExecutor;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Field paths checked before the exhaustive scan, in order.
const DIRECT_PAYLOAD_PATHS: &[&[&str]] = &[&["EC", "Base64String"], &["Base64String"]];

/// Top-level fields that may hold a secondary document URL, in order.
const SECONDARY_URL_FIELDS: &[&str] = &["url", "pdfUrl", "fileUrl"];

/// A qualifying scan candidate must be longer than this after prefix
/// stripping. Short strings starting with `JVBER` show up in ordinary
/// identifiers; a real certificate payload is tens of kilobytes.
const MIN_CANDIDATE_LEN: usize = 100;

/// Base64 image of the PDF magic bytes, compared case-insensitively.
const B64_PDF_SIGNATURE: &str = "jvber";

/// Longest serialized-tree diagnostic kept for the failure ledger.
const DIAGNOSTIC_MAX_CHARS: usize = 800;

/// Where a stored document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentSource {
    /// The response body was the PDF itself (classifier hit).
    #[serde(rename = "body")]
    Body,
    /// Decoded from a known field path.
    #[serde(rename = "direct")]
    DirectField,
    /// Decoded from a leaf found by the exhaustive scan.
    #[serde(rename = "embedded")]
    EmbeddedScan,
    /// Downloaded from a URL found in the response.
    #[serde(rename = "secondary-url")]
    SecondaryUrl,
}

/// Outcome of running the extraction pipeline over one structured response.
#[derive(Debug, Clone)]
pub enum ExtractionOutcome {
    /// Document located and decoded (or downloaded).
    Document {
        bytes: Vec<u8>,
        source: DocumentSource,
    },
    /// No strategy produced a document.
    NotFound {
        /// Bounded serialized form of the tree, for the ledger.
        diagnostic: String,
        /// Present when a candidate was found but its base64 was invalid.
        decode_error: Option<String>,
    },
}

/// Run the extraction pipeline over a structured response tree.
///
/// The executor is only touched if step 3 needs a secondary GET.
pub async fn extract_document(executor: &RequestExecutor, tree: &Value) -> ExtractionOutcome {
    // Steps 1–2: a single candidate; once one is found, no further lookups.
    let found = lookup_direct(tree)
        .map(|c| (c, DocumentSource::DirectField))
        .or_else(|| scan_for_payload(tree).map(|c| (c, DocumentSource::EmbeddedScan)));

    let mut decode_error = None;
    if let Some((candidate, source)) = found {
        debug!("payload candidate via {source:?} ({} chars)", candidate.len());
        match decode_payload(candidate) {
            Ok(bytes) => {
                return ExtractionOutcome::Document { bytes, source };
            }
            Err(e) => {
                warn!("payload candidate rejected: {e}");
                decode_error = Some(e.to_string());
            }
        }
    }

    // Step 3: a URL pointing at the file instead of embedding it.
    if let Some(url) = secondary_url(tree) {
        debug!("following secondary document url {url}");
        match executor.fetch_secondary(url).await {
            Ok(raw) if raw.is_ok() => {
                if let ClassifiedResponse::Pdf(bytes) = classify(raw) {
                    return ExtractionOutcome::Document {
                        bytes,
                        source: DocumentSource::SecondaryUrl,
                    };
                }
                warn!("secondary url did not yield a PDF: {url}");
            }
            Ok(raw) => warn!("secondary url answered HTTP {}: {url}", raw.status),
            Err(e) => warn!("secondary url fetch failed: {e}"),
        }
    }

    ExtractionOutcome::NotFound {
        diagnostic: diagnostic_of(tree),
        decode_error,
    }
}

/// Step 1: check the known field paths for a string value.
///
/// The value is taken unconditionally (no signature check) — when the
/// service names a field `Base64String`, believing it is the point.
fn lookup_direct(tree: &Value) -> Option<&str> {
    DIRECT_PAYLOAD_PATHS.iter().find_map(|path| {
        let mut node = tree;
        for segment in *path {
            node = node.get(segment)?;
        }
        node.as_str()
            .map(|s| strip_data_uri(s.trim()))
            .filter(|s| !s.is_empty())
    })
}

/// Step 2: depth-first walk over the closed JSON union, visiting every
/// string leaf in encounter order. First qualifying leaf wins — there is
/// no shortest/longest preference.
fn scan_for_payload(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) => map.values().find_map(scan_for_payload),
        Value::Array(items) => items.iter().find_map(scan_for_payload),
        Value::String(s) => qualify(s),
        Value::Null | Value::Bool(_) | Value::Number(_) => None,
    }
}

/// Whether a string leaf looks like the base64 of a PDF.
fn qualify(leaf: &str) -> Option<&str> {
    let stripped = strip_data_uri(leaf.trim());
    if stripped.len() <= MIN_CANDIDATE_LEN {
        return None;
    }
    let head = stripped.get(..B64_PDF_SIGNATURE.len())?;
    head.eq_ignore_ascii_case(B64_PDF_SIGNATURE)
        .then_some(stripped)
}

/// Drop an optional `data:<mime>;base64,` prefix.
fn strip_data_uri(s: &str) -> &str {
    if s.starts_with("data:") {
        if let Some(idx) = s.find(";base64,") {
            return &s[idx + ";base64,".len()..];
        }
    }
    s
}

/// Decode a candidate, tolerating embedded whitespace (some envelopes wrap
/// the payload at 76 columns).
fn decode_payload(candidate: &str) -> Result<Vec<u8>, base64::DecodeError> {
    if candidate.contains(|c: char| c.is_ascii_whitespace()) {
        let compact: String = candidate
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        STANDARD.decode(compact)
    } else {
        STANDARD.decode(candidate)
    }
}

/// Step 3 lookup: a top-level field holding a string that ends in `.pdf`.
fn secondary_url(tree: &Value) -> Option<&str> {
    SECONDARY_URL_FIELDS.iter().find_map(|field| {
        tree.get(field)
            .and_then(Value::as_str)
            .filter(|s| s.to_ascii_lowercase().ends_with(".pdf"))
    })
}

/// Bounded serialized form of the tree for ledger reasons.
fn diagnostic_of(tree: &Value) -> String {
    let serialized = tree.to_string();
    if serialized.chars().count() > DIAGNOSTIC_MAX_CHARS {
        serialized.chars().take(DIAGNOSTIC_MAX_CHARS).collect()
    } else {
        serialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchConfig;
    use crate::session::SessionContext;
    use serde_json::json;

    fn executor() -> RequestExecutor {
        // Never actually dialled in these tests: no secondary-url fields.
        let session = SessionContext::new("PHPSESSID=test").with_api_url("http://127.0.0.1:1/api");
        RequestExecutor::new(&session, &FetchConfig::default()).unwrap()
    }

    /// A payload long enough to qualify, decoding to PDF-looking bytes.
    fn pdf_payload() -> (String, Vec<u8>) {
        let mut bytes = b"%PDF-1.4\n".to_vec();
        bytes.extend(std::iter::repeat(b'x').take(120));
        (STANDARD.encode(&bytes), bytes)
    }

    #[tokio::test]
    async fn direct_field_path_wins() {
        let (b64, bytes) = pdf_payload();
        let tree = json!({ "EC": { "statusCode": 100, "Base64String": b64 } });
        match extract_document(&executor(), &tree).await {
            ExtractionOutcome::Document { bytes: got, source } => {
                assert_eq!(got, bytes);
                assert_eq!(source, DocumentSource::DirectField);
            }
            other => panic!("expected Document, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn scan_finds_payload_at_any_depth() {
        let (b64, bytes) = pdf_payload();
        let tree = json!({ "a": { "b": ["irrelevant", b64] } });
        match extract_document(&executor(), &tree).await {
            ExtractionOutcome::Document { bytes: got, source } => {
                assert_eq!(got, bytes);
                assert_eq!(source, DocumentSource::EmbeddedScan);
            }
            other => panic!("expected Document, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn data_uri_prefix_is_stripped() {
        let (b64, bytes) = pdf_payload();
        let tree = json!({ "doc": format!("data:application/pdf;base64,{b64}") });
        match extract_document(&executor(), &tree).await {
            ExtractionOutcome::Document { bytes: got, .. } => assert_eq!(got, bytes),
            other => panic!("expected Document, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_candidate_in_encounter_order_wins() {
        let (b64_first, bytes_first) = pdf_payload();
        let mut longer = b"%PDF-1.7\n".to_vec();
        longer.extend(std::iter::repeat(b'y').take(500));
        let b64_second = STANDARD.encode(&longer);
        let tree = json!({ "first": b64_first, "second": b64_second });
        match extract_document(&executor(), &tree).await {
            ExtractionOutcome::Document { bytes: got, .. } => assert_eq!(got, bytes_first),
            other => panic!("expected Document, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn short_signature_match_does_not_qualify() {
        // "JVBER..." but under the length floor: an identifier, not a payload.
        let tree = json!({ "token": "JVBERshortvalue" });
        match extract_document(&executor(), &tree).await {
            ExtractionOutcome::NotFound { diagnostic, decode_error } => {
                assert!(!diagnostic.is_empty());
                assert!(decode_error.is_none());
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrapped_payload_with_newlines_decodes() {
        let (b64, bytes) = pdf_payload();
        let wrapped: String = b64
            .as_bytes()
            .chunks(76)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        let tree = json!({ "EC": { "Base64String": wrapped } });
        match extract_document(&executor(), &tree).await {
            ExtractionOutcome::Document { bytes: got, .. } => assert_eq!(got, bytes),
            other => panic!("expected Document, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_direct_field_is_not_a_candidate() {
        let tree = json!({ "EC": { "Base64String": "" } });
        match extract_document(&executor(), &tree).await {
            ExtractionOutcome::NotFound { decode_error, .. } => assert!(decode_error.is_none()),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_base64_reports_decode_error() {
        let bad = format!("JVBER{}", "$".repeat(150));
        let tree = json!({ "payload": bad });
        match extract_document(&executor(), &tree).await {
            ExtractionOutcome::NotFound { decode_error, .. } => {
                assert!(decode_error.is_some());
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_envelope_yields_bounded_diagnostic() {
        let tree = json!({ "message": "No Data Found", "EC": { "statusCode": 1003 } });
        match extract_document(&executor(), &tree).await {
            ExtractionOutcome::NotFound { diagnostic, .. } => {
                assert!(diagnostic.contains("No Data Found"));
                assert!(diagnostic.chars().count() <= 800);
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn secondary_url_requires_pdf_extension() {
        let tree = json!({ "url": "https://example.com/view?id=5", "fileUrl": "https://example.com/ec/XYZ.PDF" });
        assert_eq!(secondary_url(&tree), Some("https://example.com/ec/XYZ.PDF"));
        let tree = json!({ "pdfUrl": "https://example.com/page.html" });
        assert_eq!(secondary_url(&tree), None);
    }
}
