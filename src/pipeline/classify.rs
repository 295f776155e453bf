//! Response classification: decide what shape the service answered in.
//!
//! The service is inconsistent three ways at once: it may return the PDF
//! bytes directly, a JSON envelope, or an HTML error page — and it is known
//! to mislabel the content type (PDF bytes under `text/html` and vice
//! versa). Magic-byte sniffing therefore takes precedence over the declared
//! content type; the header alone is only trusted in the PDF direction.

use crate::pipeline::request::RawResponse;
use serde_json::Value;

/// PDF file magic.
pub const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Longest snippet of an unparseable body kept for diagnostics.
const SNIPPET_MAX_CHARS: usize = 400;

/// The classified response, ready for the next stage.
#[derive(Debug, Clone)]
pub enum ClassifiedResponse {
    /// The body is the document itself.
    Pdf(Vec<u8>),
    /// The body parsed as JSON; extraction decides what's inside.
    Structured(Value),
    /// Neither PDF nor JSON; carries the status and a bounded snippet for
    /// the failure ledger.
    Unparseable { status: u16, snippet: String },
}

/// Whether a byte slice starts with the PDF magic.
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

/// Classify a raw response.
///
/// Order matters: sniff the body first, then the declared type, then try
/// JSON. A JSON body that *also* started with `%PDF` is impossible, so the
/// precedence only ever rescues mislabeled PDFs, never hides JSON.
pub fn classify(response: RawResponse) -> ClassifiedResponse {
    if looks_like_pdf(&response.body) || response.content_type.contains("application/pdf") {
        return ClassifiedResponse::Pdf(response.body);
    }

    match serde_json::from_slice::<Value>(&response.body) {
        Ok(tree) => ClassifiedResponse::Structured(tree),
        Err(_) => ClassifiedResponse::Unparseable {
            status: response.status,
            snippet: snippet_of(&response.body),
        },
    }
}

/// Lossy, char-boundary-safe prefix of the body for diagnostics.
fn snippet_of(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .chars()
        .take(SNIPPET_MAX_CHARS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(status: u16, content_type: &str, body: &[u8]) -> RawResponse {
        RawResponse {
            status,
            content_type: content_type.to_string(),
            body: body.to_vec(),
        }
    }

    #[test]
    fn declared_pdf_with_pdf_body_is_pdf() {
        let r = raw(200, "application/pdf", b"%PDF-1.4 rest of file");
        assert!(matches!(classify(r), ClassifiedResponse::Pdf(_)));
    }

    #[test]
    fn mislabeled_pdf_is_still_pdf() {
        // The service sometimes serves PDF bytes as text/html.
        let r = raw(200, "text/html; charset=utf-8", b"%PDF-1.7 binary...");
        assert!(matches!(classify(r), ClassifiedResponse::Pdf(_)));
    }

    #[test]
    fn declared_pdf_with_non_pdf_body_is_trusted() {
        let r = raw(200, "application/pdf", b"actually not a pdf");
        assert!(matches!(classify(r), ClassifiedResponse::Pdf(_)));
    }

    #[test]
    fn json_body_is_structured() {
        let r = raw(200, "application/json", br#"{"EC":{"statusCode":100}}"#);
        match classify(r) {
            ClassifiedResponse::Structured(tree) => {
                assert_eq!(tree["EC"]["statusCode"], 100);
            }
            other => panic!("expected Structured, got {other:?}"),
        }
    }

    #[test]
    fn html_error_page_is_unparseable_with_bounded_snippet() {
        let long_body = format!("<html>{}</html>", "x".repeat(2000));
        let r = raw(502, "text/html", long_body.as_bytes());
        match classify(r) {
            ClassifiedResponse::Unparseable { status, snippet } => {
                assert_eq!(status, 502);
                assert!(snippet.starts_with("<html>"));
                assert!(snippet.chars().count() <= 400);
            }
            other => panic!("expected Unparseable, got {other:?}"),
        }
    }

    #[test]
    fn snippet_respects_multibyte_boundaries() {
        let body = "நில அளவை எண் தவறு ".repeat(50);
        let r = raw(500, "text/plain", body.as_bytes());
        match classify(r) {
            ClassifiedResponse::Unparseable { snippet, .. } => {
                assert!(snippet.chars().count() <= 400);
                assert!(snippet.starts_with("நில"));
            }
            other => panic!("expected Unparseable, got {other:?}"),
        }
    }

    #[test]
    fn empty_body_is_unparseable() {
        let r = raw(204, "", b"");
        assert!(matches!(
            classify(r),
            ClassifiedResponse::Unparseable { status: 204, .. }
        ));
    }
}
