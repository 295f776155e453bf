//! Session context: the credential and endpoint material every request needs.
//!
//! ## Why an explicit value instead of module-level constants?
//!
//! The session cookie is acquired *outside* this library (copied from a
//! browser's DevTools, or produced by whatever login automation the caller
//! runs) and it expires. Making the context an immutable value constructed
//! once at startup keeps that lifecycle visible: there is no implicit
//! refresh, and when the cookie goes stale the caller sees auth-shaped
//! failures and knows to construct a fresh context. Hardcoded globals would
//! hide exactly the failure mode that matters most in practice.

use crate::error::EcFetchError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Production endpoint of the certificate service.
pub const DEFAULT_API_URL: &str =
    "https://tngis.tn.gov.in/apps/gi_viewer_api/api/encumbrance_certificate";
/// Referer the service checks requests against.
pub const DEFAULT_REFERER: &str = "https://tngis.tn.gov.in/apps/gi_viewer/";
/// Origin the service checks requests against.
pub const DEFAULT_ORIGIN: &str = "https://tngis.tn.gov.in";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";
const ACCEPT: &str = "application/json, text/javascript, */*; q=0.01";

/// Immutable per-run session context.
///
/// Constructed once, injected into the request executor, never mutated.
/// The `app_name` header is a service-side routing quirk: requests without
/// it are rejected even with a valid cookie.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub api_url: String,
    pub origin: String,
    pub referer: String,
    pub user_agent: String,
    pub app_name: String,
    pub cookie: String,
}

impl SessionContext {
    /// Context against the production endpoint with the given auth cookie.
    pub fn new(cookie: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            app_name: "demo".to_string(),
            cookie: cookie.into(),
        }
    }

    /// Override the endpoint (staging environments, mock servers in tests).
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Override the `x-app-name` header value.
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// Full header set for the certificate POST.
    ///
    /// Fails only when a field cannot be encoded as an HTTP header value
    /// (embedded newlines and the like) — callers treat that as fatal
    /// configuration trouble, not a per-key failure.
    pub(crate) fn post_headers(&self) -> Result<HeaderMap, EcFetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::USER_AGENT, value(&self.user_agent)?);
        headers.insert(reqwest::header::ACCEPT, value(ACCEPT)?);
        headers.insert(reqwest::header::CONTENT_TYPE, value("application/json")?);
        headers.insert(reqwest::header::ORIGIN, value(&self.origin)?);
        headers.insert(reqwest::header::REFERER, value(&self.referer)?);
        headers.insert(
            HeaderName::from_static("x-requested-with"),
            value("XMLHttpRequest")?,
        );
        headers.insert(HeaderName::from_static("x-app-name"), value(&self.app_name)?);
        headers.insert(reqwest::header::COOKIE, value(&self.cookie)?);
        Ok(headers)
    }

    /// Reduced header set for the secondary document GET.
    ///
    /// Only referer and user-agent — the secondary URL is a plain file
    /// endpoint that chokes on the full AJAX header set.
    pub(crate) fn get_headers(&self) -> Result<HeaderMap, EcFetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::USER_AGENT, value(&self.user_agent)?);
        headers.insert(reqwest::header::REFERER, value(&self.referer)?);
        Ok(headers)
    }
}

fn value(raw: &str) -> Result<HeaderValue, EcFetchError> {
    HeaderValue::from_str(raw).map_err(|e| EcFetchError::InvalidSession {
        detail: format!("header value {raw:?}: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_headers_carry_the_full_ajax_set() {
        let session = SessionContext::new("PHPSESSID=abc123");
        let headers = session.post_headers().unwrap();
        assert_eq!(headers[reqwest::header::COOKIE], "PHPSESSID=abc123");
        assert_eq!(headers["x-app-name"], "demo");
        assert_eq!(headers["x-requested-with"], "XMLHttpRequest");
        assert_eq!(headers[reqwest::header::ORIGIN], DEFAULT_ORIGIN);
    }

    #[test]
    fn get_headers_omit_the_cookie() {
        let session = SessionContext::new("PHPSESSID=abc123");
        let headers = session.get_headers().unwrap();
        assert!(headers.get(reqwest::header::COOKIE).is_none());
        assert_eq!(headers[reqwest::header::REFERER], DEFAULT_REFERER);
    }

    #[test]
    fn newline_in_cookie_is_rejected() {
        let session = SessionContext::new("bad\ncookie");
        assert!(matches!(
            session.post_headers(),
            Err(EcFetchError::InvalidSession { .. })
        ));
    }

    #[test]
    fn overrides_apply() {
        let session = SessionContext::new("c")
            .with_api_url("http://127.0.0.1:9999/api")
            .with_app_name("gi_viewer");
        assert_eq!(session.api_url, "http://127.0.0.1:9999/api");
        assert_eq!(session.app_name, "gi_viewer");
    }
}
