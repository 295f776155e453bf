//! Request execution: one POST per lookup key, no interpretation.
//!
//! The executor owns the HTTP client and the pre-validated header sets, so
//! header problems surface once at construction instead of on every key.
//! It never retries and never looks inside the body — classification and
//! extraction are separate stages, and retrying is exclusively the batch
//! orchestrator's job (an inner retry loop here would double-pace the
//! already fragile service).

use crate::config::FetchConfig;
use crate::error::{EcFetchError, FetchFailure};
use crate::key::LookupKey;
use crate::session::SessionContext;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Wire shape of the certificate request body.
///
/// Field names are the service's, verbatim — it rejects anything else.
#[derive(Debug, Serialize)]
struct CertificateRequest<'a> {
    #[serde(rename = "revDistrictCode")]
    district_code: &'a str,
    #[serde(rename = "revTalukCode")]
    taluk_code: &'a str,
    #[serde(rename = "revVillageCode")]
    village_code: &'a str,
    survey_number: &'a str,
    sub_division_number: &'a str,
}

impl<'a> CertificateRequest<'a> {
    fn from_key(key: &'a LookupKey) -> Self {
        Self {
            district_code: &key.district_code,
            taluk_code: &key.taluk_code,
            village_code: &key.village_code,
            survey_number: &key.survey_number,
            sub_division_number: &key.sub_division,
        }
    }
}

/// One raw response: status, declared content type, body bytes.
///
/// Produced once per request and never mutated; every downstream stage
/// works from this value.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Whether the status is in the 2xx range.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues requests on behalf of the pipeline.
///
/// Holds the client (with the caller-configured timeout) and the session's
/// header sets. Cheap to share by reference across a whole run.
pub struct RequestExecutor {
    client: Client,
    api_url: String,
    post_headers: HeaderMap,
    get_headers: HeaderMap,
}

impl RequestExecutor {
    /// Build an executor from an immutable session context.
    ///
    /// Fails fast on unencodable header values or client construction
    /// trouble — both are configuration problems, not per-key ones.
    pub fn new(session: &SessionContext, config: &FetchConfig) -> Result<Self, EcFetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| EcFetchError::HttpClient {
                detail: e.to_string(),
            })?;
        Ok(Self {
            client,
            api_url: session.api_url.clone(),
            post_headers: session.post_headers()?,
            get_headers: session.get_headers()?,
        })
    }

    /// Issue the certificate POST for one key.
    ///
    /// Network-level trouble (timeout, connection reset, DNS) comes back as
    /// a typed [`FetchFailure::Network`]; the caller decides whether that
    /// is ledger-worthy. Non-2xx responses are *not* errors here — the
    /// service reports some failures as 200 JSON and some data as 500, so
    /// the classifier sees everything.
    pub async fn execute(&self, key: &LookupKey) -> Result<RawResponse, FetchFailure> {
        debug!("requesting certificate for {}", key);
        let response = self
            .client
            .post(&self.api_url)
            .headers(self.post_headers.clone())
            .json(&CertificateRequest::from_key(key))
            .send()
            .await
            .map_err(network_failure)?;
        into_raw(response).await
    }

    /// Issue the secondary GET for a document URL found inside a response.
    pub async fn fetch_secondary(&self, url: &str) -> Result<RawResponse, FetchFailure> {
        debug!("fetching secondary document url {url}");
        let response = self
            .client
            .get(url)
            .headers(self.get_headers.clone())
            .send()
            .await
            .map_err(network_failure)?;
        into_raw(response).await
    }
}

fn network_failure(e: reqwest::Error) -> FetchFailure {
    let detail = if e.is_timeout() {
        format!("timed out: {e}")
    } else {
        e.to_string()
    };
    FetchFailure::Network { detail }
}

async fn into_raw(response: reqwest::Response) -> Result<RawResponse, FetchFailure> {
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let body = response
        .bytes()
        .await
        .map_err(network_failure)?
        .to_vec();
    Ok(RawResponse {
        status,
        content_type,
        body,
    })
}
