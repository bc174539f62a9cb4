//! Vendor adapters behind [`ProviderAdapter`].
//!
//! Each adapter owns one vendor envelope. Status mapping, vendor error
//! extraction and credential lookup are shared here so that the three
//! adapters only differ in request shape and response nesting.

use std::sync::Arc;
use std::time::Duration;

use chatgate_core::config::{ProviderEndpoint, ProvidersConfig};
use chatgate_core::provider::{ProviderAdapter, ProviderError, ProviderKind};
use chatgate_core::request::RequestSettings;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

pub mod claude;
pub mod gemini;
pub mod openai;

pub use claude::ClaudeAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;

pub(crate) const MAX_OUTPUT_TOKENS: u32 = 1000;
pub(crate) const TEMPERATURE: f64 = 0.7;

const USER_AGENT: &str = concat!("chatgate/", env!("CARGO_PKG_VERSION"));

/// One pooled client shared by every adapter.
pub fn http_client() -> Result<Client, reqwest::Error> {
    Client::builder().user_agent(USER_AGENT).build()
}

/// All three adapters in canonical order, whether or not a key is configured.
pub fn adapters(
    client: &Client,
    providers: &ProvidersConfig,
    default_timeout: Duration,
) -> Vec<Arc<dyn ProviderAdapter>> {
    vec![
        Arc::new(ClaudeAdapter::new(client.clone(), providers.claude.clone(), default_timeout)),
        Arc::new(OpenAiAdapter::new(client.clone(), providers.openai.clone(), default_timeout)),
        Arc::new(GeminiAdapter::new(client.clone(), providers.gemini.clone(), default_timeout)),
    ]
}

/// Server configuration wins; the request's own credentials are the fallback.
pub(crate) fn resolve_credential(
    kind: ProviderKind,
    endpoint: &ProviderEndpoint,
    settings: &RequestSettings,
) -> Result<String, ProviderError> {
    endpoint
        .configured_key()
        .or_else(|| settings.credentials.for_provider(kind))
        .map(str::to_string)
        .ok_or(ProviderError::CredentialMissing { provider: kind })
}

pub(crate) fn request_timeout(settings: &RequestSettings, default_timeout: Duration) -> Duration {
    settings.timeout_seconds.map(Duration::from_secs).unwrap_or(default_timeout)
}

pub(crate) fn endpoint_url(endpoint: &ProviderEndpoint, path: &str) -> String {
    format!("{}{path}", endpoint.base_url.trim_end_matches('/'))
}

pub(crate) fn transport_error(
    kind: ProviderKind,
    error: reqwest::Error,
    timeout: Duration,
) -> ProviderError {
    if error.is_timeout() {
        return ProviderError::Timeout { provider: kind, after: timeout };
    }
    // The Gemini key travels in the query string.
    let error = error.without_url();
    ProviderError::Upstream { provider: kind, status: None, message: error.to_string() }
}

#[derive(Debug, Deserialize)]
struct VendorErrorBody {
    error: Option<VendorError>,
}

#[derive(Debug, Deserialize)]
struct VendorError {
    message: Option<String>,
}

/// Maps a non-2xx to `Upstream` and decodes a 2xx body into `T`.
pub(crate) async fn decode_response<T: DeserializeOwned>(
    kind: ProviderKind,
    response: Response,
    timeout: Duration,
) -> Result<T, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::upstream(kind, status.as_u16(), vendor_message(status, &body)));
    }

    response.json::<T>().await.map_err(|error| {
        if error.is_timeout() {
            return ProviderError::Timeout { provider: kind, after: timeout };
        }
        ProviderError::upstream(kind, status.as_u16(), format!("malformed response body: {error}"))
    })
}

fn vendor_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<VendorErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error)
        .and_then(|error| error.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("upstream error").to_string())
}

pub(crate) fn missing_text(kind: ProviderKind, status: u16) -> ProviderError {
    ProviderError::upstream(kind, status, "response contained no generated text")
}
