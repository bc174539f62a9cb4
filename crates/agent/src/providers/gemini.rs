use std::time::Duration;

use async_trait::async_trait;
use chatgate_core::config::ProviderEndpoint;
use chatgate_core::provider::{ProviderAdapter, ProviderError, ProviderKind};
use chatgate_core::request::RequestSettings;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{
    decode_response, endpoint_url, missing_text, request_timeout, resolve_credential,
    transport_error, MAX_OUTPUT_TOKENS, TEMPERATURE,
};

pub struct GeminiAdapter {
    client: Client,
    endpoint: ProviderEndpoint,
    default_timeout: Duration,
}

impl GeminiAdapter {
    pub fn new(client: Client, endpoint: ProviderEndpoint, default_timeout: Duration) -> Self {
        Self { client, endpoint, default_timeout }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn has_configured_credential(&self) -> bool {
        self.endpoint.configured_key().is_some()
    }

    #[instrument(skip_all, fields(provider = "gemini", model = %self.endpoint.model))]
    async fn generate(
        &self,
        prompt: &str,
        settings: &RequestSettings,
    ) -> Result<String, ProviderError> {
        let api_key = resolve_credential(ProviderKind::Gemini, &self.endpoint, settings)?;
        let timeout = request_timeout(settings, self.default_timeout);
        let path = format!("/v1beta/models/{}:generateContent", self.endpoint.model);
        let body = GenerateContentRequest {
            contents: [Content { parts: [Part { text: prompt }] }],
            generation_config: GenerationConfig {
                max_output_tokens: MAX_OUTPUT_TOKENS,
                temperature: TEMPERATURE,
            },
        };

        debug!(event_name = "chatgate.provider.request", "sending generateContent request");
        let response = self
            .client
            .post(endpoint_url(&self.endpoint, &path))
            .query(&[("key", api_key.as_str())])
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|error| transport_error(ProviderKind::Gemini, error, timeout))?;

        let status = response.status().as_u16();
        let parsed: GenerateContentResponse =
            decode_response(ProviderKind::Gemini, response, timeout).await?;

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .and_then(|content| content.parts.into_iter().next())
            .and_then(|part| part.text)
            .ok_or_else(|| missing_text(ProviderKind::Gemini, status))
    }
}
