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
    transport_error, MAX_OUTPUT_TOKENS,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct ClaudeAdapter {
    client: Client,
    endpoint: ProviderEndpoint,
    default_timeout: Duration,
}

impl ClaudeAdapter {
    pub fn new(client: Client, endpoint: ProviderEndpoint, default_timeout: Duration) -> Self {
        Self { client, endpoint, default_timeout }
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    text: Option<String>,
}

#[async_trait]
impl ProviderAdapter for ClaudeAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Claude
    }

    fn has_configured_credential(&self) -> bool {
        self.endpoint.configured_key().is_some()
    }

    #[instrument(skip_all, fields(provider = "claude", model = %self.endpoint.model))]
    async fn generate(
        &self,
        prompt: &str,
        settings: &RequestSettings,
    ) -> Result<String, ProviderError> {
        let api_key = resolve_credential(ProviderKind::Claude, &self.endpoint, settings)?;
        let timeout = request_timeout(settings, self.default_timeout);
        let body = MessagesRequest {
            model: &self.endpoint.model,
            max_tokens: MAX_OUTPUT_TOKENS,
            messages: [Message { role: "user", content: prompt }],
        };

        debug!(event_name = "chatgate.provider.request", "sending messages request");
        let response = self
            .client
            .post(endpoint_url(&self.endpoint, "/v1/messages"))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|error| transport_error(ProviderKind::Claude, error, timeout))?;

        let status = response.status().as_u16();
        let parsed: MessagesResponse =
            decode_response(ProviderKind::Claude, response, timeout).await?;

        parsed
            .content
            .into_iter()
            .filter(|block| block.kind.is_empty() || block.kind == "text")
            .find_map(|block| block.text)
            .ok_or_else(|| missing_text(ProviderKind::Claude, status))
    }
}
