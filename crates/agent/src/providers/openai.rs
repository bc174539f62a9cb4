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

/// Chat models need the persona as a system turn as well as in the prompt.
pub const SYSTEM_PREAMBLE: &str = "You are a Swiss e-bike expert helping customers at Godspeed, \
                                   a premium e-bike retailer in Switzerland.";

pub struct OpenAiAdapter {
    client: Client,
    endpoint: ProviderEndpoint,
    default_timeout: Duration,
}

impl OpenAiAdapter {
    pub fn new(client: Client, endpoint: ProviderEndpoint, default_timeout: Duration) -> Self {
        Self { client, endpoint, default_timeout }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<AssistantMessage>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn has_configured_credential(&self) -> bool {
        self.endpoint.configured_key().is_some()
    }

    #[instrument(skip_all, fields(provider = "openai", model = %self.endpoint.model))]
    async fn generate(
        &self,
        prompt: &str,
        settings: &RequestSettings,
    ) -> Result<String, ProviderError> {
        let api_key = resolve_credential(ProviderKind::OpenAi, &self.endpoint, settings)?;
        let timeout = request_timeout(settings, self.default_timeout);
        let body = ChatCompletionRequest {
            model: &self.endpoint.model,
            messages: [
                ChatMessage { role: "system", content: SYSTEM_PREAMBLE },
                ChatMessage { role: "user", content: prompt },
            ],
            max_tokens: MAX_OUTPUT_TOKENS,
            temperature: TEMPERATURE,
        };

        debug!(event_name = "chatgate.provider.request", "sending chat completion request");
        let response = self
            .client
            .post(endpoint_url(&self.endpoint, "/v1/chat/completions"))
            .bearer_auth(api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|error| transport_error(ProviderKind::OpenAi, error, timeout))?;

        let status = response.status().as_u16();
        let parsed: ChatCompletionResponse =
            decode_response(ProviderKind::OpenAi, response, timeout).await?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .ok_or_else(|| missing_text(ProviderKind::OpenAi, status))
    }
}
