use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::errors::GatewayError;
use crate::provider::ProviderKind;

pub const MAX_TIMEOUT_SECS: u64 = 300;
pub const MAX_CACHE_DURATION_MINUTES: u64 = 24 * 60;

/// Reads an explicit `null` the same way as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Locales the assistant answers in. Anything else resolves to [`Locale::De`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum Locale {
    #[default]
    De,
    Fr,
    It,
    En,
}

impl Locale {
    pub fn code(self) -> &'static str {
        match self {
            Self::De => "de",
            Self::Fr => "fr",
            Self::It => "it",
            Self::En => "en",
        }
    }

    /// Exact lookup; `None` for unsupported tags.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "de" => Some(Self::De),
            "fr" => Some(Self::Fr),
            "it" => Some(Self::It),
            "en" => Some(Self::En),
            _ => None,
        }
    }

    pub fn resolve(tag: &str) -> Self {
        Self::parse(tag).unwrap_or_default()
    }
}

impl From<String> for Locale {
    fn from(value: String) -> Self {
        Self::resolve(&value)
    }
}

/// Where the visitor is and what they did before asking.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(default)]
    pub current_page: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub previous_actions: Vec<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ProviderCredentials {
    #[serde(default, alias = "claude_api_key")]
    pub claude: Option<String>,
    #[serde(default, alias = "openai_api_key")]
    pub openai: Option<String>,
    #[serde(default, alias = "gemini_api_key")]
    pub gemini: Option<String>,
}

impl ProviderCredentials {
    pub fn for_provider(&self, kind: ProviderKind) -> Option<&str> {
        let value = match kind {
            ProviderKind::Claude => self.claude.as_deref(),
            ProviderKind::OpenAi => self.openai.as_deref(),
            ProviderKind::Gemini => self.gemini.as_deref(),
        };
        value.map(str::trim).filter(|key| !key.is_empty())
    }
}

/// Caller-supplied overrides. Absent fields fall back to the gateway's
/// configured chain defaults.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(from = "SettingsBody")]
pub struct RequestSettings {
    pub preferred_provider: Option<String>,
    pub fallback_enabled: Option<bool>,
    pub credentials: ProviderCredentials,
    pub timeout_seconds: Option<u64>,
    pub cache_duration_minutes: Option<u64>,
}

/// Wire shape of `settings`. Older clients put the API keys directly on
/// `settings` instead of under `credentials`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsBody {
    #[serde(default, alias = "ai_primary_provider")]
    preferred_provider: Option<String>,
    #[serde(default, alias = "ai_fallback_enabled")]
    fallback_enabled: Option<bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    credentials: ProviderCredentials,
    #[serde(default, alias = "api_timeout")]
    timeout_seconds: Option<u64>,
    #[serde(default, alias = "ai_cache_duration")]
    cache_duration_minutes: Option<u64>,
    #[serde(default, rename = "claude_api_key")]
    flat_claude: Option<String>,
    #[serde(default, rename = "openai_api_key")]
    flat_openai: Option<String>,
    #[serde(default, rename = "gemini_api_key")]
    flat_gemini: Option<String>,
}

impl From<SettingsBody> for RequestSettings {
    fn from(body: SettingsBody) -> Self {
        let ProviderCredentials { claude, openai, gemini } = body.credentials;
        Self {
            preferred_provider: body.preferred_provider,
            fallback_enabled: body.fallback_enabled,
            credentials: ProviderCredentials {
                claude: claude.or(body.flat_claude),
                openai: openai.or(body.flat_openai),
                gemini: gemini.or(body.flat_gemini),
            },
            timeout_seconds: body.timeout_seconds,
            cache_duration_minutes: body.cache_duration_minutes,
        }
    }
}

impl RequestSettings {
    /// Unknown provider names are ignored rather than rejected.
    pub fn preferred(&self) -> Option<ProviderKind> {
        self.preferred_provider.as_deref().and_then(|name| name.parse().ok())
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct AssistRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub context: Option<RequestContext>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub language: Locale,
    #[serde(default, deserialize_with = "null_as_default")]
    pub settings: RequestSettings,
}

impl AssistRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            language: Locale::default(),
            settings: RequestSettings::default(),
        }
    }

    pub fn with_language(mut self, language: Locale) -> Self {
        self.language = language;
        self
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_settings(mut self, settings: RequestSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.message.trim().is_empty() {
            return Err(GatewayError::Validation("Message is required".to_string()));
        }

        if let Some(timeout) = self.settings.timeout_seconds {
            if timeout == 0 || timeout > MAX_TIMEOUT_SECS {
                return Err(GatewayError::Validation(format!(
                    "settings.timeoutSeconds must be in range 1..={MAX_TIMEOUT_SECS}"
                )));
            }
        }

        if let Some(minutes) = self.settings.cache_duration_minutes {
            if minutes == 0 || minutes > MAX_CACHE_DURATION_MINUTES {
                return Err(GatewayError::Validation(format!(
                    "settings.cacheDurationMinutes must be in range 1..={MAX_CACHE_DURATION_MINUTES}"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{AssistRequest, Locale, RequestSettings};
    use crate::errors::GatewayError;
    use crate::provider::ProviderKind;

    #[test]
    fn body_uses_documented_defaults() {
        let request: AssistRequest =
            serde_json::from_value(json!({ "message": "Welches Bike für Pendler?" }))
                .expect("minimal body should parse");

        assert_eq!(request.language, Locale::De);
        assert!(request.context.is_none());
        assert!(request.settings.fallback_enabled.is_none());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn unknown_language_resolves_to_default_locale() {
        let request: AssistRequest =
            serde_json::from_value(json!({ "message": "hola", "language": "es" }))
                .expect("unknown language should still parse");

        assert_eq!(request.language, Locale::De);
    }

    #[test]
    fn legacy_setting_names_are_accepted() {
        let request: AssistRequest = serde_json::from_value(json!({
            "message": "hi",
            "language": "en",
            "settings": {
                "ai_primary_provider": "gemini",
                "ai_fallback_enabled": false,
                "api_timeout": 12,
                "ai_cache_duration": 5,
                "credentials": { "openai_api_key": "sk-test" },
                "claude_api_key": "sk-ant-flat"
            }
        }))
        .expect("legacy body should parse");

        assert_eq!(request.language, Locale::En);
        assert_eq!(request.settings.preferred(), Some(ProviderKind::Gemini));
        assert_eq!(request.settings.fallback_enabled, Some(false));
        assert_eq!(request.settings.timeout_seconds, Some(12));
        assert_eq!(request.settings.cache_duration_minutes, Some(5));
        assert_eq!(request.settings.credentials.for_provider(ProviderKind::OpenAi), Some("sk-test"));
        assert_eq!(
            request.settings.credentials.for_provider(ProviderKind::Claude),
            Some("sk-ant-flat")
        );
    }

    #[test]
    fn nested_credentials_win_over_flat_legacy_keys() {
        let request: AssistRequest = serde_json::from_value(json!({
            "message": "hi",
            "settings": {
                "gemini_api_key": "flat",
                "credentials": { "gemini": "nested" }
            }
        }))
        .expect("mixed body should parse");

        assert_eq!(request.settings.credentials.for_provider(ProviderKind::Gemini), Some("nested"));
    }

    #[test]
    fn null_optionals_read_as_absent() {
        let request: AssistRequest = serde_json::from_value(json!({
            "message": "hi",
            "language": null,
            "settings": null,
            "context": { "currentPage": null, "previousActions": null }
        }))
        .expect("nulls should parse");

        assert_eq!(request.language, Locale::De);
        assert_eq!(request.settings, RequestSettings::default());
        let context = request.context.expect("context present");
        assert!(context.previous_actions.is_empty());

        let settings: AssistRequest = serde_json::from_value(json!({
            "message": "hi",
            "settings": { "credentials": null, "timeoutSeconds": null }
        }))
        .expect("null settings fields should parse");
        assert_eq!(settings.settings, RequestSettings::default());
    }

    #[test]
    fn context_fields_are_camel_case() {
        let request: AssistRequest = serde_json::from_value(json!({
            "message": "hi",
            "context": { "currentPage": "/products/alpine", "previousActions": [{"type": "view"}] }
        }))
        .expect("context should parse");

        let context = request.context.expect("context present");
        assert_eq!(context.current_page.as_deref(), Some("/products/alpine"));
        assert_eq!(context.previous_actions.len(), 1);
    }

    #[test]
    fn whitespace_message_is_rejected() {
        let error = AssistRequest::new("   \n\t").validate().expect_err("blank message");
        assert!(matches!(error, GatewayError::Validation(ref message) if message == "Message is required"));
    }

    #[test]
    fn out_of_range_timeout_is_rejected() {
        let mut request = AssistRequest::new("hi");
        request.settings.timeout_seconds = Some(0);
        assert!(request.validate().is_err());

        request.settings.timeout_seconds = Some(301);
        assert!(request.validate().is_err());

        request.settings.timeout_seconds = Some(300);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn blank_credentials_count_as_missing() {
        let mut request = AssistRequest::new("hi");
        request.settings.credentials.claude = Some("   ".to_string());
        assert_eq!(request.settings.credentials.for_provider(ProviderKind::Claude), None);
    }

    #[test]
    fn unknown_preferred_provider_is_ignored() {
        let mut request = AssistRequest::new("hi");
        request.settings.preferred_provider = Some("mistral".to_string());
        assert_eq!(request.settings.preferred(), None);
    }
}
