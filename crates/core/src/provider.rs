use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::request::RequestSettings;

/// The closed set of text-generation vendors the chain knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Claude,
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
}

pub const CANONICAL_ORDER: [ProviderKind; 3] =
    [ProviderKind::Claude, ProviderKind::OpenAi, ProviderKind::Gemini];

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Claude => "Claude",
            Self::OpenAi => "OpenAI",
            Self::Gemini => "Gemini",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "claude" | "anthropic" => Ok(Self::Claude),
            "openai" => Ok(Self::OpenAi),
            "gemini" | "google" => Ok(Self::Gemini),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unsupported provider `{0}` (expected claude|openai|gemini)")]
pub struct UnknownProvider(pub String);

/// Moves `preferred` to the front of `canonical`, keeping the relative order
/// of the rest. A preference outside `canonical` leaves the order untouched.
pub fn resolve_order(
    canonical: &[ProviderKind],
    preferred: Option<ProviderKind>,
) -> Vec<ProviderKind> {
    match preferred {
        Some(first) if canonical.contains(&first) => std::iter::once(first)
            .chain(canonical.iter().copied().filter(|kind| *kind != first))
            .collect(),
        _ => canonical.to_vec(),
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{} API key not configured", .provider.display_name())]
    CredentialMissing { provider: ProviderKind },
    #[error("{} API error: {}", .provider.display_name(), upstream_detail(.status, .message))]
    Upstream { provider: ProviderKind, status: Option<u16>, message: String },
    #[error("{} request timed out after {}s", .provider.display_name(), .after.as_secs())]
    Timeout { provider: ProviderKind, after: Duration },
}

fn upstream_detail(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("{status} {message}"),
        None => message.to_string(),
    }
}

impl ProviderError {
    pub fn provider(&self) -> ProviderKind {
        match self {
            Self::CredentialMissing { provider }
            | Self::Upstream { provider, .. }
            | Self::Timeout { provider, .. } => *provider,
        }
    }

    pub fn upstream(provider: ProviderKind, status: u16, message: impl Into<String>) -> Self {
        Self::Upstream { provider, status: Some(status), message: message.into() }
    }
}

/// One vendor behind the canonical "prompt in, text out" capability.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Whether a server-side credential is configured, independent of any
    /// per-request override.
    fn has_configured_credential(&self) -> bool;

    async fn generate(&self, prompt: &str, settings: &RequestSettings)
        -> Result<String, ProviderError>;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{resolve_order, ProviderError, ProviderKind, CANONICAL_ORDER};

    #[test]
    fn no_preference_keeps_canonical_order() {
        assert_eq!(resolve_order(&CANONICAL_ORDER, None), CANONICAL_ORDER.to_vec());
    }

    #[test]
    fn preferred_provider_moves_to_front_preserving_the_rest() {
        assert_eq!(
            resolve_order(&CANONICAL_ORDER, Some(ProviderKind::OpenAi)),
            vec![ProviderKind::OpenAi, ProviderKind::Claude, ProviderKind::Gemini]
        );
        assert_eq!(
            resolve_order(&CANONICAL_ORDER, Some(ProviderKind::Gemini)),
            vec![ProviderKind::Gemini, ProviderKind::Claude, ProviderKind::OpenAi]
        );
        assert_eq!(resolve_order(&CANONICAL_ORDER, Some(ProviderKind::Claude)), CANONICAL_ORDER);
    }

    #[test]
    fn preference_outside_the_chain_is_ignored() {
        let partial = [ProviderKind::Claude, ProviderKind::OpenAi];
        assert_eq!(resolve_order(&partial, Some(ProviderKind::Gemini)), partial.to_vec());
    }

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!(" OpenAI ".parse::<ProviderKind>(), Ok(ProviderKind::OpenAi));
        assert_eq!("anthropic".parse::<ProviderKind>(), Ok(ProviderKind::Claude));
        assert!("mistral".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn error_messages_name_the_provider() {
        let missing = ProviderError::CredentialMissing { provider: ProviderKind::Claude };
        assert_eq!(missing.to_string(), "Claude API key not configured");

        let upstream = ProviderError::upstream(ProviderKind::OpenAi, 429, "Rate limit reached");
        assert_eq!(upstream.to_string(), "OpenAI API error: 429 Rate limit reached");

        let timeout = ProviderError::Timeout {
            provider: ProviderKind::Gemini,
            after: Duration::from_secs(30),
        };
        assert_eq!(timeout.to_string(), "Gemini request timed out after 30s");
        assert_eq!(timeout.provider(), ProviderKind::Gemini);
    }
}
