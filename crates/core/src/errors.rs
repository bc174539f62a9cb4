use thiserror::Error;

use crate::fallback;
use crate::provider::{ProviderError, ProviderKind};
use crate::request::Locale;

/// One failed adapter attempt inside a chain run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttemptFailure {
    pub provider: ProviderKind,
    pub error: ProviderError,
}

/// Every attempted provider failed, or the only permitted attempt did.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("all AI providers are currently unavailable ({} attempted)", .attempts.len())]
pub struct ChainExhausted {
    pub attempts: Vec<AttemptFailure>,
    pub locale: Locale,
}

impl ChainExhausted {
    pub fn last_error(&self) -> Option<&ProviderError> {
        self.attempts.last().map(|attempt| &attempt.error)
    }

    pub fn last_error_message(&self) -> String {
        self.last_error().map(ToString::to_string).unwrap_or_else(|| "Unknown error".to_string())
    }

    pub fn fallback_text(&self) -> &'static str {
        fallback::text(self.locale)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error(transparent)]
    ChainExhausted(#[from] ChainExhausted),
    #[error("internal failure: {message}")]
    Internal { message: String, locale: Locale },
}

impl GatewayError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::RateLimited { .. } => 429,
            Self::ChainExhausted(_) => 503,
            Self::Internal { .. } => 500,
        }
    }

    /// Client-safe message. Internal detail never leaves the process.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::RateLimited { .. } => "Rate limit exceeded".to_string(),
            Self::ChainExhausted(_) => "All AI providers are currently unavailable".to_string(),
            Self::Internal { .. } => "Internal server error".to_string(),
        }
    }

    pub fn fallback_text(&self) -> Option<&'static str> {
        match self {
            Self::ChainExhausted(exhausted) => Some(exhausted.fallback_text()),
            Self::Internal { locale, .. } => Some(fallback::text(*locale)),
            Self::Validation(_) | Self::RateLimited { .. } => None,
        }
    }
}
