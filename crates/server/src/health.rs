use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chatgate_core::provider::{ProviderKind, CANONICAL_ORDER};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProviderCheck {
    pub provider: ProviderKind,
    pub configured: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub ready: bool,
    pub providers: Vec<ProviderCheck>,
    pub cache_entries: usize,
    pub tracked_clients: usize,
    pub checked_at: String,
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

/// Always 200: without server-side keys the gateway still answers, with
/// fallback text or with keys supplied per request.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let configured = state.chain.configured_providers();
    let ready = !configured.is_empty();

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        ready,
        providers: CANONICAL_ORDER
            .into_iter()
            .map(|provider| ProviderCheck { provider, configured: configured.contains(&provider) })
            .collect(),
        cache_entries: state.chain.cache().len(),
        tracked_clients: state.limiter.tracked_clients(),
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{extract::State, http::StatusCode, Json};
    use chatgate_agent::chain::ProviderChain;
    use chatgate_core::cache::ResponseCache;
    use chatgate_core::config::ChainConfig;
    use chatgate_core::provider::{ProviderAdapter, ProviderError, ProviderKind};
    use chatgate_core::rate_limit::RateLimiter;
    use chatgate_core::request::RequestSettings;
    use chatgate_core::usage::UsageRecorder;

    use crate::health::health;
    use crate::state::AppState;

    struct KeyedAdapter(ProviderKind, bool);

    #[async_trait]
    impl ProviderAdapter for KeyedAdapter {
        fn kind(&self) -> ProviderKind {
            self.0
        }

        fn has_configured_credential(&self) -> bool {
            self.1
        }

        async fn generate(
            &self,
            _prompt: &str,
            _settings: &RequestSettings,
        ) -> Result<String, ProviderError> {
            Err(ProviderError::CredentialMissing { provider: self.0 })
        }
    }

    fn state(keys: [bool; 3]) -> AppState {
        let adapters: Vec<Arc<dyn ProviderAdapter>> = vec![
            Arc::new(KeyedAdapter(ProviderKind::Claude, keys[0])),
            Arc::new(KeyedAdapter(ProviderKind::OpenAi, keys[1])),
            Arc::new(KeyedAdapter(ProviderKind::Gemini, keys[2])),
        ];
        let chain = ProviderChain::new(
            adapters,
            Arc::new(ResponseCache::new(NonZeroUsize::new(4).expect("non-zero"))),
            UsageRecorder::disabled(),
            ChainConfig { timeout_secs: 30, cache_duration_minutes: 60, fallback_enabled: true },
        );
        AppState::new(chain, RateLimiter::default(), true)
    }

    #[tokio::test]
    async fn health_reports_configured_providers_and_counters() {
        let state = state([false, true, false]);
        state.limiter.admit("203.0.113.1");
        state.chain.cache().put("ai:openai:de:0000000000000000", "Hallo", 60);

        let (status, Json(payload)) = health(State(state)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert!(payload.ready);
        assert_eq!(payload.providers.len(), 3);
        assert!(payload.providers[1].configured);
        assert!(!payload.providers[0].configured);
        assert_eq!(payload.cache_entries, 1);
        assert_eq!(payload.tracked_clients, 1);
    }

    #[tokio::test]
    async fn health_is_degraded_without_any_server_key() {
        let (status, Json(payload)) = health(State(state([false, false, false]))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "degraded");
        assert!(!payload.ready);
    }
}
