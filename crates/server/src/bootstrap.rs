use std::sync::Arc;

use axum::Router;
use chatgate_agent::chain::ProviderChain;
use chatgate_agent::providers;
use chatgate_core::cache::ResponseCache;
use chatgate_core::config::{AppConfig, ConfigError};
use chatgate_core::rate_limit::RateLimiter;
use chatgate_core::usage::{TracingUsageSink, UsageRecorder};
use thiserror::Error;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::state::AppState;
use crate::{chatbot, health};

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
    /// Finishes once every handle on the chain is gone and the queue drained.
    pub usage_observer: JoinHandle<()>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("could not bind listener on `{address}`: {source}")]
    Bind { address: String, source: std::io::Error },
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let client = providers::http_client().map_err(BootstrapError::HttpClient)?;
    let adapters = providers::adapters(&client, &config.providers, config.chain.timeout());
    let cache = Arc::new(ResponseCache::new(config.cache.capacity()));
    let (usage, usage_observer) =
        UsageRecorder::spawn(Arc::new(TracingUsageSink), config.usage.queue_capacity);
    let chain = ProviderChain::new(adapters, cache, usage, config.chain);
    let limiter = RateLimiter::new(config.rate_limit.limiter_config());

    let configured = config.providers.configured();
    info!(
        event_name = "system.bootstrap.providers",
        correlation_id = "bootstrap",
        configured = ?configured,
        rate_limit = config.rate_limit.max_requests,
        window_secs = config.rate_limit.window_secs,
        "provider chain assembled"
    );

    let state = AppState::new(chain, limiter, config.server.trust_forwarded_for);
    Ok(Application { config, state, usage_observer })
}

/// Chat endpoint and health check behind one request trace layer.
pub fn router(state: AppState) -> Router {
    chatbot::router(state.clone()).merge(health::router(state)).layer(TraceLayer::new_for_http())
}
