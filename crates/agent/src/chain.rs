//! Sequential provider failover.
//!
//! Providers are tried one at a time in resolved order. A live cache entry
//! for the current provider short-circuits its adapter call. Each provider
//! gets at most one attempt per request, and with fallback disabled only the
//! first attempted provider runs.

use std::sync::Arc;
use std::time::Duration;

use chatgate_core::cache::{cache_key, ResponseCache};
use chatgate_core::config::ChainConfig;
use chatgate_core::errors::{AttemptFailure, ChainExhausted};
use chatgate_core::provider::{
    resolve_order, ProviderAdapter, ProviderError, ProviderKind, CANONICAL_ORDER,
};
use chatgate_core::request::AssistRequest;
use chatgate_core::usage::{UsageLogEntry, UsageRecorder};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::prompt::build_prompt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainSuccess {
    pub provider: ProviderKind,
    pub text: String,
    pub cached: bool,
    /// Time from the start of the chain run to the answer.
    pub elapsed: Duration,
}

pub struct ProviderChain {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    cache: Arc<ResponseCache>,
    usage: UsageRecorder,
    defaults: ChainConfig,
}

impl ProviderChain {
    pub fn new(
        adapters: Vec<Arc<dyn ProviderAdapter>>,
        cache: Arc<ResponseCache>,
        usage: UsageRecorder,
        defaults: ChainConfig,
    ) -> Self {
        Self { adapters, cache, usage, defaults }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Providers holding a server-side key, in canonical order.
    pub fn configured_providers(&self) -> Vec<ProviderKind> {
        self.canonical_order()
            .into_iter()
            .filter(|kind| self.adapter(*kind).is_some_and(|a| a.has_configured_credential()))
            .collect()
    }

    fn canonical_order(&self) -> Vec<ProviderKind> {
        CANONICAL_ORDER.into_iter().filter(|kind| self.adapter(*kind).is_some()).collect()
    }

    fn adapter(&self, kind: ProviderKind) -> Option<&Arc<dyn ProviderAdapter>> {
        self.adapters.iter().find(|adapter| adapter.kind() == kind)
    }

    /// Runs the chain for an already validated request.
    pub async fn respond(&self, request: &AssistRequest) -> Result<ChainSuccess, ChainExhausted> {
        let started = Instant::now();
        let settings = &request.settings;
        let order = resolve_order(&self.canonical_order(), settings.preferred());
        let fallback_enabled = settings.fallback_enabled.unwrap_or(self.defaults.fallback_enabled);
        let timeout =
            settings.timeout_seconds.map(Duration::from_secs).unwrap_or(self.defaults.timeout());
        let ttl_minutes =
            settings.cache_duration_minutes.unwrap_or(self.defaults.cache_duration_minutes);
        let prompt = build_prompt(&request.message, request.context.as_ref(), request.language);

        let mut attempts = Vec::new();
        for kind in order {
            let Some(adapter) = self.adapter(kind) else { continue };
            let key = cache_key(kind, request.language, &request.message, request.context.as_ref());

            if let Some(text) = self.cache.get(&key) {
                debug!(event_name = "chatgate.chain.cache_hit", provider = %kind, "served from cache");
                return Ok(ChainSuccess {
                    provider: kind,
                    text,
                    cached: true,
                    elapsed: started.elapsed(),
                });
            }

            let attempt_started = Instant::now();
            let call = adapter.generate(&prompt, settings);
            let outcome = match tokio::time::timeout(timeout, call).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ProviderError::Timeout { provider: kind, after: timeout }),
            };
            let attempt_elapsed = attempt_started.elapsed();

            match outcome {
                Ok(text) => {
                    self.cache.put(key, text.clone(), ttl_minutes);
                    self.usage.record(UsageLogEntry::success(kind, attempt_elapsed));
                    info!(
                        event_name = "chatgate.chain.answered",
                        provider = %kind,
                        attempt_ms = attempt_elapsed.as_millis() as u64,
                        failed_before = attempts.len(),
                        "provider answered"
                    );
                    return Ok(ChainSuccess {
                        provider: kind,
                        text,
                        cached: false,
                        elapsed: started.elapsed(),
                    });
                }
                Err(error) => {
                    warn!(
                        event_name = "chatgate.chain.attempt_failed",
                        provider = %kind,
                        attempt_ms = attempt_elapsed.as_millis() as u64,
                        error = %error,
                        "provider attempt failed"
                    );
                    self.usage.record(UsageLogEntry::failure(
                        kind,
                        attempt_elapsed,
                        error.to_string(),
                    ));
                    attempts.push(AttemptFailure { provider: kind, error });
                    if !fallback_enabled {
                        break;
                    }
                }
            }
        }

        warn!(
            event_name = "chatgate.chain.exhausted",
            attempted = attempts.len(),
            fallback_enabled,
            "no provider could answer"
        );
        Err(ChainExhausted { attempts, locale: request.language })
    }
}
