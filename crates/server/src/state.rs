use std::sync::Arc;

use chatgate_agent::chain::ProviderChain;
use chatgate_core::rate_limit::RateLimiter;

/// Shared by every handler. Owned by the running server, never global.
#[derive(Clone)]
pub struct AppState {
    pub chain: Arc<ProviderChain>,
    pub limiter: Arc<RateLimiter>,
    pub trust_forwarded_for: bool,
}

impl AppState {
    pub fn new(chain: ProviderChain, limiter: RateLimiter, trust_forwarded_for: bool) -> Self {
        Self { chain: Arc::new(chain), limiter: Arc::new(limiter), trust_forwarded_for }
    }
}
