//! Fixed-window admission control keyed by client identity.
//!
//! Each client gets a counter that resets once the current time passes the
//! stored reset instant. Fixed windows allow up to `2 * max_requests` calls
//! across a window boundary (a burst at the end of one window followed by a
//! burst at the start of the next). That is accepted behavior, not a bug.
//!
//! Records live in an LRU map capped at `max_tracked_clients`; evicting a
//! record forgets that client's count.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
    pub max_tracked_clients: NonZeroUsize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60 * 60),
            max_tracked_clients: NonZeroUsize::new(10_000).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub count: u32,
    pub reset_at: Instant,
}

impl RateLimitRecord {
    fn new(now: Instant, window: Duration) -> Self {
        Self { count: 0, reset_at: now + window }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Allowed { remaining: u32 },
    Denied { retry_after_secs: u64 },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Denied { retry_after_secs } => Some(*retry_after_secs),
            Self::Allowed { .. } => None,
        }
    }
}

pub struct RateLimiter {
    config: RateLimitConfig,
    records: Mutex<LruCache<String, RateLimitRecord>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self { records: Mutex::new(LruCache::new(config.max_tracked_clients)), config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn admit(&self, client_key: &str) -> Admission {
        self.admit_at(client_key, Instant::now())
    }

    /// The compare and the increment happen under one lock, so concurrent
    /// callers sharing a key can never push the count past the limit.
    pub fn admit_at(&self, client_key: &str, now: Instant) -> Admission {
        let window = self.config.window;
        let mut records = match self.records.lock() {
            Ok(records) => records,
            Err(poisoned) => {
                warn!(event_name = "chatgate.rate_limit.poisoned", "recovering poisoned lock");
                poisoned.into_inner()
            }
        };

        let record = records
            .get_or_insert_mut(client_key.to_string(), || RateLimitRecord::new(now, window));

        if now > record.reset_at {
            record.count = 0;
            record.reset_at = now + window;
        }

        if record.count >= self.config.max_requests {
            let remaining_window = record.reset_at.saturating_duration_since(now);
            let retry_after_secs = remaining_window.as_millis().div_ceil(1000) as u64;
            debug!(
                event_name = "chatgate.rate_limit.denied",
                client_key = %client_key,
                count = record.count,
                limit = self.config.max_requests,
                retry_after_secs,
                "rate limit exceeded"
            );
            return Admission::Denied { retry_after_secs };
        }

        record.count += 1;
        Admission::Allowed { remaining: self.config.max_requests - record.count }
    }

    pub fn tracked_clients(&self) -> usize {
        match self.records.lock() {
            Ok(records) => records.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
