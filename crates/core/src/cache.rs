//! TTL-bounded memo of successful generations.
//!
//! Expired entries are dropped by the read that finds them; there is no
//! background sweep. The LRU capacity is what bounds memory.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use lru::LruCache;
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::provider::ProviderKind;
use crate::request::{Locale, RequestContext};

const FINGERPRINT_HEX_LEN: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    pub text: String,
    pub expires_at: Instant,
}

/// `ai:{provider}:{locale}:{fingerprint}` where the fingerprint is a
/// truncated SHA-256 of the message and the serialized context. Collisions
/// are possible and tolerated.
pub fn cache_key(
    provider: ProviderKind,
    locale: Locale,
    message: &str,
    context: Option<&RequestContext>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(message.as_bytes());
    hasher.update([0x1f]);
    hasher.update(serialize_context(context).as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    format!("ai:{}:{}:{}", provider.as_str(), locale.code(), &digest[..FINGERPRINT_HEX_LEN])
}

fn serialize_context(context: Option<&RequestContext>) -> String {
    let Some(context) = context else {
        return "{}".to_string();
    };
    let value = serde_json::json!({
        "currentPage": context.current_page,
        "previousActions": context.previous_actions,
    });
    value.to_string()
}

pub struct ResponseCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(max_entries: NonZeroUsize) -> Self {
        Self { entries: Mutex::new(LruCache::new(max_entries)) }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, Instant::now())
    }

    /// Expiry check and eviction run under the same lock as the lookup.
    pub fn get_at(&self, key: &str, now: Instant) -> Option<String> {
        let mut entries = self.lock();
        let expired = match entries.get(key) {
            Some(entry) if now < entry.expires_at => return Some(entry.text.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    pub fn put(&self, key: impl Into<String>, text: impl Into<String>, ttl_minutes: u64) {
        self.put_at(key, text, Duration::from_secs(ttl_minutes.saturating_mul(60)), Instant::now());
    }

    pub fn put_at(
        &self,
        key: impl Into<String>,
        text: impl Into<String>,
        ttl: Duration,
        now: Instant,
    ) {
        let entry = CacheEntry { text: text.into(), expires_at: now + ttl };
        self.lock().put(key.into(), entry);
    }

    /// Entries currently held, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, CacheEntry>> {
        match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
