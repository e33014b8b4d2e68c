//! In-process fallback store.
//!
//! Used while the primary backend is unavailable. Not shared across processes
//! and lost on restart.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::fallback";
const METRIC_FALLBACK_EVICT_TOTAL: &str = "snapfront_cache_fallback_evict_total";

#[derive(Clone)]
struct FallbackEntry {
    value: String,
    expires_at: Instant,
}

impl FallbackEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Count-bounded map with per-entry expiry.
///
/// Expiry is checked lazily on read. Once the bound is reached, expired
/// entries are purged first and the least recently used live entry is evicted
/// only if that frees nothing.
pub struct FallbackStore {
    entries: Mutex<LruCache<String, FallbackEntry>>,
}

impl FallbackStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: &str, value: String, ttl: Duration) {
        let now = Instant::now();
        let entry = FallbackEntry {
            value,
            expires_at: now + ttl,
        };

        let mut entries = mutex_lock(&self.entries, SOURCE, "set");
        if !entries.contains(key) && entries.len() >= entries.cap().get() {
            purge_expired(&mut entries, now);
        }

        let evicted = entries.push(key.to_string(), entry);
        if evicted.is_some_and(|(evicted_key, _)| evicted_key != key) {
            counter!(METRIC_FALLBACK_EVICT_TOTAL).increment(1);
        }
    }

    pub fn delete(&self, key: &str) {
        mutex_lock(&self.entries, SOURCE, "delete").pop(key);
    }

    pub fn clear(&self) {
        mutex_lock(&self.entries, SOURCE, "clear").clear();
    }

    /// Number of stored entries, expired ones included until they are touched.
    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn purge_expired(entries: &mut LruCache<String, FallbackEntry>, now: Instant) {
    let expired: Vec<String> = entries
        .iter()
        .filter(|(_, entry)| entry.is_expired(now))
        .map(|(key, _)| key.clone())
        .collect();
    for key in expired {
        entries.pop(&key);
    }
}
