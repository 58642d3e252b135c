use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::filter::QueryParameters;
use crate::logging::log_cache;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// A computed result and when it was stored. Replaced wholesale, never edited.
#[derive(Debug)]
pub struct CacheEntry<V> {
    value: Arc<V>,
    created_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn new(value: Arc<V>, ttl: Duration) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.created_at.elapsed() < self.ttl
    }
}

/// Deterministic key over the present fields of `params`. Field order is
/// canonical, so construction order never changes the key.
pub fn cache_key(params: &QueryParameters) -> String {
    let mut hasher = Sha256::new();
    for (name, value) in params.key_fields() {
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// TTL cache for query results. Readers share the lock; inserts and clears
/// take it exclusively.
pub struct AlertCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    ttl: Duration,
}

impl<V> AlertCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Live entry for `key`, if any.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|e| e.is_fresh())
            .map(|e| Arc::clone(&e.value))
    }

    pub fn insert(&self, key: String, value: V) -> Arc<V> {
        let value = Arc::new(value);
        let mut entries = self.entries.write();
        entries.insert(key, CacheEntry::new(Arc::clone(&value), self.ttl));
        value
    }

    /// Return the live entry for `params`, or run `compute` and store its result.
    ///
    /// `compute` runs without the lock held, so concurrent misses on the same key
    /// may both compute; the later insert wins.
    pub fn get_or_compute<F>(&self, params: &QueryParameters, compute: F) -> Arc<V>
    where
        F: FnOnce(&QueryParameters) -> V,
    {
        let key = cache_key(params);
        if let Some(hit) = self.get(&key) {
            log_cache("hit", &key, self.len());
            return hit;
        }
        let value = self.insert(key.clone(), compute(params));
        log_cache("miss", &key, self.len());
        value
    }

    /// Drop every entry regardless of age.
    pub fn clear(&self) {
        let removed = {
            let mut entries = self.entries.write();
            let n = entries.len();
            entries.clear();
            n
        };
        log_cache("clear", "*", removed);
    }

    /// Drop expired entries; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.is_fresh());
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> Default for AlertCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
