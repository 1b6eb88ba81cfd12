use crate::store::KeyValue;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Persisted wire shape of one cache entry. Timestamps are epoch millis.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    data: Value,
    timestamp: i64,
    expiry: i64,
}

/// Time-boxed JSON cache over the key-value store.
///
/// Entries live under `<namespace>_cache_<key>` and are visible to readers
/// only while `now < expiry`; an expired or unreadable entry is evicted on
/// the access that finds it. All invalidation is best-effort: per-key
/// failures are logged and the sweep continues.
pub struct TtlCache {
    store: Arc<dyn KeyValue>,
    namespace: String,
    enabled: bool,
}

impl TtlCache {
    pub fn new(namespace: &str, enabled: bool, store: Arc<dyn KeyValue>) -> Self {
        Self {
            store,
            namespace: namespace.to_string(),
            enabled,
        }
    }

    fn entry_prefix(&self) -> String {
        format!("{}_cache_", self.namespace)
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.entry_prefix(), key)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        if !self.enabled {
            return None;
        }

        let storage_key = self.storage_key(key);
        let raw = match self.store.get(&storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key, "Cache MISS");
                return None;
            }
            Err(e) => {
                warn!(key, error = %e, "Failed to read cache entry, treating as miss");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "Dropping corrupt cache entry");
                let _ = self.store.remove(&storage_key);
                return None;
            }
        };

        if now_millis() >= entry.expiry {
            debug!(key, "Cache entry expired");
            if let Err(e) = self.store.remove(&storage_key) {
                debug!(key, error = %e, "Failed to evict expired cache entry");
            }
            return None;
        }

        debug!(key, "Cache HIT");
        Some(entry.data)
    }

    /// Stores `data` under `key`, overwriting any prior entry. No-op when
    /// caching is disabled. The TTL is clamped to at least one millisecond
    /// so the entry's expiry always lies after its store time.
    pub fn put(&self, key: &str, data: Value, ttl: Duration) {
        if !self.enabled {
            return;
        }

        let now = now_millis();
        let ttl_millis = (ttl.as_millis() as i64).max(1);
        let entry = CacheEntry {
            data,
            timestamp: now,
            expiry: now + ttl_millis,
        };

        match serde_json::to_string(&entry) {
            Ok(raw) => {
                if let Err(e) = self.store.put(&self.storage_key(key), &raw) {
                    warn!(key, error = %e, "Failed to write cache entry");
                } else {
                    debug!(key, ttl_millis, "Cache PUT");
                }
            }
            Err(e) => warn!(key, error = %e, "Failed to serialize cache entry"),
        }
    }

    pub fn invalidate(&self, key: &str) {
        if let Err(e) = self.store.remove(&self.storage_key(key)) {
            warn!(key, error = %e, "Failed to invalidate cache entry");
        }
    }

    /// Removes every entry whose key starts with `prefix`.
    pub fn invalidate_by_prefix(&self, prefix: &str) {
        let storage_prefix = self.storage_key(prefix);
        let keys = match self.store.keys_with_prefix(&storage_prefix) {
            Ok(keys) => keys,
            Err(e) => {
                warn!(prefix, error = %e, "Failed to scan cache entries");
                return;
            }
        };
        debug!(prefix, count = keys.len(), "Invalidating cache entries");
        for key in keys {
            if let Err(e) = self.store.remove(&key) {
                warn!(key, error = %e, "Failed to remove cache entry, continuing");
            }
        }
    }

    pub fn invalidate_all(&self) {
        self.invalidate_by_prefix("");
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
