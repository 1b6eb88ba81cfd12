use crate::config::ApiCategory;
use crate::quota::QuotaStore;
use crate::store::KeyValue;
use anyhow::{Result, bail};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Round-robin API selection per category, skipping APIs that have reached
/// their daily limit.
///
/// Selection never fails: an unknown category falls back to the
/// stock-market list, and a fully exhausted category degrades to its first
/// entry, both with a logged warning. Scanning always proceeds in list
/// order from the stored cursor, never by remaining quota, so every API
/// gets a turn.
pub struct RotationSelector {
    categories: HashMap<ApiCategory, Vec<String>>,
    enabled: bool,
    quota: Arc<QuotaStore>,
    cursors: Mutex<HashMap<ApiCategory, usize>>,
    store: Arc<dyn KeyValue>,
    storage_key: String,
}

impl RotationSelector {
    pub fn new(
        namespace: &str,
        categories: HashMap<ApiCategory, Vec<String>>,
        enabled: bool,
        quota: Arc<QuotaStore>,
        store: Arc<dyn KeyValue>,
    ) -> Result<Self> {
        if !categories.contains_key(&ApiCategory::StockMarket) {
            bail!("Rotation requires a stock-market API list (fallback for unknown categories)");
        }
        for (category, apis) in &categories {
            if apis.is_empty() {
                bail!("Category '{category}' has an empty API list");
            }
        }

        let storage_key = format!("{namespace}_rotation");
        let mut cursors = load_cursors(store.as_ref(), &storage_key);
        // Repair cursors that fell out of range, e.g. after a list shrank.
        for (category, cursor) in cursors.iter_mut() {
            let len = categories
                .get(category)
                .or_else(|| categories.get(&ApiCategory::StockMarket))
                .map_or(1, Vec::len);
            if *cursor >= len {
                *cursor = 0;
            }
        }

        Ok(Self {
            categories,
            enabled,
            quota,
            cursors: Mutex::new(cursors),
            store,
            storage_key,
        })
    }

    /// Picks the next eligible API for `category` and advances the cursor
    /// past it.
    pub fn select_api(&self, category: ApiCategory) -> String {
        let list = match self.categories.get(&category) {
            Some(list) => list,
            None => {
                warn!(%category, "No API list configured for category, using stock-market list");
                &self.categories[&ApiCategory::StockMarket]
            }
        };

        if !self.enabled {
            return list[0].clone();
        }

        let len = list.len();
        let mut cursors = self.cursors.lock().unwrap();
        let start = cursors.get(&category).copied().unwrap_or(0) % len;
        for offset in 0..len {
            let index = (start + offset) % len;
            let api = &list[index];
            if !self.quota.has_reached_limit(api) {
                cursors.insert(category, (index + 1) % len);
                self.persist(&cursors);
                debug!(%category, api = %api, "Selected API");
                return api.clone();
            }
        }

        // Degraded but available: the caller must tolerate a possibly
        // quota-violating response. Cursor stays put.
        warn!(
            %category,
            api = %list[0],
            "All APIs in category reached their daily limit, returning first entry"
        );
        list[0].clone()
    }

    fn persist(&self, cursors: &HashMap<ApiCategory, usize>) {
        match serde_json::to_string(cursors) {
            Ok(raw) => {
                if let Err(e) = self.store.put(&self.storage_key, &raw) {
                    warn!(error = %e, "Failed to persist rotation cursors");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize rotation cursors"),
        }
    }

    #[cfg(test)]
    pub(crate) fn cursor(&self, category: ApiCategory) -> usize {
        self.cursors
            .lock()
            .unwrap()
            .get(&category)
            .copied()
            .unwrap_or(0)
    }
}

fn load_cursors(store: &dyn KeyValue, key: &str) -> HashMap<ApiCategory, usize> {
    match store.get(key) {
        Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "Corrupt rotation cursors, starting fresh");
            HashMap::new()
        }),
        Ok(None) => HashMap::new(),
        Err(e) => {
            warn!(error = %e, "Failed to read rotation cursors, starting fresh");
            HashMap::new()
        }
    }
}
