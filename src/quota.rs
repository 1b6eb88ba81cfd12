use crate::store::KeyValue;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct QuotaState {
    last_reset: String,
    counts: HashMap<String, u32>,
}

/// One row of the read-only usage snapshot. `total`/`remaining` are absent
/// for APIs without a configured daily limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiUsage {
    pub api: String,
    pub count: u32,
    pub remaining: Option<u32>,
    pub total: Option<u32>,
}

/// Per-API daily call counters with a calendar-day reset boundary.
///
/// Counting is unconditional: limits are enforced by the rotation selector,
/// never here. Counts are monotonically non-decreasing within a day and
/// cleared exactly once when the local date advances; the boundary is
/// re-checked on every access, so a long-lived store rolls over without an
/// explicit `initialize` call. State persists as a single JSON blob in the
/// backing store and is repaired (reset) when the blob is missing or
/// unreadable.
pub struct QuotaStore {
    limits: HashMap<String, u32>,
    state: Mutex<QuotaState>,
    store: Arc<dyn KeyValue>,
    storage_key: String,
}

impl QuotaStore {
    pub fn new(namespace: &str, limits: HashMap<String, u32>, store: Arc<dyn KeyValue>) -> Self {
        let storage_key = format!("{namespace}_quota");
        let state = load_state(store.as_ref(), &storage_key);
        let quota = Self {
            limits,
            state: Mutex::new(state),
            store,
            storage_key,
        };
        quota.initialize();
        quota
    }

    /// Clears all counts on the first call of a calendar day; a no-op on
    /// every later call that day.
    pub fn initialize(&self) {
        self.initialize_at(&today_stamp());
    }

    pub(crate) fn initialize_at(&self, today: &str) {
        let mut state = self.state.lock().unwrap();
        self.reset_if_stale(&mut state, today);
    }

    /// Increments the counter for `api`. Always succeeds; no upper bound.
    pub fn record_call(&self, api: &str) {
        self.record_call_at(api, &today_stamp());
    }

    pub(crate) fn record_call_at(&self, api: &str, today: &str) {
        let mut state = self.state.lock().unwrap();
        self.reset_if_stale(&mut state, today);
        let count = state.counts.entry(api.to_string()).or_insert(0);
        *count += 1;
        debug!(api, count = *count, "Recorded API call");
        self.persist(&state);
    }

    /// True iff `count(api) >= daily_limit(api)`. An API without a
    /// configured limit is always under limit.
    pub fn has_reached_limit(&self, api: &str) -> bool {
        self.has_reached_limit_at(api, &today_stamp())
    }

    pub(crate) fn has_reached_limit_at(&self, api: &str, today: &str) -> bool {
        let Some(&limit) = self.limits.get(api) else {
            return false;
        };
        let mut state = self.state.lock().unwrap();
        self.reset_if_stale(&mut state, today);
        state.counts.get(api).copied().unwrap_or(0) >= limit
    }

    /// Clears the counters when `today` has moved past the recorded reset
    /// boundary. Runs under the caller's lock, so reset and the following
    /// mutation are atomic.
    fn reset_if_stale(&self, state: &mut QuotaState, today: &str) {
        if state.last_reset != today {
            debug!(day = today, "Resetting daily API quotas");
            state.counts.clear();
            state.last_reset = today.to_string();
            self.persist(state);
        }
    }

    /// Usage for every API with a recorded count, sorted by API name.
    /// Read-only, side-effect-free.
    pub fn usage_snapshot(&self) -> Vec<ApiUsage> {
        let state = self.state.lock().unwrap();
        let mut usage: Vec<ApiUsage> = state
            .counts
            .iter()
            .map(|(api, &count)| {
                let total = self.limits.get(api).copied();
                ApiUsage {
                    api: api.clone(),
                    count,
                    remaining: total.map(|t| t.saturating_sub(count)),
                    total,
                }
            })
            .collect();
        usage.sort_by(|a, b| a.api.cmp(&b.api));
        usage
    }

    fn persist(&self, state: &QuotaState) {
        match serde_json::to_string(state) {
            Ok(raw) => {
                if let Err(e) = self.store.put(&self.storage_key, &raw) {
                    warn!(error = %e, "Failed to persist quota state");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize quota state"),
        }
    }
}

fn load_state(store: &dyn KeyValue, key: &str) -> QuotaState {
    match store.get(key) {
        Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "Corrupt quota state, starting fresh");
            QuotaState::default()
        }),
        Ok(None) => QuotaState::default(),
        Err(e) => {
            warn!(error = %e, "Failed to read quota state, starting fresh");
            QuotaState::default()
        }
    }
}

pub(crate) fn today_stamp() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}
