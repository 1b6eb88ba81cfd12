use crate::cache::TtlCache;
use crate::config::{ApiCategory, AppConfig};
use crate::limiter::RateLimiter;
use crate::quota::{ApiUsage, QuotaStore};
use crate::request::RequestBuilder;
use crate::rotation::RotationSelector;
use crate::store::KeyValue;
use crate::transport::Transport;
use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Orchestrates a data-loading call end to end: cache lookup, API
/// selection, quota accounting, URL composition, rate-limited execution,
/// cache write-back.
///
/// Only providers with a configured `min_interval_ms` go through a queue;
/// the rest call the transport directly.
pub struct FeedService {
    cache: TtlCache,
    builder: RequestBuilder,
    limiters: HashMap<String, RateLimiter<Value>>,
    transport: Arc<dyn Transport>,
    quota: Arc<QuotaStore>,
}

impl FeedService {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn KeyValue>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;

        let limits = config
            .providers
            .iter()
            .filter_map(|(name, p)| p.daily_limit.map(|limit| (name.clone(), limit)))
            .collect();
        let quota = Arc::new(QuotaStore::new(
            &config.namespace,
            limits,
            Arc::clone(&store),
        ));
        let rotation = Arc::new(RotationSelector::new(
            &config.namespace,
            config.categories.clone(),
            config.rotation_enabled,
            Arc::clone(&quota),
            Arc::clone(&store),
        )?);
        let builder = RequestBuilder::new(config, rotation, Arc::clone(&quota));
        let cache = TtlCache::new(&config.namespace, config.cache_enabled, store);

        let limiters = config
            .providers
            .iter()
            .filter_map(|(name, p)| {
                p.min_interval_ms.map(|ms| {
                    (
                        name.clone(),
                        RateLimiter::new(name.clone(), Duration::from_millis(ms), p.queue_capacity),
                    )
                })
            })
            .collect();

        Ok(Self {
            cache,
            builder,
            limiters,
            transport,
            quota,
        })
    }

    /// Fetches one endpoint for `category`, serving from cache when a fresh
    /// entry exists. On a miss the response is cached for `ttl`.
    #[instrument(name = "FeedFetch", skip(self, params, ttl))]
    pub async fn fetch(
        &self,
        category: ApiCategory,
        endpoint: &str,
        params: &[(String, Option<String>)],
        ttl: Duration,
    ) -> Result<Value> {
        let key = cache_key(category, endpoint, params);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let request = self.builder.build(category, endpoint, params)?;
        debug!(api = %request.api, "Cache miss, calling upstream");

        let payload = match self.limiters.get(&request.api) {
            Some(queue) => {
                let transport = Arc::clone(&self.transport);
                let url = request.url.clone();
                queue
                    .run(Box::pin(async move { transport.get_json(&url).await }))
                    .await?
            }
            None => self.transport.get_json(&request.url).await?,
        };

        self.cache.put(&key, payload.clone(), ttl);
        Ok(payload)
    }

    pub fn usage_snapshot(&self) -> Vec<ApiUsage> {
        self.quota.usage_snapshot()
    }

    pub fn cache(&self) -> &TtlCache {
        &self.cache
    }
}

fn cache_key(category: ApiCategory, endpoint: &str, params: &[(String, Option<String>)]) -> String {
    let mut key = format!("{category}:{endpoint}");
    for (name, value) in params {
        if let Some(value) = value {
            key.push(':');
            key.push_str(name);
            key.push('=');
            key.push_str(value);
        }
    }
    key
}
