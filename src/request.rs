use crate::config::{ApiCategory, AppConfig, ProviderConfig};
use crate::quota::QuotaStore;
use crate::rotation::RotationSelector;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// A fully composed outbound request and the API it was composed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltRequest {
    pub url: String,
    pub api: String,
}

/// Composes outbound request URLs for the API chosen by the rotation
/// selector.
///
/// Selection and usage accounting are paired: every successful selection is
/// recorded as a call before the URL is returned, so the quota counters
/// track selections one-to-one even when the caller's network call later
/// fails.
pub struct RequestBuilder {
    providers: HashMap<String, ProviderConfig>,
    use_proxy: bool,
    rotation: Arc<RotationSelector>,
    quota: Arc<QuotaStore>,
}

impl RequestBuilder {
    pub fn new(
        config: &AppConfig,
        rotation: Arc<RotationSelector>,
        quota: Arc<QuotaStore>,
    ) -> Self {
        Self {
            providers: config.providers.clone(),
            use_proxy: config.use_proxy,
            rotation,
            quota,
        }
    }

    /// Selects an API for `category`, records the call, and builds the URL
    /// for `endpoint`. Params with a `None` value are skipped; the API-key
    /// parameter is injected unless the provider is keyless.
    pub fn build(
        &self,
        category: ApiCategory,
        endpoint: &str,
        params: &[(String, Option<String>)],
    ) -> Result<BuiltRequest> {
        let api = self.rotation.select_api(category);
        self.quota.record_call(&api);

        let provider = self
            .providers
            .get(&api)
            .with_context(|| format!("No provider configured for API '{api}'"))?;

        let base = if self.use_proxy {
            provider.proxy_url.as_deref().unwrap_or(&provider.base_url)
        } else {
            &provider.base_url
        };
        let mut url = Url::parse(&format!("{base}{endpoint}"))
            .with_context(|| format!("Invalid URL for API '{api}': {base}{endpoint}"))?;

        {
            let mut query = url.query_pairs_mut();
            if let Some(key) = &provider.api_key {
                query.append_pair(&provider.key_param, key);
            }
            for (name, value) in params {
                if let Some(value) = value {
                    query.append_pair(name, value);
                }
            }
        }
        // query_pairs_mut leaves a dangling '?' when nothing was appended.
        if url.query() == Some("") {
            url.set_query(None);
        }

        debug!(api = %api, url = %url, "Built outbound request");
        Ok(BuiltRequest {
            url: url.into(),
            api,
        })
    }
}
