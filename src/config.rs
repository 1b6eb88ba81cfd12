use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::{fmt, fs, path::PathBuf};
use tracing::debug;

/// A class of financial data, each with its own ordered API pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApiCategory {
    StockMarket,
    News,
    Crypto,
    Economic,
    BrazilianStock,
}

impl ApiCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiCategory::StockMarket => "stock-market",
            ApiCategory::News => "news",
            ApiCategory::Crypto => "crypto",
            ApiCategory::Economic => "economic",
            ApiCategory::BrazilianStock => "brazilian-stock",
        }
    }
}

impl fmt::Display for ApiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stock-market" => Ok(ApiCategory::StockMarket),
            "news" => Ok(ApiCategory::News),
            "crypto" => Ok(ApiCategory::Crypto),
            "economic" => Ok(ApiCategory::Economic),
            "brazilian-stock" => Ok(ApiCategory::BrazilianStock),
            other => bail!(
                "Unknown category '{other}', expected one of: stock-market, news, crypto, economic, brazilian-stock"
            ),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Alternate base used when the global proxy toggle is on.
    #[serde(default)]
    pub proxy_url: Option<String>,
    /// No key configured means the provider is keyless: no key parameter
    /// is injected into outbound URLs.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_key_param")]
    pub key_param: String,
    /// Daily call budget. Absent means unbounded.
    #[serde(default)]
    pub daily_limit: Option<u32>,
    /// Minimum gap between two outbound calls. Absent means the provider
    /// is not throttled through a queue.
    #[serde(default)]
    pub min_interval_ms: Option<u64>,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_key_param() -> String {
    "apikey".to_string()
}

fn default_queue_capacity() -> usize {
    50
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Prefix for every persisted key (quota blob, cursors, cache entries).
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// When off, every selection deterministically returns the first API
    /// of the category list.
    #[serde(default = "default_true")]
    pub rotation_enabled: bool,
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    #[serde(default)]
    pub use_proxy: bool,
    /// Ordered API pool per category; order is the round-robin order.
    pub categories: HashMap<ApiCategory, Vec<String>>,
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_namespace() -> String {
    "finfeed".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut categories = HashMap::new();
        categories.insert(
            ApiCategory::StockMarket,
            vec![
                "fmp".to_string(),
                "alphavantage".to_string(),
                "brapi".to_string(),
            ],
        );
        categories.insert(
            ApiCategory::Crypto,
            vec![
                "coingecko".to_string(),
                "alphavantage".to_string(),
                "brapi".to_string(),
            ],
        );
        categories.insert(ApiCategory::News, vec!["gnews".to_string()]);
        categories.insert(
            ApiCategory::Economic,
            vec!["bcb".to_string(), "alphavantage".to_string()],
        );
        categories.insert(ApiCategory::BrazilianStock, vec!["brapi".to_string()]);

        let mut providers = HashMap::new();
        providers.insert(
            "coingecko".to_string(),
            ProviderConfig {
                base_url: "https://api.coingecko.com/api/v3".to_string(),
                proxy_url: None,
                api_key: None,
                key_param: default_key_param(),
                daily_limit: None,
                // CoinGecko's free tier is the one slow-quota upstream;
                // calls to it are spaced out and serialized.
                min_interval_ms: Some(2000),
                queue_capacity: default_queue_capacity(),
            },
        );
        providers.insert(
            "alphavantage".to_string(),
            ProviderConfig {
                base_url: "https://www.alphavantage.co".to_string(),
                proxy_url: None,
                api_key: None,
                key_param: default_key_param(),
                daily_limit: Some(25),
                min_interval_ms: None,
                queue_capacity: default_queue_capacity(),
            },
        );
        providers.insert(
            "brapi".to_string(),
            ProviderConfig {
                base_url: "https://brapi.dev/api".to_string(),
                proxy_url: None,
                api_key: None,
                key_param: "token".to_string(),
                daily_limit: Some(15000),
                min_interval_ms: None,
                queue_capacity: default_queue_capacity(),
            },
        );
        providers.insert(
            "fmp".to_string(),
            ProviderConfig {
                base_url: "https://financialmodelingprep.com/api/v3".to_string(),
                proxy_url: None,
                api_key: None,
                key_param: default_key_param(),
                daily_limit: Some(250),
                min_interval_ms: None,
                queue_capacity: default_queue_capacity(),
            },
        );
        providers.insert(
            "gnews".to_string(),
            ProviderConfig {
                base_url: "https://gnews.io/api/v4".to_string(),
                proxy_url: None,
                api_key: None,
                key_param: "apikey".to_string(),
                daily_limit: Some(100),
                min_interval_ms: None,
                queue_capacity: default_queue_capacity(),
            },
        );
        providers.insert(
            "bcb".to_string(),
            ProviderConfig {
                base_url: "https://api.bcb.gov.br".to_string(),
                proxy_url: None,
                api_key: None,
                key_param: default_key_param(),
                daily_limit: None,
                min_interval_ms: None,
                queue_capacity: default_queue_capacity(),
            },
        );

        AppConfig {
            namespace: default_namespace(),
            rotation_enabled: true,
            cache_enabled: true,
            use_proxy: false,
            categories,
            providers,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("in", "codito", "finfeed")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("in", "codito", "finfeed")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config.validate()?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// Rules the selector and builder rely on: every category list is
    /// non-empty, every listed API has a provider entry, and the
    /// stock-market fallback list exists.
    pub fn validate(&self) -> Result<()> {
        if !self.categories.contains_key(&ApiCategory::StockMarket) {
            bail!("Config must define the stock-market category (used as fallback)");
        }
        for (category, apis) in &self.categories {
            if apis.is_empty() {
                bail!("Category '{category}' has an empty API list");
            }
            for api in apis {
                if !self.providers.contains_key(api) {
                    bail!("Category '{category}' lists unknown API '{api}'");
                }
            }
        }
        Ok(())
    }
}
