use crate::core::cache::CacheTtl;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

pub const EXCHANGE_API_KEY_VAR: &str = "EXCHANGE_API_KEY";
pub const COINMARKETCAP_API_KEY_VAR: &str = "COINMARKETCAP_API_KEY";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProviderConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ProviderConfig {
    /// The configured credential, else the named environment variable.
    /// Blank values count as absent.
    pub fn api_key_or_env(&self, var: &str) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(var).ok())
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_retries() -> usize {
    1
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProvidersConfig {
    pub exchangerates: Option<ProviderConfig>,
    pub coinmarketcap: Option<ProviderConfig>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: usize,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            exchangerates: Some(ProviderConfig {
                base_url: "https://v6.exchangerate-api.com/v6".to_string(),
                api_key: None,
            }),
            coinmarketcap: Some(ProviderConfig {
                base_url: "https://pro-api.coinmarketcap.com/v1".to_string(),
                api_key: None,
            }),
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct CatalogConfig {
    pub crypto_path: Option<PathBuf>,
    pub fiat_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Disk,
}

fn default_max_entries() -> usize {
    1000
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    /// Directory for the disk backend. Defaults to `<data dir>/cache`.
    pub path: Option<PathBuf>,
    /// Entry limit of the memory backend.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default)]
    pub ttl: CacheTtl,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            path: None,
            max_entries: default_max_entries(),
            ttl: CacheTtl::default(),
        }
    }
}

fn default_pivots() -> Vec<String> {
    ["USD", "USDT", "EUR", "BTC"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn pairs(list: &[(&str, &str)]) -> Vec<[String; 2]> {
    list.iter()
        .map(|(a, b)| [a.to_string(), b.to_string()])
        .collect()
}

fn default_double_pivots() -> Vec<[String; 2]> {
    pairs(&[("USD", "BTC"), ("USDT", "BTC"), ("USD", "ETH"), ("USDT", "ETH")])
}

fn default_health_pairs() -> Vec<[String; 2]> {
    pairs(&[("BTC", "USD"), ("USD", "EUR"), ("ETH", "ADA")])
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RoutingConfig {
    /// Single-pivot candidates in preference order.
    #[serde(default = "default_pivots")]
    pub pivots: Vec<String>,
    /// Two-pivot combinations tried for crypto-to-crypto pairs, in order.
    #[serde(default = "default_double_pivots")]
    pub double_pivots: Vec<[String; 2]>,
    /// Pairs converted by the health check.
    #[serde(default = "default_health_pairs")]
    pub health_pairs: Vec<[String; 2]>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            pivots: default_pivots(),
            double_pivots: default_double_pivots(),
            health_pairs: default_health_pairs(),
        }
    }
}

fn default_max_size() -> usize {
    50
}

fn default_concurrency() -> usize {
    20
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BatchConfig {
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            concurrency: default_concurrency(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// YAML estimated-rate table replacing the built-in one.
    pub estimates_path: Option<PathBuf>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    pub data_path: Option<String>,
}

impl AppConfig {
    /// Loads the config from the default location, or built-in defaults
    /// when no file exists there.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "bridgefx", "bridgefx")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("dev", "bridgefx", "bridgefx")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
