//! File and environment configuration for the CLI
//!
//! Settings are read from `config.toml` in the platform config directory
//! (`~/.config/oda-cli/config.toml` on Linux), then overridden by `ODA_*`
//! environment variables. A missing file means defaults.

use anyhow::{Context, Result, bail};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::cache::CacheConfig;
use crate::api::client::ClientConfig;
use crate::api::constants::{DEFAULT_BASE_URL, MAX_PAGE_SIZE};
use crate::api::resilience::{ResilienceConfig, RetryConfig};

pub const ENV_BASE_URL: &str = "ODA_BASE_URL";
pub const ENV_PAGE_SIZE: &str = "ODA_PAGE_SIZE";
pub const ENV_CACHE_TTL_SECS: &str = "ODA_CACHE_TTL_SECS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "ODA_REQUEST_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    /// Default `$top` for queries that don't set one
    pub page_size: u32,
    /// Where the CLI keeps cached results between runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_file: Option<PathBuf>,
    pub cache: CacheConfig,
    pub network: NetworkConfig,
}

/// Retry, concurrency and timeout settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
    /// 0 disables the limit
    pub max_concurrent_requests: usize,
    pub request_timeout_secs: u64,
    pub fetch_deadline_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: MAX_PAGE_SIZE,
            cache_file: None,
            cache: CacheConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let resilience = ResilienceConfig::default();
        Self {
            max_attempts: resilience.retry.max_attempts,
            base_delay_ms: resilience.retry.base_delay.as_millis() as u64,
            max_delay_ms: resilience.retry.max_delay.as_millis() as u64,
            jitter: resilience.retry.jitter,
            max_concurrent_requests: resilience.concurrency.max_concurrent_requests,
            request_timeout_secs: resilience.timeout.request_timeout.as_secs(),
            fetch_deadline_secs: resilience.timeout.fetch_deadline.as_secs(),
        }
    }
}

impl Config {
    /// Default location of the config file
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("oda-cli").join("config.toml"))
    }

    /// Cache file location: `cache_file` if set, else `oda-cli/cache.json` in the platform cache dir
    pub fn cache_file_path(&self) -> Option<PathBuf> {
        self.cache_file
            .clone()
            .or_else(|| dirs::cache_dir().map(|dir| dir.join("oda-cli").join("cache.json")))
    }

    /// Load from the default path (if present) and apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::path() {
            Some(path) if path.exists() => Self::load_from_path(&path)?,
            _ => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Apply `ODA_*` overrides using the given variable lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(raw) = lookup(ENV_PAGE_SIZE) {
            self.page_size = parse_env(ENV_PAGE_SIZE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CACHE_TTL_SECS) {
            self.cache.default_ttl = Duration::from_secs(parse_env(ENV_CACHE_TTL_SECS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT_SECS) {
            self.network.request_timeout_secs = parse_env(ENV_REQUEST_TIMEOUT_SECS, &raw)?;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            bail!(
                "page_size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE,
                self.page_size
            );
        }
        if self.base_url.trim().is_empty() {
            bail!("base_url must not be empty");
        }
        Ok(())
    }

    pub fn resilience(&self) -> ResilienceConfig {
        let network = &self.network;
        ResilienceConfig::builder()
            .retry_config(RetryConfig {
                max_attempts: network.max_attempts,
                base_delay: Duration::from_millis(network.base_delay_ms),
                max_delay: Duration::from_millis(network.max_delay_ms),
                jitter: network.jitter,
                ..RetryConfig::default()
            })
            .max_concurrent_requests(network.max_concurrent_requests)
            .enable_concurrency_limiting(network.max_concurrent_requests > 0)
            .request_timeout(Duration::from_secs(network.request_timeout_secs))
            .fetch_deadline(Duration::from_secs(network.fetch_deadline_secs))
            .build()
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            resilience: self.resilience(),
            cache: self.cache.clone(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid value for {}: '{}'", key, raw))
}
