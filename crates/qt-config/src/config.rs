use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::paths::QuotaPaths;
use crate::rate_limit::RateLimitConfig;

pub const ENV_AUTH_DIR: &str = "AIQUOTA_AUTH_DIR";
pub const ENV_BASE_URL: &str = "AIQUOTA_BASE_URL";
pub const ENV_TIMEOUT: &str = "AIQUOTA_TIMEOUT";
pub const ENV_FORMAT: &str = "AIQUOTA_FORMAT";
pub const ENV_MANAGEMENT_KEY: &str = "AIQUOTA_MANAGEMENT_KEY";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}

fn default_auth_dir() -> PathBuf {
    PathBuf::from("~/.cli-proxy-api")
}

fn default_base_url() -> String {
    "http://localhost:8317".to_string()
}

fn default_timeout() -> u64 {
    15
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_auth_dir")]
    pub auth_dir: PathBuf,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub no_network: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management_key: Option<String>,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            auth_dir: default_auth_dir(),
            base_url: default_base_url(),
            timeout: default_timeout(),
            format: OutputFormat::default(),
            strict: false,
            no_network: false,
            provider: None,
            account: None,
            management_key: None,
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

/// Values supplied on the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub auth_dir: Option<PathBuf>,
    pub base_url: Option<String>,
    pub timeout: Option<u64>,
    pub format: Option<OutputFormat>,
    pub strict: Option<bool>,
    pub no_network: Option<bool>,
    pub provider: Option<String>,
    pub account: Option<String>,
    pub management_key: Option<String>,
}

impl QuotaConfig {
    /// Load config with precedence: CLI overrides, environment, first config
    /// file found, defaults.
    pub fn load(overrides: &ConfigOverrides) -> anyhow::Result<Self> {
        let paths = QuotaPaths::new()?;
        Self::load_with(&paths, |key| std::env::var(key).ok(), overrides)
    }

    /// Load config from explicit paths and an injectable environment lookup.
    pub fn load_with<F>(
        paths: &QuotaPaths,
        env: F,
        overrides: &ConfigOverrides,
    ) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match paths.config_candidates().iter().find(|p| p.is_file()) {
            Some(file) => {
                tracing::debug!("Loading config from {}", file.display());
                Self::from_file(file)?
            }
            None => Self::default(),
        };
        config.apply_env(env);
        config.apply_overrides(overrides);
        config.auth_dir = paths.expand(&config.auth_dir);
        config.validate()?;
        Ok(config)
    }

    /// Parse a single TOML config file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: QuotaConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config file {}: {}", path.display(), e))?;
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = env(ENV_AUTH_DIR).filter(|v| !v.is_empty()) {
            self.auth_dir = PathBuf::from(dir);
        }
        if let Some(url) = env(ENV_BASE_URL).filter(|v| !v.is_empty()) {
            self.base_url = url;
        }
        if let Some(raw) = env(ENV_TIMEOUT) {
            match raw.trim().parse::<u64>() {
                Ok(timeout) => self.timeout = timeout,
                Err(_) => tracing::warn!("Ignoring invalid {}={:?}", ENV_TIMEOUT, raw),
            }
        }
        if let Some(raw) = env(ENV_FORMAT) {
            match raw.parse::<OutputFormat>() {
                Ok(format) => self.format = format,
                Err(e) => tracing::warn!("Ignoring {}: {}", ENV_FORMAT, e),
            }
        }
        if let Some(key) = env(ENV_MANAGEMENT_KEY).filter(|v| !v.is_empty()) {
            self.management_key = Some(key);
        }
    }

    pub fn apply_overrides(&mut self, o: &ConfigOverrides) {
        if let Some(dir) = &o.auth_dir {
            self.auth_dir = dir.clone();
        }
        if let Some(url) = &o.base_url {
            self.base_url = url.clone();
        }
        if let Some(timeout) = o.timeout {
            self.timeout = timeout;
        }
        if let Some(format) = o.format {
            self.format = format;
        }
        if let Some(strict) = o.strict {
            self.strict = strict;
        }
        if let Some(no_network) = o.no_network {
            self.no_network = no_network;
        }
        if o.provider.is_some() {
            self.provider = o.provider.clone();
        }
        if o.account.is_some() {
            self.account = o.account.clone();
        }
        if o.management_key.is_some() {
            self.management_key = o.management_key.clone();
        }
    }

    /// Validate config values. Called automatically by `load` / `load_with`.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout == 0 {
            anyhow::bail!("timeout must be greater than 0");
        }
        if self.base_url.trim().is_empty() {
            anyhow::bail!("base_url must not be empty");
        }
        if self.rate_limit.max_concurrency == 0 {
            anyhow::bail!("rate_limit.max_concurrency must be greater than 0");
        }
        if self.rate_limit.per_provider == 0 {
            anyhow::bail!("rate_limit.per_provider must be greater than 0");
        }
        if self.cache.ttl_seconds == 0 {
            anyhow::bail!("cache.ttl_seconds must be greater than 0");
        }
        Ok(())
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Proxy base URL without a trailing slash.
    pub fn proxy_base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}
