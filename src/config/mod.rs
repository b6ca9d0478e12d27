use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Where the channel list comes from and how often it is rebuilt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_playlist_url")]
    pub playlist_url: String,
    /// Optional JSON file with language/country/subdivision/city names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory_path: Option<PathBuf>,
    #[serde(default = "default_refresh_interval", with = "duration_serde")]
    pub refresh_interval: Duration,
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub fetch_timeout: Duration,
}

/// Stream validation: probe pool, cache staleness and background sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Upper bound for a single probe, connect through manifest parse
    #[serde(default = "default_probe_timeout", with = "duration_serde")]
    pub probe_timeout: Duration,
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,
    /// How long a validating query waits for its page's probes
    #[serde(default = "default_ensure_fresh_timeout", with = "duration_serde")]
    pub ensure_fresh_timeout: Duration,
    /// Maximum number of probes running at once, system-wide
    #[serde(default = "default_pool_width")]
    pub pool_width: usize,
    #[serde(default = "default_cache_ttl", with = "duration_serde")]
    pub cache_ttl: Duration,
    #[serde(default = "default_max_manifest_bytes")]
    pub max_manifest_bytes: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_sweep_enabled")]
    pub sweep_enabled: bool,
    #[serde(default = "default_sweep_interval", with = "duration_serde")]
    pub sweep_interval: Duration,
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_playlist_url() -> String {
    DEFAULT_PLAYLIST_URL.to_string()
}

fn default_refresh_interval() -> Duration {
    Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)
}

fn default_ensure_fresh_timeout() -> Duration {
    Duration::from_secs(DEFAULT_ENSURE_FRESH_TIMEOUT_SECS)
}

fn default_pool_width() -> usize {
    DEFAULT_POOL_WIDTH
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(DEFAULT_CACHE_TTL_SECS)
}

fn default_max_manifest_bytes() -> usize {
    DEFAULT_MAX_MANIFEST_BYTES
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_sweep_enabled() -> bool {
    DEFAULT_SWEEP_ENABLED
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS)
}

fn default_sweep_batch_size() -> usize {
    DEFAULT_SWEEP_BATCH_SIZE
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> u32 {
    DEFAULT_MAX_PAGE_SIZE
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            playlist_url: default_playlist_url(),
            directory_path: None,
            refresh_interval: default_refresh_interval(),
            fetch_timeout: default_fetch_timeout(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            probe_timeout: default_probe_timeout(),
            connect_timeout: default_connect_timeout(),
            ensure_fresh_timeout: default_ensure_fresh_timeout(),
            pool_width: default_pool_width(),
            cache_ttl: default_cache_ttl(),
            max_manifest_bytes: default_max_manifest_bytes(),
            user_agent: default_user_agent(),
            sweep_enabled: default_sweep_enabled(),
            sweep_interval: default_sweep_interval(),
            sweep_batch_size: default_sweep_batch_size(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, writing the defaults out first
    /// if the file does not exist yet.
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        let config = if std::path::Path::new(config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            toml::from_str::<Self>(&contents)?
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            default_config
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.validation.pool_width == 0 {
            return Err(AppError::configuration(
                "validation.pool_width must be greater than zero",
            ));
        }
        if self.validation.sweep_batch_size == 0 {
            return Err(AppError::configuration(
                "validation.sweep_batch_size must be greater than zero",
            ));
        }
        if self.validation.sweep_enabled && self.validation.sweep_interval.is_zero() {
            return Err(AppError::configuration(
                "validation.sweep_interval must be greater than zero when sweeps are enabled",
            ));
        }
        if self.query.max_page_size == 0 || self.query.default_page_size == 0 {
            return Err(AppError::configuration("query page sizes must be greater than zero"));
        }
        if self.query.default_page_size > self.query.max_page_size {
            return Err(AppError::configuration(format!(
                "query.default_page_size ({}) exceeds query.max_page_size ({})",
                self.query.default_page_size, self.query.max_page_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.validation.pool_width, DEFAULT_POOL_WIDTH);
        assert_eq!(config.query.default_page_size, 24);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [validation]
            pool_width = 4
            cache_ttl = "5m"

            [query]
            max_page_size = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.validation.pool_width, 4);
        assert_eq!(config.validation.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.validation.probe_timeout, default_probe_timeout());
        assert_eq!(config.query.max_page_size, 50);
        assert_eq!(config.web.port, DEFAULT_PORT);
    }

    #[test]
    fn test_rejects_zero_pool_width() {
        let mut config = Config::default();
        config.validation.pool_width = 0;
        assert!(matches!(
            config.validate(),
            Err(AppError::Configuration { .. })
        ));
    }

    #[test]
    fn test_rejects_zero_sweep_interval_only_when_enabled() {
        let mut config: Config = toml::from_str(
            r#"
            [validation]
            sweep_interval = 0
            "#,
        )
        .unwrap();
        assert!(config.validation.sweep_enabled);
        assert!(matches!(
            config.validate(),
            Err(AppError::Configuration { .. })
        ));

        config.validation.sweep_enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_default_page_above_max() {
        let mut config = Config::default();
        config.query.default_page_size = 200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path_str = path.to_str().unwrap();

        let config = Config::load_from_file(path_str).unwrap();
        assert!(path.exists());
        assert_eq!(config.web.port, DEFAULT_PORT);

        let reloaded = Config::load_from_file(path_str).unwrap();
        assert_eq!(reloaded.validation.cache_ttl, config.validation.cache_ttl);
        assert_eq!(reloaded.catalog.playlist_url, DEFAULT_PLAYLIST_URL);
    }
}
