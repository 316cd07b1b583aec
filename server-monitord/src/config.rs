use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use anyhow::{Context, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub store: StoreConfig,
    pub discord: DiscordConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between cycle starts
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Budget for a single server query
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    pub token: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_interval() -> u64 {
    30
}

fn default_query_timeout() -> u64 {
    5
}

fn default_max_concurrent_queries() -> usize {
    8
}

fn default_store_path() -> PathBuf {
    PathBuf::from("/var/lib/server-monitor/config.toml")
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_listen() -> String {
    "127.0.0.1:8054".to_string()
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            query_timeout_secs: default_query_timeout(),
            max_concurrent_queries: default_max_concurrent_queries(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;

        anyhow::ensure!(config.monitor.interval_secs > 0, "monitor.interval_secs must be positive");
        anyhow::ensure!(
            config.monitor.query_timeout_secs > 0,
            "monitor.query_timeout_secs must be positive"
        );
        anyhow::ensure!(
            config.monitor.max_concurrent_queries > 0,
            "monitor.max_concurrent_queries must be positive"
        );

        Ok(config)
    }
}
