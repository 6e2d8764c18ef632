use crate::error::Error;
use crate::stats::classifier::MAX_STALE_HOURS;
use crate::stats::scheduler::{MAX_INTERVAL_MINUTES, MAX_LAG_DAYS};
use crate::stats::window::MAX_WINDOW_DAYS;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable holding the config file path
pub const CONFIG_PATH_ENV: &str = "WASTE_MONITOR_CONFIG";

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

/// API server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// API server address
    #[serde(default = "default_api_address")]
    pub address: String,
    /// API server port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_api_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL. Empty selects the in-memory store.
    #[serde(default)]
    pub url: String,
    /// Connection pool max size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Automatic migration on startup
    #[serde(default = "default_true")]
    pub auto_migrate: bool,
}

fn default_max_connections() -> u32 {
    5
}

/// Daily statistics scheduler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatsConfig {
    /// Whether the recurring rebuild runs at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Minutes between scheduled rebuilds
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    /// How many days behind today the scheduled rebuild targets
    #[serde(default = "default_lag_days")]
    pub lag_days: u32,
}

fn default_true() -> bool {
    true
}

fn default_interval_minutes() -> u64 {
    60
}

fn default_lag_days() -> u32 {
    1
}

/// Defaults for derived container status when a request doesn't supply them
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusConfig {
    /// Trailing window for the live detection count
    #[serde(default = "default_window_days")]
    pub window_days: i64,
    /// Count at or above which a container is full
    #[serde(default = "default_full_threshold")]
    pub full_threshold: i64,
    /// Count at or above which a container is medium
    #[serde(default = "default_medium_threshold")]
    pub medium_threshold: i64,
    /// Hours since last connection before a container counts as offline
    #[serde(default = "default_stale_hours")]
    pub stale_hours: i64,
}

fn default_window_days() -> i64 {
    7
}

fn default_full_threshold() -> i64 {
    50
}

fn default_medium_threshold() -> i64 {
    20
}

fn default_stale_hours() -> i64 {
    24
}

/// Container list pagination bounds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    /// Hard upper bound on `limit`
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

fn default_page_size() -> usize {
    20
}

fn default_max_page_size() -> usize {
    100
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            address: default_api_address(),
            port: default_api_port(),
            log_level: default_log_level(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            auto_migrate: true,
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: default_interval_minutes(),
            lag_days: default_lag_days(),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            full_threshold: default_full_threshold(),
            medium_threshold: default_medium_threshold(),
            stale_hours: default_stale_hours(),
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
    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_INTERVAL_MINUTES).contains(&self.stats.interval_minutes) {
            return Err(Error::Config(format!(
                "stats.interval_minutes must be within 1..={}",
                MAX_INTERVAL_MINUTES
            ))
            .into());
        }
        if self.stats.lag_days > MAX_LAG_DAYS {
            return Err(
                Error::Config(format!("stats.lag_days must be at most {}", MAX_LAG_DAYS)).into(),
            );
        }
        if self.query.max_page_size == 0 {
            return Err(Error::Config("query.max_page_size must be positive".into()).into());
        }
        if self.query.default_page_size == 0
            || self.query.default_page_size > self.query.max_page_size
        {
            return Err(Error::Config(format!(
                "query.default_page_size must be within 1..={}",
                self.query.max_page_size
            ))
            .into());
        }
        if self.status.window_days <= 0 || self.status.stale_hours <= 0 {
            return Err(
                Error::Config("status.window_days and status.stale_hours must be positive".into())
                    .into(),
            );
        }
        if self.status.stale_hours > MAX_STALE_HOURS {
            return Err(Error::Config(format!(
                "status.stale_hours must be at most {}",
                MAX_STALE_HOURS
            ))
            .into());
        }
        if self.status.window_days > MAX_WINDOW_DAYS {
            return Err(Error::Config(format!(
                "status.window_days must be at most {}",
                MAX_WINDOW_DAYS
            ))
            .into());
        }
        if self.status.full_threshold < 1 || self.status.medium_threshold < 1 {
            return Err(Error::Config("status thresholds must be at least 1".into()).into());
        }
        Ok(())
    }
}

/// Load configuration from a file or use default
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config: Config = match config_path {
        Some(path) => {
            let config_str = std::fs::read_to_string(path)
                .context(format!("Failed to read config file: {:?}", path))?;

            if path.extension().map_or(false, |ext| ext == "json") {
                serde_json::from_str(&config_str).context("Failed to parse JSON config")?
            } else if path.extension().map_or(false, |ext| ext == "toml") {
                toml::from_str(&config_str).context("Failed to parse TOML config")?
            } else {
                return Err(
                    Error::Config(format!("Unsupported config file format: {:?}", path)).into(),
                );
            }
        }
        None => Config::default(),
    };

    config.validate()?;
    Ok(config)
}
