//! Application configuration.

use lendwatch_alerts::NotifierConfig;
use lendwatch_core::{
    LendingThresholds, RateNormalizer, ThresholdError, DEFAULT_APR_SOURCES,
    DEFAULT_COMPOUNDING_PERIODS,
};
use lendwatch_engine::{MonitorConfig, DEFAULT_CHANGE_THRESHOLD_PCT};
use lendwatch_feeds::{CacheConfig, DEFAULT_CACHE_TTL, DEFAULT_REQUEST_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Threshold(#[from] ThresholdError),
    #[error("Invalid threshold '{0}', expected TOKEN=PERCENT")]
    ThresholdArg(String),
    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Minimum lending rate per token, in percent.
    pub thresholds: LendingThresholds,
    /// Relative change (percent) required to notify again.
    pub change_threshold_pct: f64,
    pub cache_ttl_secs: u64,
    /// Interval between fetch cycles.
    pub fetch_interval_secs: u64,
    /// Upper bound on a single source request.
    pub request_timeout_secs: u64,
    /// Compounding periods per year for APR sources.
    pub compounding_periods: u32,
    /// Sources reporting simple APR.
    pub apr_sources: Vec<String>,
    pub database_url: String,
    pub max_concurrent_sends: usize,
    /// Logging level.
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            thresholds: LendingThresholds::default(),
            change_threshold_pct: DEFAULT_CHANGE_THRESHOLD_PCT,
            cache_ttl_secs: DEFAULT_CACHE_TTL.as_secs(),
            fetch_interval_secs: 120,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            compounding_periods: DEFAULT_COMPOUNDING_PERIODS,
            apr_sources: DEFAULT_APR_SOURCES.iter().map(|s| s.to_string()).collect(),
            database_url: "sqlite://data/bot.db".to_string(),
            max_concurrent_sends: NotifierConfig::default().max_concurrent_sends,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reject configurations the bot cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;

        if !self.change_threshold_pct.is_finite() || self.change_threshold_pct < 0.0 {
            return Err(invalid(
                "change_threshold_pct",
                format!("must be a non-negative percentage (got {})", self.change_threshold_pct),
            ));
        }
        if self.fetch_interval_secs == 0 {
            return Err(invalid("fetch_interval_secs", "must be greater than zero"));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs", "must be greater than zero"));
        }
        if self.compounding_periods == 0 {
            return Err(invalid("compounding_periods", "must be at least 1"));
        }
        if self.max_concurrent_sends == 0 {
            return Err(invalid("max_concurrent_sends", "must be at least 1"));
        }
        if self.database_url.trim().is_empty() {
            return Err(invalid("database_url", "must not be empty"));
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(invalid(
                "log_level",
                format!("expected one of {}", LOG_LEVELS.join(", ")),
            ));
        }
        Ok(())
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Parse a `TOKEN=PERCENT` override.
pub fn parse_threshold_arg(arg: &str) -> Result<(String, f64), ConfigError> {
    let (token, value) = arg
        .split_once('=')
        .ok_or_else(|| ConfigError::ThresholdArg(arg.to_string()))?;
    let token = token.trim();
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ThresholdArg(arg.to_string()))?;
    if token.is_empty() {
        return Err(ConfigError::ThresholdArg(arg.to_string()));
    }
    Ok((token.to_uppercase(), value))
}

impl From<&AppConfig> for CacheConfig {
    fn from(config: &AppConfig) -> Self {
        CacheConfig {
            ttl: Duration::from_secs(config.cache_ttl_secs),
            fetch_timeout: config.request_timeout(),
            normalizer: RateNormalizer::new(config.apr_sources.clone(), config.compounding_periods),
        }
    }
}

impl From<&AppConfig> for MonitorConfig {
    fn from(config: &AppConfig) -> Self {
        MonitorConfig {
            change_threshold_pct: config.change_threshold_pct,
        }
    }
}

impl From<&AppConfig> for NotifierConfig {
    fn from(config: &AppConfig) -> Self {
        NotifierConfig {
            max_concurrent_sends: config.max_concurrent_sends,
        }
    }
}
