//! Configuration for DuraKV
//!
//! Centralized configuration with sensible defaults, a builder, and an
//! environment loader.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{KvError, Result};

/// Environment variable prefix for [`Config::from_env`]
pub const ENV_PREFIX: &str = "DURAKV_";

/// Main configuration for a DuraKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Persistence Configuration
    // -------------------------------------------------------------------------
    /// Snapshot file location. `None` means in-memory only.
    pub snapshot_path: Option<PathBuf>,

    // -------------------------------------------------------------------------
    // Durability Configuration
    // -------------------------------------------------------------------------
    /// Request a background flush after every mutation
    pub auto_save: bool,

    /// Interval between periodic background flushes
    pub save_interval: Duration,

    /// Persist one final snapshot when the store is closed
    pub save_on_shutdown: bool,

    /// Additional attempts after a failed save
    pub retry_attempts: u32,

    /// Fixed delay between save attempts
    pub retry_delay: Duration,

    // -------------------------------------------------------------------------
    // Operation Configuration
    // -------------------------------------------------------------------------
    /// Timeout for calls the durable store makes into the inner store
    pub op_timeout: Duration,
}

/// The knobs [`crate::DurableStore`] needs
#[derive(Debug, Clone)]
pub struct DurabilityConfig {
    pub auto_save: bool,
    pub save_interval: Duration,
    pub save_on_shutdown: bool,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub op_timeout: Duration,
}

impl Default for DurabilityConfig {
    fn default() -> Self {
        Self {
            auto_save: true,
            save_interval: Duration::from_secs(30),
            save_on_shutdown: true,
            retry_attempts: 3,
            retry_delay: Duration::from_secs(1),
            op_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let durability = DurabilityConfig::default();
        Self {
            snapshot_path: None,
            auto_save: durability.auto_save,
            save_interval: durability.save_interval,
            save_on_shutdown: durability.save_on_shutdown,
            retry_attempts: durability.retry_attempts,
            retry_delay: durability.retry_delay,
            op_timeout: durability.op_timeout,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load configuration from `DURAKV_*` environment variables over defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{}{}", ENV_PREFIX, suffix));
        let mut config = Config::default();

        if let Some(path) = var("PERSISTENCE_PATH") {
            config.snapshot_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = var("AUTO_SAVE") {
            config.auto_save = parse_bool("AUTO_SAVE", &raw)?;
        }
        if let Some(raw) = var("SAVE_INTERVAL_SECS") {
            config.save_interval = Duration::from_secs(parse_num("SAVE_INTERVAL_SECS", &raw)?);
        }
        if let Some(raw) = var("SAVE_ON_SHUTDOWN") {
            config.save_on_shutdown = parse_bool("SAVE_ON_SHUTDOWN", &raw)?;
        }
        if let Some(raw) = var("RETRY_ATTEMPTS") {
            config.retry_attempts = parse_num("RETRY_ATTEMPTS", &raw)?;
        }
        if let Some(raw) = var("RETRY_DELAY_MS") {
            config.retry_delay = Duration::from_millis(parse_num("RETRY_DELAY_MS", &raw)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the store cannot run with
    pub fn validate(&self) -> Result<()> {
        if let Some(path) = &self.snapshot_path {
            if path.as_os_str().is_empty() {
                return Err(KvError::Config("snapshot_path cannot be empty".to_string()));
            }
        }
        if self.save_interval.is_zero() {
            return Err(KvError::Config("save_interval must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Project the durable-store settings
    pub fn durability(&self) -> DurabilityConfig {
        DurabilityConfig {
            auto_save: self.auto_save,
            save_interval: self.save_interval,
            save_on_shutdown: self.save_on_shutdown,
            retry_attempts: self.retry_attempts,
            retry_delay: self.retry_delay,
            op_timeout: self.op_timeout,
        }
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(KvError::Config(format!(
            "invalid {}{}: {} (expected true or false)",
            ENV_PREFIX, name, other
        ))),
    }
}

fn parse_num<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| KvError::Config(format!("invalid {}{}: {}", ENV_PREFIX, name, raw)))
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the snapshot file path
    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.snapshot_path = Some(path.into());
        self
    }

    /// Enable or disable flush-after-mutation
    pub fn auto_save(mut self, enabled: bool) -> Self {
        self.config.auto_save = enabled;
        self
    }

    /// Set the periodic flush interval
    pub fn save_interval(mut self, interval: Duration) -> Self {
        self.config.save_interval = interval;
        self
    }

    /// Enable or disable the final save on close
    pub fn save_on_shutdown(mut self, enabled: bool) -> Self {
        self.config.save_on_shutdown = enabled;
        self
    }

    /// Set the number of retries after a failed save
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.config.retry_attempts = attempts;
        self
    }

    /// Set the delay between save attempts
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    /// Set the timeout for internal store calls
    pub fn op_timeout(mut self, timeout: Duration) -> Self {
        self.config.op_timeout = timeout;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
