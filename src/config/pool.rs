//! Pool configuration structures.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::AppResult;

/// Acquire timeout used when none is configured.
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 5_000;

fn default_name() -> String {
    "default".into()
}

const fn default_acquire_timeout_ms() -> u64 {
    DEFAULT_ACQUIRE_TIMEOUT_MS
}

/// Pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Name used in logs and events.
    #[serde(default = "default_name")]
    pub name: String,
    /// Handles kept warm.
    #[serde(default)]
    pub min_size: usize,
    /// Upper bound on handles outstanding (idle + in use).
    pub max_size: usize,
    /// Default acquire timeout in milliseconds.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    /// Validation sweep interval in milliseconds. Sweep is disabled when unset.
    #[serde(default)]
    pub validation_interval_ms: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(10)
    }
}

impl PoolConfig {
    /// Configuration with the given `max_size` and defaults elsewhere.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            name: default_name(),
            min_size: 0,
            max_size,
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
            validation_interval_ms: None,
        }
    }

    /// Set the pool name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the warm size.
    #[must_use]
    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    /// Set the upper bound.
    #[must_use]
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the default acquire timeout.
    #[must_use]
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enable the validation sweep.
    #[must_use]
    pub fn with_validation_interval(mut self, interval: Duration) -> Self {
        self.validation_interval_ms = Some(u64::try_from(interval.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Default acquire timeout.
    #[must_use]
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Sweep interval, if the sweep is enabled.
    #[must_use]
    pub fn validation_interval(&self) -> Option<Duration> {
        self.validation_interval_ms.map(Duration::from_millis)
    }

    /// Validate pool configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_size == 0 {
            return Err("max_size must be greater than 0".into());
        }
        if self.min_size > self.max_size {
            return Err(format!(
                "min_size ({}) must not exceed max_size ({})",
                self.min_size, self.max_size
            ));
        }
        if self.acquire_timeout_ms == 0 {
            return Err("acquire_timeout_ms must be greater than 0".into());
        }
        if self.validation_interval_ms == Some(0) {
            return Err("validation_interval_ms must be greater than 0 when set".into());
        }
        Ok(())
    }

    /// Parse pool configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read configuration from `<PREFIX>_*` environment variables.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    /// Recognized: `MAX_SIZE` (required), `MIN_SIZE`, `ACQUIRE_TIMEOUT_MS`,
    /// `VALIDATION_INTERVAL_MS`, `NAME`.
    pub fn from_env(prefix: &str) -> Result<Self, String> {
        let _ = dotenvy::dotenv();

        let max_size = env_value::<usize>(prefix, "MAX_SIZE")?
            .ok_or_else(|| format!("{prefix}_MAX_SIZE is required"))?;
        let mut cfg = Self::new(max_size);
        if let Some(name) = env_value::<String>(prefix, "NAME")? {
            cfg.name = name;
        }
        if let Some(min_size) = env_value(prefix, "MIN_SIZE")? {
            cfg.min_size = min_size;
        }
        if let Some(timeout) = env_value(prefix, "ACQUIRE_TIMEOUT_MS")? {
            cfg.acquire_timeout_ms = timeout;
        }
        cfg.validation_interval_ms = env_value(prefix, "VALIDATION_INTERVAL_MS")?;
        cfg.validate()?;
        Ok(cfg)
    }
}

fn env_value<T>(prefix: &str, key: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let var = format!("{prefix}_{key}");
    match std::env::var(&var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| format!("{var}: {e}")),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(format!("{var}: {e}")),
    }
}

/// Configuration for several named pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSetConfig {
    /// Map of pool name to configuration.
    pub pools: HashMap<String, PoolConfig>,
}

impl PoolSetConfig {
    /// Validate all pools and ensure at least one pool exists.
    pub fn validate(&self) -> Result<(), String> {
        if self.pools.is_empty() {
            return Err("at least one pool must be defined".into());
        }
        for (name, pool) in &self.pools {
            pool.validate()
                .map_err(|e| format!("pool `{name}` invalid: {e}"))?;
        }
        Ok(())
    }

    /// Parse pool set configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading pool config {}", path.display()))?;
        Self::from_json_str(&raw)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("loading pool config {}", path.display()))
    }
}
