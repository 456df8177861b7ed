//! Coordinator configuration via `txcoord.toml`
//!
//! Every field has a default, so an empty file is a valid configuration.
//! Environment variables override file values; see
//! [`CoordinatorConfig::apply_env_overrides`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use txcoord_concurrency::TransactionOptions;
use txcoord_core::{Error, Result};

/// Config file name
pub const CONFIG_FILE_NAME: &str = "txcoord.toml";

/// Overrides `reclamation_interval_ms`
pub const ENV_RECLAMATION_INTERVAL_MS: &str = "TXCOORD_RECLAMATION_INTERVAL_MS";
/// Overrides `short_timeout_ms`
pub const ENV_SHORT_TIMEOUT_MS: &str = "TXCOORD_SHORT_TIMEOUT_MS";
/// Overrides `checkpoint_interval_ms`
pub const ENV_CHECKPOINT_INTERVAL_MS: &str = "TXCOORD_CHECKPOINT_INTERVAL_MS";
/// Overrides `data_dir`
pub const ENV_DATA_DIR: &str = "TXCOORD_DATA_DIR";

/// Coordinator configuration loaded from `txcoord.toml`.
///
/// # Example
///
/// ```toml
/// reclamation_interval_ms = 10000
/// short_timeout_ms = 30000
/// checkpoint_interval_ms = 300000
/// data_dir = "/var/lib/txcoord"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Period of the reclamation task; 0 disables it
    pub reclamation_interval_ms: u64,
    /// Lifetime of SHORT transactions started without an explicit timeout
    pub short_timeout_ms: u64,
    /// Period of the checkpoint task; 0 disables it
    pub checkpoint_interval_ms: u64,
    /// Directory for the edit log and snapshots. Without it state is kept
    /// in memory only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            reclamation_interval_ms: 10_000,
            short_timeout_ms: 30_000,
            checkpoint_interval_ms: 300_000,
            data_dir: None,
        }
    }
}

impl CoordinatorConfig {
    /// Config for tests: no background tasks, in-memory state
    pub fn for_testing() -> Self {
        Self {
            reclamation_interval_ms: 0,
            checkpoint_interval_ms: 0,
            ..Self::default()
        }
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# txcoord transaction coordinator configuration
#
# How often timed-out short transactions are invalidated and the
# committed change-set ledger is pruned. 0 disables the task.
reclamation_interval_ms = 10000

# Lifetime of a short transaction before reclamation invalidates it.
short_timeout_ms = 30000

# How often a full state snapshot is written and the edit log truncated.
# 0 disables periodic checkpoints. Ignored without data_dir.
checkpoint_interval_ms = 300000

# Directory for the edit log and snapshots. When unset, coordinator
# state lives in memory only and is lost on restart.
# data_dir = "/var/lib/txcoord"
"#
    }

    /// Parse config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: CoordinatorConfig = toml::from_str(content)
            .map_err(|e| Error::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::InvalidConfig(msg) => {
                Error::InvalidConfig(format!("{} ({})", msg, path.display()))
            }
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::SerializationError(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `TXCOORD_*` environment variables on top of the current values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup(ENV_RECLAMATION_INTERVAL_MS) {
            self.reclamation_interval_ms = parse_millis(ENV_RECLAMATION_INTERVAL_MS, &v)?;
        }
        if let Some(v) = lookup(ENV_SHORT_TIMEOUT_MS) {
            self.short_timeout_ms = parse_millis(ENV_SHORT_TIMEOUT_MS, &v)?;
        }
        if let Some(v) = lookup(ENV_CHECKPOINT_INTERVAL_MS) {
            self.checkpoint_interval_ms = parse_millis(ENV_CHECKPOINT_INTERVAL_MS, &v)?;
        }
        if let Some(v) = lookup(ENV_DATA_DIR) {
            self.data_dir = if v.is_empty() {
                None
            } else {
                Some(PathBuf::from(v))
            };
        }
        self.validate()
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.short_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "short_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Reclamation period, `None` when disabled
    pub fn reclamation_interval(&self) -> Option<Duration> {
        non_zero_millis(self.reclamation_interval_ms)
    }

    /// Checkpoint period, `None` when disabled
    pub fn checkpoint_interval(&self) -> Option<Duration> {
        non_zero_millis(self.checkpoint_interval_ms)
    }

    /// Default SHORT transaction lifetime
    pub fn short_timeout(&self) -> Duration {
        Duration::from_millis(self.short_timeout_ms)
    }

    /// Options handed to the transaction manager
    pub fn transaction_options(&self) -> TransactionOptions {
        TransactionOptions {
            short_timeout: self.short_timeout(),
        }
    }
}

fn non_zero_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

fn parse_millis(name: &str, value: &str) -> Result<u64> {
    value.trim().parse().map_err(|e| {
        Error::InvalidConfig(format!("{}={:?} is not a number of milliseconds: {}", name, value, e))
    })
}
