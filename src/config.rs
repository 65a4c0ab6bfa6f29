//! Host process configuration.
//!
//! This is the TOML file the `lull-host` binary reads at start. User-facing
//! suspension settings are not here; they live in the durable store under
//! `settings` and are reloaded on demand.

use crate::error::{LullError, Result};
use crate::host::channel::{ChannelOptions, DEFAULT_TICK_INTERVAL};
use crate::suspended::DEFAULT_SUSPENDED_PAGE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level host configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LullConfig {
    pub storage: StorageConfig,
    pub runtime: RuntimeConfig,
}

/// Where persisted state lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Durable key-value store file. `None` = `lull_dirs::store_file()`.
    pub store_path: Option<PathBuf>,
    /// Alarm registry file. `None` = `lull_dirs::alarms_file()`.
    pub alarms_path: Option<PathBuf>,
    /// Keep ledgers in a process-lifetime session tier before the durable
    /// store.
    pub session_store: bool,
}

/// Router and bridge tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Seconds between alarm polls.
    pub tick_interval_secs: u64,
    pub request_capacity: usize,
    pub event_capacity: usize,
    /// Address of the page suspended tabs are rewritten to.
    pub suspended_page: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let channel = ChannelOptions::default();
        Self {
            tick_interval_secs: DEFAULT_TICK_INTERVAL.as_secs(),
            request_capacity: channel.request_capacity,
            event_capacity: channel.event_capacity,
            suspended_page: DEFAULT_SUSPENDED_PAGE.to_owned(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            alarms_path: None,
            session_store: true,
        }
    }
}

impl StorageConfig {
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(crate::lull_dirs::store_file)
    }

    #[must_use]
    pub fn alarms_path(&self) -> PathBuf {
        self.alarms_path
            .clone()
            .unwrap_or_else(crate::lull_dirs::alarms_file)
    }
}

impl RuntimeConfig {
    #[must_use]
    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            request_capacity: self.request_capacity.max(1),
            event_capacity: self.event_capacity.max(1),
            tick_interval: Duration::from_secs(self.tick_interval_secs.max(1)),
        }
    }
}

impl LullConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| LullError::Config(e.to_string()))
    }

    /// Load from `path` when it exists, defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be
    /// serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| LullError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default config file path: `lull_dirs::config_dir()/config.toml`.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        crate::lull_dirs::config_file()
    }
}
