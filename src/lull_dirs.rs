//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate locations.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Data | `~/Library/Application Support/lull/` | `~/.local/share/lull/` |
//! | Config | `~/Library/Application Support/lull/` | `~/.config/lull/` |
//!
//! Overrides for tests and custom deployments:
//! - `LULL_DATA_DIR` overrides [`data_dir`]
//! - `LULL_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Root for persisted state: the durable store and the alarm registry.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("LULL_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("lull"))
        .unwrap_or_else(|| PathBuf::from("/tmp/lull-data"))
}

/// Directory holding `config.toml`.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("LULL_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("lull"))
        .unwrap_or_else(|| PathBuf::from("/tmp/lull-config"))
}

/// Host config file (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Durable key-value store file (`data_dir()/store.json`).
#[must_use]
pub fn store_file() -> PathBuf {
    data_dir().join("store.json")
}

/// Durable alarm registry (`data_dir()/alarms.json`).
#[must_use]
pub fn alarms_file() -> PathBuf {
    data_dir().join("alarms.json")
}
