//! Key-value stores backing the ledgers, settings, and statistics.
//!
//! Two tiers exist at runtime: a fast *session* store that lives only as long
//! as the process (and may be missing entirely in some execution contexts),
//! and a *durable* store that survives restarts.

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use crate::error::{LullError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;

/// Durable store key for user settings.
pub const SETTINGS_KEY: &str = "settings";
/// Durable store key for memory statistics.
pub const MEMORY_STATS_KEY: &str = "memoryStats";
/// Session-preferred key for the activity ledger.
pub const ACTIVITY_KEY: &str = "activity";
/// Session-preferred key for the form-status ledger.
pub const FORM_STATUS_KEY: &str = "formStatus";

/// Async JSON key-value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    /// Read a key. Missing keys are `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Write a key, replacing any existing value.
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()>;

    /// Remove a key. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Serialize `value` as pretty JSON and replace `path` atomically
/// (write to a sibling temp file, then rename).
pub(crate) async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            LullError::Storage(format!("cannot create directory {}: {e}", parent.display()))
        })?;
    }

    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| LullError::Storage(format!("cannot serialize {}: {e}", path.display())))?;
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, json).await.map_err(|e| {
        LullError::Storage(format!("cannot write temp file {}: {e}", tmp_path.display()))
    })?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| LullError::Storage(format!("cannot finalize {}: {e}", path.display())))?;
    Ok(())
}

/// Read a JSON file. Missing files are `Ok(None)`; malformed files are
/// logged and treated as missing so a corrupt file never blocks startup.
pub(crate) async fn read_json_lenient<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> Result<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(LullError::Storage(format!(
                "cannot read {}: {e}",
                path.display()
            )));
        }
    };

    match serde_json::from_slice::<T>(&bytes) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!("ignoring malformed JSON at {}: {e}", path.display());
            Ok(None)
        }
    }
}
