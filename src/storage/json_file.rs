//! Durable JSON-file store.
//!
//! The whole key space is one JSON object on disk. Every mutation rewrites the
//! file atomically, so a process killed mid-write leaves either the old or the
//! new contents, never a torn file.

use super::{KeyValueStore, read_json_lenient, write_json_atomic};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// File-backed durable store.
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, serde_json::Value>>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading any existing contents.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries: BTreeMap<String, serde_json::Value> =
            read_json_lenient(&path).await?.unwrap_or_default();
        debug!("opened durable store {} ({} keys)", path.display(), entries.len());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(key.to_owned(), value);
        if let Err(e) = write_json_atomic(&self.path, &*entries).await {
            // Keep memory consistent with what is on disk.
            match previous {
                Some(previous) => entries.insert(key.to_owned(), previous),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let Some(previous) = entries.remove(key) else {
            return Ok(());
        };
        if let Err(e) = write_json_atomic(&self.path, &*entries).await {
            entries.insert(key.to_owned(), previous);
            return Err(e);
        }
        Ok(())
    }
}
