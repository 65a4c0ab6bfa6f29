//! File-backed alarm registry.
//!
//! Stands in for the host's own durable alarm facility when lull runs as a
//! standalone process. Registrations are persisted to `alarms.json` on every
//! mutation so a restarted process can answer "when does tab X fire" before it
//! has seen a single event.

use super::memory::AlarmTable;
use super::{Alarm, AlarmBackend};
use crate::error::Result;
use crate::storage::{read_json_lenient, write_json_atomic};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// Persisted alarm registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AlarmState {
    /// Schema version.
    #[serde(default = "default_state_version")]
    version: u8,
    #[serde(default)]
    alarms: Vec<Alarm>,
}

fn default_state_version() -> u8 {
    1
}

/// Durable alarm backend persisted as JSON.
pub struct FileAlarmBackend {
    path: PathBuf,
    table: Mutex<AlarmTable>,
}

impl FileAlarmBackend {
    /// Open the registry at `path`, loading any persisted alarms.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state: AlarmState = read_json_lenient(&path).await?.unwrap_or_default();
        debug!(
            "loaded {} alarm registrations from {}",
            state.alarms.len(),
            path.display()
        );
        Ok(Self {
            path,
            table: Mutex::new(AlarmTable::from_alarms(state.alarms)),
        })
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, table: &AlarmTable) -> Result<()> {
        let state = AlarmState {
            version: default_state_version(),
            alarms: table.all(),
        };
        write_json_atomic(&self.path, &state).await
    }
}

#[async_trait]
impl AlarmBackend for FileAlarmBackend {
    async fn create(&self, alarm: Alarm) -> Result<()> {
        let mut table = self.table.lock().await;
        let mut next = table.clone();
        next.insert(alarm);
        self.persist(&next).await?;
        *table = next;
        Ok(())
    }

    async fn clear(&self, name: &str) -> Result<bool> {
        let mut table = self.table.lock().await;
        let mut next = table.clone();
        if next.remove(name).is_none() {
            return Ok(false);
        }
        self.persist(&next).await?;
        *table = next;
        Ok(true)
    }

    async fn get(&self, name: &str) -> Result<Option<Alarm>> {
        Ok(self.table.lock().await.get(name))
    }

    async fn get_all(&self) -> Result<Vec<Alarm>> {
        Ok(self.table.lock().await.all())
    }

    async fn take_due(&self, now_ms: u64) -> Result<Vec<Alarm>> {
        let mut table = self.table.lock().await;
        let mut next = table.clone();
        let due = next.drain_due(now_ms);
        if due.is_empty() {
            return Ok(due);
        }
        self.persist(&next).await?;
        *table = next;
        Ok(due)
    }
}
