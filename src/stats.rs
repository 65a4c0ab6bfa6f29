//! Memory-savings statistics recorded on every suspension.
//!
//! Aggregation and broadcast live elsewhere; this module only maintains the
//! `memoryStats` record in the durable store.

use crate::clock::Clock;
use crate::error::{LullError, Result};
use crate::storage::{KeyValueStore, MEMORY_STATS_KEY};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Number of history entries kept in the record.
pub const HISTORY_LIMIT: usize = 500;

/// Estimated memory freed by suspending one tab, in megabytes.
pub const ESTIMATED_TAB_MEMORY_MB: f64 = 50.0;

/// One suspension in the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsEntry {
    pub timestamp: u64,
    pub url: String,
    pub memory_saved: f64,
}

/// Persisted `memoryStats` record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryStats {
    /// Total estimated megabytes saved.
    pub total_saved: f64,
    pub tabs_suspended: u64,
    pub history: Vec<SavingsEntry>,
}

impl MemoryStats {
    fn push(&mut self, entry: SavingsEntry) {
        self.total_saved += entry.memory_saved;
        self.tabs_suspended = self.tabs_suspended.saturating_add(1);
        self.history.push(entry);
        if self.history.len() > HISTORY_LIMIT {
            let drop_count = self.history.len().saturating_sub(HISTORY_LIMIT);
            self.history.drain(0..drop_count);
        }
    }
}

/// Appends suspension records to the durable `memoryStats` entry.
#[derive(Clone)]
pub struct StatsRecorder {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl StatsRecorder {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn load(&self) -> Result<MemoryStats> {
        let Some(value) = self.store.get(MEMORY_STATS_KEY).await? else {
            return Ok(MemoryStats::default());
        };
        Ok(serde_json::from_value(value).unwrap_or_else(|e| {
            warn!("resetting malformed memory stats: {e}");
            MemoryStats::default()
        }))
    }

    /// Record one suspension. Failures are logged, never returned: statistics
    /// must not undo a suspension that already happened.
    pub async fn record_suspension(&self, url: &str) {
        if let Err(e) = self.try_record(url).await {
            warn!("cannot record memory stats: {e}");
        }
    }

    async fn try_record(&self, url: &str) -> Result<()> {
        let mut stats = self.load().await?;
        stats.push(SavingsEntry {
            timestamp: self.clock.now_ms(),
            url: url.to_owned(),
            memory_saved: ESTIMATED_TAB_MEMORY_MB,
        });
        let value = serde_json::to_value(&stats)
            .map_err(|e| LullError::Storage(format!("cannot encode memory stats: {e}")))?;
        self.store.set(MEMORY_STATS_KEY, value).await
    }
}
