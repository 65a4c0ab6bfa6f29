//! In-memory alarm table, shared by both backends.

use super::{Alarm, AlarmBackend};
use crate::error::{LullError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Alarm registrations keyed by name.
#[derive(Debug, Clone, Default)]
pub(crate) struct AlarmTable {
    alarms: BTreeMap<String, Alarm>,
}

impl AlarmTable {
    pub(crate) fn from_alarms(alarms: Vec<Alarm>) -> Self {
        let alarms = alarms
            .into_iter()
            .map(|alarm| (alarm.name.clone(), alarm))
            .collect();
        Self { alarms }
    }

    pub(crate) fn insert(&mut self, alarm: Alarm) {
        self.alarms.insert(alarm.name.clone(), alarm);
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<Alarm> {
        self.alarms.remove(name)
    }

    pub(crate) fn get(&self, name: &str) -> Option<Alarm> {
        self.alarms.get(name).cloned()
    }

    pub(crate) fn all(&self) -> Vec<Alarm> {
        self.alarms.values().cloned().collect()
    }

    /// Remove and return every alarm due at `now_ms`, earliest first.
    pub(crate) fn drain_due(&mut self, now_ms: u64) -> Vec<Alarm> {
        let due_names: Vec<String> = self
            .alarms
            .values()
            .filter(|alarm| alarm.scheduled_time <= now_ms)
            .map(|alarm| alarm.name.clone())
            .collect();

        let mut due: Vec<Alarm> = due_names
            .iter()
            .filter_map(|name| self.alarms.remove(name))
            .collect();
        due.sort_by_key(|alarm| alarm.scheduled_time);
        due
    }
}

/// Volatile alarm backend for tests and embedders that bring their own
/// persistence.
#[derive(Debug, Default)]
pub struct MemoryAlarmBackend {
    table: Mutex<AlarmTable>,
}

impl MemoryAlarmBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, AlarmTable>> {
        self.table
            .lock()
            .map_err(|_| LullError::Alarm("alarm table lock poisoned".to_owned()))
    }
}

#[async_trait]
impl AlarmBackend for MemoryAlarmBackend {
    async fn create(&self, alarm: Alarm) -> Result<()> {
        self.lock()?.insert(alarm);
        Ok(())
    }

    async fn clear(&self, name: &str) -> Result<bool> {
        Ok(self.lock()?.remove(name).is_some())
    }

    async fn get(&self, name: &str) -> Result<Option<Alarm>> {
        Ok(self.lock()?.get(name))
    }

    async fn get_all(&self) -> Result<Vec<Alarm>> {
        Ok(self.lock()?.all())
    }

    async fn take_due(&self, now_ms: u64) -> Result<Vec<Alarm>> {
        Ok(self.lock()?.drain_due(now_ms))
    }
}
