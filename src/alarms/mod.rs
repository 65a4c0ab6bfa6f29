//! Durable timer service.
//!
//! Wraps a host alarm facility ([`AlarmBackend`]) with one non-periodic
//! registration per tab, named `suspend-tab-<id>`. Registrations live in the
//! backend, not in process memory, so they survive process death.

pub mod file;
pub mod memory;

pub use file::FileAlarmBackend;
pub use memory::MemoryAlarmBackend;

use crate::clock::{Clock, MINUTE_MS};
use crate::error::Result;
use crate::tab::TabId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Prefix of every alarm name owned by the suspension scheduler.
pub const ALARM_PREFIX: &str = "suspend-tab-";

/// A host alarm: fire once at `scheduled_time` (epoch ms).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    pub name: String,
    pub scheduled_time: u64,
}

/// Host alarm facility. `create` replaces any alarm with the same name.
#[async_trait]
pub trait AlarmBackend: Send + Sync + 'static {
    async fn create(&self, alarm: Alarm) -> Result<()>;

    /// Remove an alarm. Returns `true` when one existed.
    async fn clear(&self, name: &str) -> Result<bool>;

    async fn get(&self, name: &str) -> Result<Option<Alarm>>;

    async fn get_all(&self) -> Result<Vec<Alarm>>;

    /// Remove and return every alarm due at `now_ms` (one-shot firing).
    async fn take_due(&self, now_ms: u64) -> Result<Vec<Alarm>>;
}

/// Live registration for one tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerRegistration {
    pub tab_id: TabId,
    /// Absolute fire time, epoch ms.
    pub fire_at_ms: u64,
}

/// Deterministic alarm name for a tab.
#[must_use]
pub fn alarm_name(tab_id: TabId) -> String {
    format!("{ALARM_PREFIX}{tab_id}")
}

/// Inverse of [`alarm_name`]. Foreign alarm names yield `None`.
#[must_use]
pub fn parse_alarm_name(name: &str) -> Option<TabId> {
    name.strip_prefix(ALARM_PREFIX)?.parse().ok()
}

fn to_registration(alarm: &Alarm) -> Option<TimerRegistration> {
    parse_alarm_name(&alarm.name).map(|tab_id| TimerRegistration {
        tab_id,
        fire_at_ms: alarm.scheduled_time,
    })
}

/// Per-tab timer service over a durable alarm backend.
#[derive(Clone)]
pub struct TimerService {
    backend: Arc<dyn AlarmBackend>,
    clock: Arc<dyn Clock>,
}

impl TimerService {
    #[must_use]
    pub fn new(backend: Arc<dyn AlarmBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    /// Create or replace the registration for `tab_id`, firing after
    /// `delay_minutes` (never less than one minute).
    pub async fn schedule(&self, tab_id: TabId, delay_minutes: u32) -> Result<TimerRegistration> {
        let delay_ms = u64::from(delay_minutes.max(1)).saturating_mul(MINUTE_MS);
        let fire_at_ms = self.clock.now_ms().saturating_add(delay_ms);
        self.backend
            .create(Alarm {
                name: alarm_name(tab_id),
                scheduled_time: fire_at_ms,
            })
            .await?;
        Ok(TimerRegistration { tab_id, fire_at_ms })
    }

    /// Remove the registration for `tab_id`. Idempotent.
    pub async fn cancel(&self, tab_id: TabId) -> Result<bool> {
        self.backend.clear(&alarm_name(tab_id)).await
    }

    pub async fn get(&self, tab_id: TabId) -> Result<Option<TimerRegistration>> {
        let alarm = self.backend.get(&alarm_name(tab_id)).await?;
        Ok(alarm.as_ref().and_then(to_registration))
    }

    /// Every live registration, soonest first.
    pub async fn list_all(&self) -> Result<Vec<TimerRegistration>> {
        let mut registrations: Vec<TimerRegistration> = self
            .backend
            .get_all()
            .await?
            .iter()
            .filter_map(to_registration)
            .collect();
        registrations.sort_by_key(|r| (r.fire_at_ms, r.tab_id));
        Ok(registrations)
    }

    /// Fire every due registration. Returned tab ids are no longer registered.
    pub async fn take_due(&self) -> Result<Vec<TabId>> {
        let now = self.clock.now_ms();
        let due = self.backend.take_due(now).await?;
        Ok(due
            .iter()
            .filter_map(|alarm| parse_alarm_name(&alarm.name))
            .collect())
    }
}
