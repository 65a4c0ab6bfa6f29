//! Per-tab ledgers: last activity and unsaved-form status.
//!
//! Each ledger is one JSON object (`{ "<tabId>": value }`) kept in the fast
//! session store when it exists, falling back to the durable store when the
//! session store is absent or failing. Ledger operations never return errors;
//! failures are logged and the caller carries on with timer management.

use crate::clock::Clock;
use crate::storage::{ACTIVITY_KEY, FORM_STATUS_KEY, KeyValueStore};
use crate::tab::TabId;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

/// Session store with durable fallback.
#[derive(Clone)]
pub struct TieredStore {
    session: Option<Arc<dyn KeyValueStore>>,
    durable: Arc<dyn KeyValueStore>,
}

impl TieredStore {
    #[must_use]
    pub fn new(session: Option<Arc<dyn KeyValueStore>>, durable: Arc<dyn KeyValueStore>) -> Self {
        Self { session, durable }
    }

    fn tiers(&self) -> impl Iterator<Item = (&'static str, &Arc<dyn KeyValueStore>)> {
        self.session
            .iter()
            .map(|s| ("session", s))
            .chain(std::iter::once(("durable", &self.durable)))
    }
}

async fn read_map<V: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> crate::Result<BTreeMap<TabId, V>> {
    let Some(value) = store.get(key).await? else {
        return Ok(BTreeMap::new());
    };
    match serde_json::from_value(value) {
        Ok(map) => Ok(map),
        Err(e) => {
            warn!("discarding malformed {key} ledger: {e}");
            Ok(BTreeMap::new())
        }
    }
}

async fn write_map<V: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    map: &BTreeMap<TabId, V>,
) -> crate::Result<()> {
    let value = serde_json::to_value(map)
        .map_err(|e| crate::LullError::Storage(format!("cannot encode {key} ledger: {e}")))?;
    store.set(key, value).await
}

/// A tab-id keyed map stored under one key of a [`TieredStore`].
#[derive(Clone)]
struct TabLedger<V> {
    key: &'static str,
    store: TieredStore,
    _value: PhantomData<fn() -> V>,
}

impl<V: Serialize + DeserializeOwned + Clone + Send> TabLedger<V> {
    fn new(key: &'static str, store: TieredStore) -> Self {
        Self {
            key,
            store,
            _value: PhantomData,
        }
    }

    async fn set(&self, tab_id: TabId, value: V) {
        for (tier, store) in self.store.tiers() {
            let result = async {
                let mut map = read_map::<V>(store.as_ref(), self.key).await?;
                map.insert(tab_id, value.clone());
                write_map(store.as_ref(), self.key, &map).await
            }
            .await;
            match result {
                Ok(()) => return,
                Err(e) => warn!(tab_id = tab_id, "{} {tier} write failed: {e}", self.key),
            }
        }
    }

    async fn get(&self, tab_id: TabId) -> Option<V> {
        for (tier, store) in self.store.tiers() {
            match read_map::<V>(store.as_ref(), self.key).await {
                Ok(map) => {
                    if let Some(value) = map.get(&tab_id) {
                        return Some(value.clone());
                    }
                }
                Err(e) => warn!(tab_id = tab_id, "{} {tier} read failed: {e}", self.key),
            }
        }
        None
    }

    /// Drop every entry whose id matches `doomed`, in every tier.
    async fn remove_where(&self, doomed: impl Fn(TabId) -> bool) -> usize {
        let mut removed = BTreeSet::new();
        for (tier, store) in self.store.tiers() {
            let result: crate::Result<Vec<TabId>> = async {
                let mut map = read_map::<V>(store.as_ref(), self.key).await?;
                let before: Vec<TabId> = map.keys().copied().filter(|id| doomed(*id)).collect();
                if before.is_empty() {
                    return Ok(before);
                }
                for id in &before {
                    map.remove(id);
                }
                write_map(store.as_ref(), self.key, &map).await?;
                Ok(before)
            }
            .await;
            match result {
                Ok(ids) => removed.extend(ids),
                Err(e) => warn!("{} {tier} cleanup failed: {e}", self.key),
            }
        }
        removed.len()
    }

    async fn tracked_ids(&self) -> BTreeSet<TabId> {
        let mut ids = BTreeSet::new();
        for (tier, store) in self.store.tiers() {
            match read_map::<V>(store.as_ref(), self.key).await {
                Ok(map) => ids.extend(map.keys().copied()),
                Err(e) => warn!("{} {tier} read failed: {e}", self.key),
            }
        }
        ids
    }
}

/// Tab id -> last interaction time (epoch ms).
#[derive(Clone)]
pub struct ActivityLedger {
    inner: TabLedger<u64>,
    clock: Arc<dyn Clock>,
}

impl ActivityLedger {
    #[must_use]
    pub fn new(store: TieredStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: TabLedger::new(ACTIVITY_KEY, store),
            clock,
        }
    }

    /// Record activity now.
    pub async fn touch(&self, tab_id: TabId) {
        let now = self.clock.now_ms();
        self.inner.set(tab_id, now).await;
    }

    /// Record activity at a reported time. Future timestamps are clamped to
    /// now so a skewed reporter cannot postpone suspension indefinitely.
    pub async fn touch_at(&self, tab_id: TabId, timestamp_ms: u64) {
        let at = timestamp_ms.min(self.clock.now_ms());
        self.inner.set(tab_id, at).await;
    }

    pub async fn get(&self, tab_id: TabId) -> Option<u64> {
        self.inner.get(tab_id).await
    }

    pub async fn remove(&self, tab_id: TabId) {
        self.inner.remove_where(|id| id == tab_id).await;
    }

    pub async fn tracked_ids(&self) -> BTreeSet<TabId> {
        self.inner.tracked_ids().await
    }

    /// Delete entries for tabs not in `live`. Returns how many were dropped.
    pub async fn retain_live(&self, live: &BTreeSet<TabId>) -> usize {
        self.inner.remove_where(|id| !live.contains(&id)).await
    }
}

/// Tab id -> "has unsaved form input", as reported by the content observer.
#[derive(Clone)]
pub struct FormStatusLedger {
    inner: TabLedger<bool>,
}

impl FormStatusLedger {
    #[must_use]
    pub fn new(store: TieredStore) -> Self {
        Self {
            inner: TabLedger::new(FORM_STATUS_KEY, store),
        }
    }

    pub async fn set(&self, tab_id: TabId, has_unsaved_forms: bool) {
        self.inner.set(tab_id, has_unsaved_forms).await;
    }

    /// Missing entries read as "no unsaved forms".
    pub async fn has_unsaved_forms(&self, tab_id: TabId) -> bool {
        self.inner.get(tab_id).await.unwrap_or(false)
    }

    pub async fn remove(&self, tab_id: TabId) {
        self.inner.remove_where(|id| id == tab_id).await;
    }

    pub async fn retain_live(&self, live: &BTreeSet<TabId>) -> usize {
        self.inner.remove_where(|id| !live.contains(&id)).await
    }
}
