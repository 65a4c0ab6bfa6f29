//! In-process mirror of the browser's tab table.
//!
//! The browser pushes its tabs through lifecycle commands; the engine reads
//! them back through [`TabHost`]. When the engine rewrites a tab's address the
//! mirror records it and emits `tab.navigate` so the host performs the real
//! navigation.

use crate::error::{LullError, Result};
use crate::host::channel::EventSink;
use crate::host::contract::EventName;
use crate::tab::{Tab, TabHost, TabId};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

pub struct MirroredTabs {
    tabs: Mutex<BTreeMap<TabId, Tab>>,
    events: EventSink,
}

impl MirroredTabs {
    #[must_use]
    pub fn new(events: EventSink) -> Self {
        Self {
            tabs: Mutex::new(BTreeMap::new()),
            events,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<TabId, Tab>>> {
        self.tabs
            .lock()
            .map_err(|_| LullError::Host("tab mirror lock poisoned".to_owned()))
    }

    /// Replace the whole table with a fresh snapshot from the host.
    pub fn replace_all(&self, tabs: Vec<Tab>) -> Result<()> {
        let mut table = self.lock()?;
        *table = tabs.into_iter().map(|tab| (tab.id, tab)).collect();
        Ok(())
    }

    pub fn upsert(&self, tab: Tab) -> Result<()> {
        let mut table = self.lock()?;
        if tab.active {
            deactivate_window(&mut table, tab.window_id, tab.id);
        }
        table.insert(tab.id, tab);
        Ok(())
    }

    pub fn remove(&self, tab_id: TabId) -> Result<Option<Tab>> {
        Ok(self.lock()?.remove(&tab_id))
    }

    /// Mark `tab_id` as the focused tab of its window.
    pub fn activate(&self, tab_id: TabId, window_id: Option<i64>) -> Result<()> {
        let mut table = self.lock()?;
        let Some(window_id) = window_id.or_else(|| table.get(&tab_id).map(|t| t.window_id)) else {
            return Ok(());
        };
        deactivate_window(&mut table, window_id, tab_id);
        if let Some(tab) = table.get_mut(&tab_id) {
            tab.active = true;
            tab.window_id = window_id;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn deactivate_window(table: &mut BTreeMap<TabId, Tab>, window_id: i64, except: TabId) {
    for tab in table.values_mut() {
        if tab.window_id == window_id && tab.id != except {
            tab.active = false;
        }
    }
}

#[async_trait]
impl TabHost for MirroredTabs {
    async fn get(&self, tab_id: TabId) -> Result<Option<Tab>> {
        Ok(self.lock()?.get(&tab_id).cloned())
    }

    async fn query_all(&self) -> Result<Vec<Tab>> {
        Ok(self.lock()?.values().cloned().collect())
    }

    async fn update_url(&self, tab_id: TabId, url: &str) -> Result<()> {
        {
            let mut table = self.lock()?;
            let tab = table
                .get_mut(&tab_id)
                .ok_or_else(|| LullError::Host(format!("no tab with id {tab_id}")))?;
            tab.url = Some(url.to_owned());
        }
        self.events.emit(
            EventName::TabNavigate,
            serde_json::json!({"tabId": tab_id, "url": url}),
        );
        Ok(())
    }
}
