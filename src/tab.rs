//! Tab snapshots and the host-environment seam.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Host-assigned tab id. The host may reuse an id after the tab is closed.
pub type TabId = i64;

/// Snapshot of one tab as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Tab {
    pub id: TabId,
    pub window_id: i64,
    pub url: Option<String>,
    pub title: String,
    pub fav_icon_url: Option<String>,
    /// Focused tab of its window.
    pub active: bool,
    pub pinned: bool,
    /// Currently emitting sound.
    pub audible: bool,
}

impl Tab {
    #[must_use]
    pub fn new(id: TabId, url: impl Into<String>) -> Self {
        Self {
            id,
            url: Some(url.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn url_str(&self) -> &str {
        self.url.as_deref().unwrap_or("")
    }
}

/// Loading status carried by a tab update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabStatus {
    Loading,
    Complete,
    Unloaded,
}

/// Changed fields of a tab update notification.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TabChange {
    pub url: Option<String>,
    pub status: Option<TabStatus>,
}

impl TabChange {
    /// Whether this update represents a navigation or finished page load.
    #[must_use]
    pub fn is_navigation(&self) -> bool {
        self.url.is_some() || self.status == Some(TabStatus::Complete)
    }
}

/// Host environment tab operations. Every call may fail because the tab
/// vanished or the host context was invalidated.
#[async_trait]
pub trait TabHost: Send + Sync + 'static {
    /// Look up a tab. A closed tab is `Ok(None)`.
    async fn get(&self, tab_id: TabId) -> Result<Option<Tab>>;

    /// Every live tab across all windows.
    async fn query_all(&self) -> Result<Vec<Tab>>;

    /// Navigate a tab to `url`.
    async fn update_url(&self, tab_id: TabId, url: &str) -> Result<()>;
}
