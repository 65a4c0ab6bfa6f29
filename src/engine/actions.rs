//! Suspend and restore, single and bulk.

use super::Engine;
use crate::policy::{ExclusionReason, Verdict};
use crate::suspended::restorable_url;
use crate::tab::TabId;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Result of a suspend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "reason")]
pub enum SuspendOutcome {
    Suspended,
    Excluded(ExclusionReason),
    /// The tab closed before it could be rewritten.
    Gone,
    /// The host rejected the navigation.
    Failed,
}

impl SuspendOutcome {
    #[must_use]
    pub fn succeeded(self) -> bool {
        matches!(self, Self::Suspended)
    }
}

/// Result of a restore request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RestoreOutcome {
    Restored,
    NotSuspended,
    Gone,
    /// The suspended address carried no restorable http(s) url.
    InvalidUrl,
    Failed,
}

impl RestoreOutcome {
    #[must_use]
    pub fn succeeded(self) -> bool {
        matches!(self, Self::Restored)
    }
}

/// One entry of a bulk suspend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSuspend {
    pub tab_id: TabId,
    pub outcome: SuspendOutcome,
}

/// One entry of a bulk restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRestore {
    pub tab_id: TabId,
    pub outcome: RestoreOutcome,
}

impl Engine {
    /// Suspend one tab now, subject to the exclusion policy.
    ///
    /// Eligibility is checked against a fresh snapshot and the tab is fetched
    /// again right before the rewrite, so the encoded url is the one the tab
    /// shows at that moment rather than whatever it showed when a timer was
    /// armed.
    pub async fn suspend(&self, tab_id: TabId) -> SuspendOutcome {
        let Some(tab) = self.fetch(tab_id).await else {
            return SuspendOutcome::Gone;
        };
        let unsaved = self.forms.has_unsaved_forms(tab_id).await;
        if let Verdict::Excluded(reason) = self.policy.evaluate(&tab, &self.settings, unsaved) {
            debug!(tab_id = tab_id, %reason, "suspend refused");
            return SuspendOutcome::Excluded(reason);
        }

        let Some(tab) = self.fetch(tab_id).await else {
            return SuspendOutcome::Gone;
        };
        if let Verdict::Excluded(reason) = self.policy.evaluate(&tab, &self.settings, unsaved) {
            debug!(tab_id = tab_id, %reason, "tab changed before suspend");
            return SuspendOutcome::Excluded(reason);
        }

        let original = tab.url_str().to_owned();
        let encoded = self.policy.page().encode(
            &original,
            &tab.title,
            tab.fav_icon_url.as_deref(),
            self.clock.now_ms(),
        );
        if let Err(e) = self.tabs.update_url(tab_id, &encoded).await {
            warn!(tab_id = tab_id, "suspend navigation failed: {e}");
            return SuspendOutcome::Failed;
        }

        self.stats.record_suspension(&original).await;
        self.cancel_timer(tab_id).await;
        self.activity.remove(tab_id).await;
        self.forms.remove(tab_id).await;
        info!(tab_id = tab_id, url = %original, "tab suspended");
        SuspendOutcome::Suspended
    }

    /// Navigate a suspended tab back to its original url and resume
    /// monitoring it.
    pub async fn restore(&self, tab_id: TabId) -> RestoreOutcome {
        let Some(tab) = self.fetch(tab_id).await else {
            return RestoreOutcome::Gone;
        };
        let page = self.policy.page();
        if !page.is_suspended_url(tab.url_str()) {
            return RestoreOutcome::NotSuspended;
        }
        let Some(target) = page
            .decode(tab.url_str())
            .and_then(|suspended| restorable_url(&suspended.url))
        else {
            warn!(tab_id = tab_id, "suspended address has no restorable url");
            return RestoreOutcome::InvalidUrl;
        };

        if let Err(e) = self.tabs.update_url(tab_id, &target).await {
            warn!(tab_id = tab_id, "restore navigation failed: {e}");
            return RestoreOutcome::Failed;
        }

        self.forms.remove(tab_id).await;
        self.monitor(tab_id).await;
        info!(tab_id = tab_id, url = %target, "tab restored");
        RestoreOutcome::Restored
    }

    /// Suspend every monitorable tab except `keep`. Per-tab failures do not
    /// stop the sweep.
    pub async fn suspend_all_except(&self, keep: Option<TabId>) -> Vec<BulkSuspend> {
        let tabs = match self.tabs.query_all().await {
            Ok(tabs) => tabs,
            Err(e) => {
                warn!("cannot list tabs for bulk suspend: {e}");
                return Vec::new();
            }
        };

        let mut results = Vec::new();
        for tab in tabs {
            if Some(tab.id) == keep || !self.policy.is_monitorable(&tab) {
                continue;
            }
            let outcome = self.suspend(tab.id).await;
            results.push(BulkSuspend {
                tab_id: tab.id,
                outcome,
            });
        }
        let suspended = results.iter().filter(|r| r.outcome.succeeded()).count();
        info!(suspended, considered = results.len(), "bulk suspend finished");
        results
    }

    /// Restore every suspended tab.
    pub async fn restore_all(&self) -> Vec<BulkRestore> {
        let tabs = match self.tabs.query_all().await {
            Ok(tabs) => tabs,
            Err(e) => {
                warn!("cannot list tabs for bulk restore: {e}");
                return Vec::new();
            }
        };

        let mut results = Vec::new();
        for tab in tabs {
            if !self.policy.page().is_suspended_url(tab.url_str()) {
                continue;
            }
            let outcome = self.restore(tab.id).await;
            results.push(BulkRestore {
                tab_id: tab.id,
                outcome,
            });
        }
        let restored = results.iter().filter(|r| r.outcome.succeeded()).count();
        info!(restored, considered = results.len(), "bulk restore finished");
        results
    }
}
