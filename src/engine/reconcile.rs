//! Reconciliation sweep.
//!
//! Makes persisted state agree with the live tab set: every monitorable tab
//! has exactly one timer, no timer or ledger entry outlives its tab, and
//! internal or suspended tabs carry no timer. Runs before the engine handles
//! anything, and again (minus the arming step) after each tab removal.

use super::Engine;
use crate::tab::TabId;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// What a sweep changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub live_tabs: usize,
    pub timers_created: usize,
    pub timers_cancelled: usize,
    pub activity_purged: usize,
    pub form_status_purged: usize,
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} live tabs, {} timers created, {} cancelled, {} activity and {} form entries purged",
            self.live_tabs,
            self.timers_created,
            self.timers_cancelled,
            self.activity_purged,
            self.form_status_purged
        )
    }
}

impl Engine {
    /// Full sweep. Fails only when the live tab set cannot be listed.
    pub async fn reconcile(&self) -> crate::Result<ReconcileReport> {
        let tabs = self.tabs.query_all().await?;
        let mut report = ReconcileReport {
            live_tabs: tabs.len(),
            ..ReconcileReport::default()
        };

        let armed: BTreeSet<TabId> = self
            .timers
            .list_all()
            .await?
            .into_iter()
            .map(|r| r.tab_id)
            .collect();

        // Session-tier activity does not survive a restart; a monitored tab
        // without a record counts as freshly active.
        let tracked = self.activity.tracked_ids().await;
        let mut monitorable = BTreeSet::new();
        for tab in &tabs {
            if !self.policy.is_monitorable(tab) {
                continue;
            }
            monitorable.insert(tab.id);
            if !tracked.contains(&tab.id) {
                self.activity.touch(tab.id).await;
            }
            if armed.contains(&tab.id) {
                continue;
            }
            if self.rearm(tab.id).await.is_some() {
                report.timers_created += 1;
            }
        }

        for tab_id in armed.difference(&monitorable) {
            debug!(tab_id = *tab_id, "dropping timer for closed or unmonitored tab");
            self.cancel_timer(*tab_id).await;
            report.timers_cancelled += 1;
        }

        let live: BTreeSet<TabId> = tabs.iter().map(|t| t.id).collect();
        report.activity_purged = self.activity.retain_live(&live).await;
        report.form_status_purged = self.forms.retain_live(&live).await;
        Ok(report)
    }

    /// Drop timers and ledger entries of tabs that no longer exist.
    pub async fn sweep_orphans(&self) -> crate::Result<ReconcileReport> {
        let tabs = self.tabs.query_all().await?;
        let live: BTreeSet<TabId> = tabs.iter().map(|t| t.id).collect();
        let mut report = ReconcileReport {
            live_tabs: live.len(),
            ..ReconcileReport::default()
        };

        for registration in self.timers.list_all().await? {
            if !live.contains(&registration.tab_id) {
                self.cancel_timer(registration.tab_id).await;
                report.timers_cancelled += 1;
            }
        }
        report.activity_purged = self.activity.retain_live(&live).await;
        report.form_status_purged = self.forms.retain_live(&live).await;
        Ok(report)
    }
}
