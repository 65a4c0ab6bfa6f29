//! Suspension state machine.
//!
//! Per tab: `Unmonitored` (internal page or already suspended) ->
//! `Monitored` (one live timer) -> `Suspended` -> `Monitored` again on
//! restore. The state is never stored; it is derived from the tab's address
//! and the timer registry, which is what lets a freshly started process pick
//! up where a dead one left off.
//!
//! Every host call can fail because the tab vanished or the host context was
//! invalidated. Handlers absorb those failures (log and no-op) and keep the
//! "one timer per monitored tab" invariant through cancel-then-schedule.

mod actions;
mod countdown;
mod reconcile;

pub use actions::{BulkRestore, BulkSuspend, RestoreOutcome, SuspendOutcome};
pub use countdown::{Countdown, TabCountdown};
pub use reconcile::ReconcileReport;

use crate::alarms::{AlarmBackend, TimerRegistration, TimerService};
use crate::clock::Clock;
use crate::ledger::{ActivityLedger, FormStatusLedger, TieredStore};
use crate::policy::{ExclusionPolicy, ExclusionReason, Verdict};
use crate::settings::Settings;
use crate::stats::StatsRecorder;
use crate::storage::KeyValueStore;
use crate::suspended::SuspendedPage;
use crate::tab::{Tab, TabChange, TabHost, TabId};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Derived lifecycle state of one tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TabState {
    Unmonitored,
    Monitored,
    Suspended,
}

/// What happened when a tab's timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmOutcome {
    /// The tab no longer exists; its registration and ledgers were purged.
    Orphaned,
    /// Recent activity means the alarm predates the current tab (or its last
    /// interaction); a fresh timer was armed.
    Stale,
    /// The tab was suspended.
    Suspended,
    /// Excluded for now; a fresh timer was armed for a later re-check.
    Deferred(ExclusionReason),
    /// Internal or already-suspended page; monitoring stopped.
    Unmonitored(ExclusionReason),
    /// A host call failed; a fresh timer was armed.
    Failed,
}

/// Storage and timing collaborators the engine is assembled from. The tab
/// host is passed separately because it only becomes usable once the host
/// has reported its tab set.
pub struct EngineParts {
    pub alarms: Arc<dyn AlarmBackend>,
    /// Fast process-lifetime store, if the execution context has one.
    pub session: Option<Arc<dyn KeyValueStore>>,
    pub durable: Arc<dyn KeyValueStore>,
    pub clock: Arc<dyn Clock>,
    pub suspended_page: SuspendedPage,
}

/// Suspension orchestrator.
pub struct Engine {
    tabs: Arc<dyn TabHost>,
    timers: TimerService,
    activity: ActivityLedger,
    forms: FormStatusLedger,
    stats: StatsRecorder,
    durable: Arc<dyn KeyValueStore>,
    policy: ExclusionPolicy,
    clock: Arc<dyn Clock>,
    settings: Settings,
}

impl Engine {
    /// Startup phase: load settings, then reconcile timers and ledgers
    /// against the live tab set. The engine only exists once this has run,
    /// so no event is ever handled against unreconciled state.
    pub async fn start(tabs: Arc<dyn TabHost>, parts: EngineParts) -> (Self, ReconcileReport) {
        let tiers = TieredStore::new(parts.session, Arc::clone(&parts.durable));
        let settings = Settings::load(parts.durable.as_ref()).await;
        let engine = Self {
            tabs,
            timers: TimerService::new(parts.alarms, Arc::clone(&parts.clock)),
            activity: ActivityLedger::new(tiers.clone(), Arc::clone(&parts.clock)),
            forms: FormStatusLedger::new(tiers),
            stats: StatsRecorder::new(Arc::clone(&parts.durable), Arc::clone(&parts.clock)),
            durable: parts.durable,
            policy: ExclusionPolicy::new(parts.suspended_page),
            clock: parts.clock,
            settings,
        };

        let report = match engine.reconcile().await {
            Ok(report) => report,
            Err(e) => {
                warn!("startup reconciliation failed, continuing with persisted timers: {e}");
                ReconcileReport::default()
            }
        };
        info!(
            timeout_minutes = engine.settings.suspension_timeout_minutes,
            "engine ready: {report}"
        );
        (engine, report)
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn policy(&self) -> &ExclusionPolicy {
        &self.policy
    }

    #[must_use]
    pub fn timers(&self) -> &TimerService {
        &self.timers
    }

    #[must_use]
    pub fn activity(&self) -> &ActivityLedger {
        &self.activity
    }

    #[must_use]
    pub fn form_status(&self) -> &FormStatusLedger {
        &self.forms
    }

    #[must_use]
    pub fn stats(&self) -> &StatsRecorder {
        &self.stats
    }

    /// Re-read settings from the durable store. Existing timers keep their
    /// fire time; the new timeout applies from the next re-arm.
    pub async fn reload_configuration(&mut self) -> &Settings {
        self.settings = Settings::load(self.durable.as_ref()).await;
        info!(
            timeout_minutes = self.settings.suspension_timeout_minutes,
            whitelist = self.settings.whitelisted_domains.len(),
            "configuration reloaded"
        );
        &self.settings
    }

    /// Derived state of a tab, or `None` when it does not exist.
    pub async fn state_of(&self, tab_id: TabId) -> Option<TabState> {
        let tab = self.fetch(tab_id).await?;
        if self.policy.page().is_suspended_url(tab.url_str()) {
            return Some(TabState::Suspended);
        }
        if !self.policy.is_monitorable(&tab) {
            return Some(TabState::Unmonitored);
        }
        match self.timers.get(tab_id).await {
            Ok(Some(_)) => Some(TabState::Monitored),
            Ok(None) => Some(TabState::Unmonitored),
            Err(e) => {
                warn!(tab_id = tab_id, "cannot read timer: {e}");
                None
            }
        }
    }

    // ---------------------------------------------------------------------
    // Lifecycle events
    // ---------------------------------------------------------------------

    pub async fn on_tab_created(&self, tab: &Tab) {
        if self.policy.is_monitorable(tab) {
            self.monitor(tab.id).await;
        } else {
            debug!(tab_id = tab.id, "created tab is not monitorable");
        }
    }

    pub async fn on_tab_activated(&self, tab_id: TabId) {
        let Some(tab) = self.fetch(tab_id).await else {
            return;
        };

        if self.policy.page().is_suspended_url(tab.url_str()) {
            if self.settings.auto_unsuspend_on_focus {
                let outcome = self.restore(tab_id).await;
                debug!(tab_id = tab_id, ?outcome, "auto-restore on focus");
            }
            return;
        }

        if self.policy.is_monitorable(&tab) {
            self.monitor(tab_id).await;
        }
    }

    pub async fn on_tab_updated(&self, tab: &Tab, change: &TabChange) {
        if !change.is_navigation() {
            return;
        }
        if self.policy.is_monitorable(tab) {
            self.monitor(tab.id).await;
        } else {
            debug!(tab_id = tab.id, "navigated to internal or suspended page");
            self.unmonitor(tab.id).await;
        }
    }

    pub async fn on_tab_removed(&self, tab_id: TabId) {
        self.forget(tab_id).await;
        if let Err(e) = self.sweep_orphans().await {
            debug!("post-removal sweep skipped: {e}");
        }
    }

    /// Activity signal from the content observer. A missing timestamp means
    /// "now".
    pub async fn report_activity(&self, tab_id: TabId, timestamp_ms: Option<u64>) {
        match timestamp_ms {
            Some(ts) => self.activity.touch_at(tab_id, ts).await,
            None => self.activity.touch(tab_id).await,
        }
    }

    pub async fn report_form_status(&self, tab_id: TabId, has_unsaved_forms: bool) {
        self.forms.set(tab_id, has_unsaved_forms).await;
    }

    // ---------------------------------------------------------------------
    // Timer firing
    // ---------------------------------------------------------------------

    /// Fire every due timer. The registrations are consumed before handling,
    /// so each handler ends by re-arming, suspending, or dropping the tab.
    pub async fn fire_due_alarms(&self) -> Vec<(TabId, AlarmOutcome)> {
        let due = match self.timers.take_due().await {
            Ok(due) => due,
            Err(e) => {
                warn!("cannot poll alarm registry: {e}");
                return Vec::new();
            }
        };

        let mut outcomes = Vec::with_capacity(due.len());
        for tab_id in due {
            let outcome = self.on_alarm(tab_id).await;
            outcomes.push((tab_id, outcome));
        }
        outcomes
    }

    /// Handle one fired timer.
    pub async fn on_alarm(&self, tab_id: TabId) -> AlarmOutcome {
        let tab = match self.tabs.get(tab_id).await {
            Ok(Some(tab)) => tab,
            Ok(None) => {
                debug!(tab_id = tab_id, "alarm for closed tab");
                self.forget(tab_id).await;
                return AlarmOutcome::Orphaned;
            }
            Err(e) => {
                warn!(tab_id = tab_id, "tab lookup failed on alarm: {e}");
                self.rearm(tab_id).await;
                return AlarmOutcome::Failed;
            }
        };

        let now = self.clock.now_ms();
        if let Some(last_activity) = self.activity.get(tab_id).await {
            let elapsed = now.saturating_sub(last_activity);
            if elapsed < self.settings.stale_threshold_ms() {
                debug!(
                    tab_id = tab_id,
                    elapsed_ms = elapsed,
                    "alarm is stale (recent activity or reused id), re-arming"
                );
                self.rearm(tab_id).await;
                return AlarmOutcome::Stale;
            }
        }

        let unsaved = self.forms.has_unsaved_forms(tab_id).await;
        match self.policy.evaluate(&tab, &self.settings, unsaved) {
            Verdict::Eligible => match self.suspend(tab_id).await {
                SuspendOutcome::Suspended => AlarmOutcome::Suspended,
                SuspendOutcome::Excluded(reason) => self.defer(tab_id, reason).await,
                SuspendOutcome::Gone => {
                    self.forget(tab_id).await;
                    AlarmOutcome::Orphaned
                }
                SuspendOutcome::Failed => {
                    self.rearm(tab_id).await;
                    AlarmOutcome::Failed
                }
            },
            Verdict::Excluded(reason) => self.defer(tab_id, reason).await,
        }
    }

    async fn defer(&self, tab_id: TabId, reason: ExclusionReason) -> AlarmOutcome {
        if reason.is_unmonitored() {
            self.unmonitor(tab_id).await;
            AlarmOutcome::Unmonitored(reason)
        } else {
            debug!(tab_id = tab_id, %reason, "suspension deferred");
            self.rearm(tab_id).await;
            AlarmOutcome::Deferred(reason)
        }
    }

    // ---------------------------------------------------------------------
    // Timer and ledger helpers
    // ---------------------------------------------------------------------

    /// Touch activity and re-arm.
    async fn monitor(&self, tab_id: TabId) {
        self.activity.touch(tab_id).await;
        self.rearm(tab_id).await;
    }

    /// Cancel then schedule a full-timeout timer.
    async fn rearm(&self, tab_id: TabId) -> Option<TimerRegistration> {
        if let Err(e) = self.timers.cancel(tab_id).await {
            warn!(tab_id = tab_id, "timer cancel failed before re-arm: {e}");
        }
        match self
            .timers
            .schedule(tab_id, self.settings.suspension_timeout_minutes)
            .await
        {
            Ok(registration) => Some(registration),
            Err(e) => {
                warn!(tab_id = tab_id, "timer schedule failed: {e}");
                None
            }
        }
    }

    async fn cancel_timer(&self, tab_id: TabId) {
        if let Err(e) = self.timers.cancel(tab_id).await {
            warn!(tab_id = tab_id, "timer cancel failed: {e}");
        }
    }

    /// Stop monitoring a tab that still exists.
    async fn unmonitor(&self, tab_id: TabId) {
        self.cancel_timer(tab_id).await;
        self.forms.remove(tab_id).await;
    }

    /// Drop every trace of a tab that no longer exists.
    async fn forget(&self, tab_id: TabId) {
        self.cancel_timer(tab_id).await;
        self.activity.remove(tab_id).await;
        self.forms.remove(tab_id).await;
    }

    /// Host lookup with failures folded into `None`.
    async fn fetch(&self, tab_id: TabId) -> Option<Tab> {
        match self.tabs.get(tab_id).await {
            Ok(tab) => tab,
            Err(e) => {
                warn!(tab_id = tab_id, "tab lookup failed: {e}");
                None
            }
        }
    }
}
