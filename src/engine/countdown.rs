//! Countdown queries for the popup.

use super::Engine;
use crate::policy::ExclusionReason;
use crate::tab::{Tab, TabId};
use serde::Serialize;
use tracing::warn;

/// Time left before a tab is suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Countdown {
    /// Milliseconds until the timer fires; `-1` when paused.
    pub remaining_ms: i64,
    pub fire_at_absolute_time: Option<u64>,
    pub is_paused: bool,
    /// Exclusion holding the countdown, when one applies.
    pub paused_reason: Option<ExclusionReason>,
}

impl Countdown {
    fn paused(reason: Option<ExclusionReason>) -> Self {
        Self {
            remaining_ms: -1,
            fire_at_absolute_time: None,
            is_paused: true,
            paused_reason: reason,
        }
    }
}

/// One live timer in the all-countdowns listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabCountdown {
    pub tab_id: TabId,
    pub remaining_ms: i64,
    pub fire_at_absolute_time: u64,
    /// Exclusion that will defer this timer when it fires; the same reason
    /// [`Engine::countdown`] reports for the tab.
    pub paused_reason: Option<ExclusionReason>,
}

impl Engine {
    /// Countdown for one tab. Paused when the tab is excluded right now, when
    /// it has no timer, or when it cannot be found.
    pub async fn countdown(&self, tab_id: TabId) -> Countdown {
        let Some(tab) = self.fetch(tab_id).await else {
            return Countdown::paused(None);
        };
        if let Some(reason) = self.exclusion_of(&tab).await {
            return Countdown::paused(Some(reason));
        }

        match self.timers.get(tab_id).await {
            Ok(Some(registration)) => Countdown {
                remaining_ms: remaining(registration.fire_at_ms, self.clock.now_ms()),
                fire_at_absolute_time: Some(registration.fire_at_ms),
                is_paused: false,
                paused_reason: None,
            },
            Ok(None) => Countdown::paused(None),
            Err(e) => {
                warn!(tab_id = tab_id, "cannot read timer for countdown: {e}");
                Countdown::paused(None)
            }
        }
    }

    /// Every live timer, soonest first. Timers of currently excluded tabs
    /// stay listed (they are re-checked when they fire) and carry the
    /// exclusion as `paused_reason`.
    pub async fn all_countdowns(&self) -> Vec<TabCountdown> {
        let registrations = match self.timers.list_all().await {
            Ok(registrations) => registrations,
            Err(e) => {
                warn!("cannot list timers: {e}");
                return Vec::new();
            }
        };
        let now = self.clock.now_ms();
        let mut listing = Vec::with_capacity(registrations.len());
        for r in registrations {
            listing.push(TabCountdown {
                tab_id: r.tab_id,
                remaining_ms: remaining(r.fire_at_ms, now),
                fire_at_absolute_time: r.fire_at_ms,
                paused_reason: match self.fetch(r.tab_id).await {
                    Some(tab) => self.exclusion_of(&tab).await,
                    None => None,
                },
            });
        }
        listing
    }

    async fn exclusion_of(&self, tab: &Tab) -> Option<ExclusionReason> {
        let unsaved = self.forms.has_unsaved_forms(tab.id).await;
        self.policy.evaluate(tab, &self.settings, unsaved).reason()
    }
}

fn remaining(fire_at_ms: u64, now_ms: u64) -> i64 {
    i64::try_from(fire_at_ms.saturating_sub(now_ms)).unwrap_or(i64::MAX)
}
