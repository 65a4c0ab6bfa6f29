//! Exclusion policy evaluator.
//!
//! Pure decision: (tab snapshot, settings, unsaved-form flag) -> [`Verdict`].
//! The first matching reason wins, in the order of [`ExclusionReason`].

use crate::settings::Settings;
use crate::suspended::{SuspendedPage, restorable_url};
use crate::tab::Tab;
use serde::{Deserialize, Serialize};

/// Url scheme prefixes that are never suspended: the extension's own pages,
/// privileged browser pages, local and inline content, developer tooling.
const SYSTEM_SCHEMES: &[&str] = &[
    "chrome-extension:",
    "moz-extension:",
    "chrome:",
    "chrome-search:",
    "chrome-untrusted:",
    "edge:",
    "about:",
    "brave:",
    "opera:",
    "vivaldi:",
    "file:",
    "data:",
    "blob:",
    "javascript:",
    "view-source:",
    "devtools:",
    "chrome-devtools:",
];

/// Why a tab may not be suspended. Declaration order is reporting priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExclusionReason {
    AlreadySuspended,
    Active,
    SystemPage,
    Pinned,
    Audio,
    Whitelist,
    UnsavedForm,
}

impl ExclusionReason {
    /// Wire name of the reason.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AlreadySuspended => "alreadySuspended",
            Self::Active => "active",
            Self::SystemPage => "systemPage",
            Self::Pinned => "pinned",
            Self::Audio => "audio",
            Self::Whitelist => "whitelist",
            Self::UnsavedForm => "unsavedForm",
        }
    }

    /// Reasons that mean the tab should not be monitored at all (no timer).
    #[must_use]
    pub fn is_unmonitored(self) -> bool {
        matches!(self, Self::AlreadySuspended | Self::SystemPage)
    }
}

impl std::fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Eligibility verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Eligible,
    Excluded(ExclusionReason),
}

impl Verdict {
    #[must_use]
    pub fn reason(self) -> Option<ExclusionReason> {
        match self {
            Self::Eligible => None,
            Self::Excluded(reason) => Some(reason),
        }
    }
}

/// Policy evaluator bound to the suspended-page address it recognizes.
#[derive(Debug, Clone, Default)]
pub struct ExclusionPolicy {
    page: SuspendedPage,
}

impl ExclusionPolicy {
    #[must_use]
    pub fn new(page: SuspendedPage) -> Self {
        Self { page }
    }

    #[must_use]
    pub fn page(&self) -> &SuspendedPage {
        &self.page
    }

    /// Decide whether `tab` may be suspended right now.
    #[must_use]
    pub fn evaluate(&self, tab: &Tab, settings: &Settings, has_unsaved_forms: bool) -> Verdict {
        let url = tab.url_str();

        let reason = if self.page.is_suspended_url(url) {
            Some(ExclusionReason::AlreadySuspended)
        } else if tab.active && settings.never_suspend_active_resource {
            Some(ExclusionReason::Active)
        } else if is_system_url(url) {
            Some(ExclusionReason::SystemPage)
        } else if tab.pinned && !settings.suspend_pinned_tabs {
            Some(ExclusionReason::Pinned)
        } else if tab.audible && settings.never_suspend_audio {
            Some(ExclusionReason::Audio)
        } else if is_whitelisted(url, &settings.whitelisted_domains) {
            Some(ExclusionReason::Whitelist)
        } else if has_unsaved_forms && settings.never_suspend_unsaved_forms {
            Some(ExclusionReason::UnsavedForm)
        } else {
            None
        };

        match reason {
            Some(reason) => Verdict::Excluded(reason),
            None => Verdict::Eligible,
        }
    }

    /// Whether the tab can carry a timer at all: not internal and not already
    /// suspended. Settings-dependent exclusions still get a timer and are
    /// re-evaluated when it fires.
    #[must_use]
    pub fn is_monitorable(&self, tab: &Tab) -> bool {
        let url = tab.url_str();
        !self.page.is_suspended_url(url) && !is_system_url(url)
    }
}

/// Internal, local, or absent url. Anything restore could not navigate back
/// to (a non-network scheme or an unparsable address) counts as internal too,
/// so a tab is never suspended onto a page it cannot leave.
#[must_use]
pub fn is_system_url(url: &str) -> bool {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return true;
    }
    let lower = trimmed.to_ascii_lowercase();
    SYSTEM_SCHEMES.iter().any(|scheme| lower.starts_with(scheme))
        || restorable_url(trimmed).is_none()
}

/// Whether the url's hostname equals, or is a dot-bounded subdomain of, any
/// whitelist entry. A leading `www.` is ignored on both sides.
#[must_use]
pub fn is_whitelisted(url: &str, whitelist: &[String]) -> bool {
    if whitelist.is_empty() {
        return false;
    }
    let Some(host) = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
    else {
        return false;
    };
    let host = strip_www(&host);

    whitelist.iter().any(|entry| {
        let entry = entry.trim().to_ascii_lowercase();
        let entry = strip_www(&entry);
        !entry.is_empty()
            && (host == entry
                || host
                    .strip_suffix(entry)
                    .is_some_and(|prefix| prefix.ends_with('.')))
    })
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}
