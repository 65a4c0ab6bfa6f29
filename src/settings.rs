//! User-facing suspension settings.
//!
//! Stored as JSON under the `settings` key of the durable store. Loading is
//! lenient: every field is read on its own, so one corrupt value falls back to
//! its default instead of discarding the whole record.

use crate::clock::MINUTE_MS;
use crate::error::{LullError, Result};
use crate::storage::{KeyValueStore, SETTINGS_KEY};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::warn;

/// Default idle time before a tab is suspended.
pub const DEFAULT_TIMEOUT_MINUTES: u32 = 30;
/// Shortest accepted idle timeout.
pub const MIN_TIMEOUT_MINUTES: u32 = 1;
/// Longest accepted idle timeout (one week).
pub const MAX_TIMEOUT_MINUTES: u32 = 10_080;

/// Suspension policy settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Idle minutes before a tab is suspended.
    pub suspension_timeout_minutes: u32,
    /// Allow pinned tabs to be suspended.
    pub suspend_pinned_tabs: bool,
    /// Never suspend a tab that is playing audio.
    pub never_suspend_audio: bool,
    /// Never suspend the focused tab of a window.
    pub never_suspend_active_resource: bool,
    /// Never suspend a tab with unsaved form input.
    pub never_suspend_unsaved_forms: bool,
    /// Hostnames (and their subdomains) that are never suspended.
    pub whitelisted_domains: Vec<String>,
    /// Restore a suspended tab as soon as it gains focus.
    pub auto_unsuspend_on_focus: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            suspension_timeout_minutes: DEFAULT_TIMEOUT_MINUTES,
            suspend_pinned_tabs: false,
            never_suspend_audio: true,
            never_suspend_active_resource: true,
            never_suspend_unsaved_forms: true,
            whitelisted_domains: Vec::new(),
            auto_unsuspend_on_focus: false,
        }
    }
}

impl Settings {
    /// Build settings from an arbitrary JSON value, defaulting and clamping
    /// anything malformed.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let defaults = Self::default();
        let Some(obj) = value.as_object() else {
            warn!("settings record is not an object; using defaults");
            return defaults;
        };

        let flag = |key: &str, default: bool| match obj.get(key) {
            None | Some(Value::Null) => default,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                warn!("settings field {key} has non-boolean value {other}; using default");
                default
            }
        };

        let whitelisted_domains = match obj.get("whitelistedDomains") {
            Some(Value::Array(entries)) => sanitize_whitelist(
                entries.iter().filter_map(Value::as_str),
            ),
            // A newline separated textarea dump is accepted too.
            Some(Value::String(text)) => sanitize_whitelist(text.split(['\n', ',', ' '])),
            _ => defaults.whitelisted_domains.clone(),
        };

        Self {
            suspension_timeout_minutes: parse_timeout(obj.get("suspensionTimeoutMinutes")),
            suspend_pinned_tabs: flag("suspendPinnedTabs", defaults.suspend_pinned_tabs),
            never_suspend_audio: flag("neverSuspendAudio", defaults.never_suspend_audio),
            never_suspend_active_resource: flag(
                "neverSuspendActiveResource",
                defaults.never_suspend_active_resource,
            ),
            never_suspend_unsaved_forms: flag(
                "neverSuspendUnsavedForms",
                defaults.never_suspend_unsaved_forms,
            ),
            whitelisted_domains,
            auto_unsuspend_on_focus: flag("autoUnsuspendOnFocus", defaults.auto_unsuspend_on_focus),
        }
    }

    /// Load settings from the durable store. Never fails: read errors and a
    /// missing record both yield defaults.
    pub async fn load(store: &dyn KeyValueStore) -> Self {
        match store.get(SETTINGS_KEY).await {
            Ok(Some(value)) => Self::from_value(&value),
            Ok(None) => Self::default(),
            Err(e) => {
                warn!("cannot read settings, using defaults: {e}");
                Self::default()
            }
        }
    }

    /// Persist settings to the durable store.
    pub async fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        let value = serde_json::to_value(self)
            .map_err(|e| LullError::Config(format!("cannot serialize settings: {e}")))?;
        store.set(SETTINGS_KEY, value).await
    }

    /// Idle timeout in milliseconds.
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        u64::from(self.suspension_timeout_minutes).saturating_mul(MINUTE_MS)
    }

    /// Activity more recent than this means a fired timer is stale (half the
    /// idle timeout).
    #[must_use]
    pub fn stale_threshold_ms(&self) -> u64 {
        self.timeout_ms() / 2
    }
}

fn parse_timeout(value: Option<&Value>) -> u32 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match raw {
        Some(minutes) if minutes.is_finite() => {
            let clamped = minutes
                .round()
                .clamp(f64::from(MIN_TIMEOUT_MINUTES), f64::from(MAX_TIMEOUT_MINUTES));
            // In range by the clamp above.
            clamped as u32
        }
        _ => {
            if value.is_some() {
                warn!("invalid suspensionTimeoutMinutes; using {DEFAULT_TIMEOUT_MINUTES}");
            }
            DEFAULT_TIMEOUT_MINUTES
        }
    }
}

/// Normalize and dedupe whitelist entries, dropping anything that is not a
/// plausible hostname.
pub fn sanitize_whitelist<'a>(entries: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for entry in entries {
        match normalize_domain(entry) {
            Some(domain) => {
                if seen.insert(domain.clone()) {
                    out.push(domain);
                }
            }
            None => {
                if !entry.trim().is_empty() {
                    warn!("dropping malformed whitelist entry {entry:?}");
                }
            }
        }
    }
    out
}

/// Reduce a user-typed whitelist entry to a bare lowercase hostname.
///
/// Accepts `Example.com`, `https://example.com/path`, `*.example.com`,
/// `example.com:8080` and bracketed IPv6 such as `[::1]:8080`. Returns
/// `None` for entries that cannot be a hostname.
#[must_use]
pub fn normalize_domain(raw: &str) -> Option<String> {
    let mut host = raw.trim().to_ascii_lowercase();
    if host.contains("://") {
        host = url::Url::parse(&host).ok()?.host_str()?.to_owned();
    }
    let host = host.strip_prefix("*.").unwrap_or(&host);
    let host = host.split(['/', '?', '#']).next().unwrap_or("");
    if let Some(rest) = host.strip_prefix('[') {
        let (addr, _port) = rest.split_once(']')?;
        let addr: std::net::Ipv6Addr = addr.parse().ok()?;
        return Some(format!("[{addr}]"));
    }
    let host = host.split(':').next().unwrap_or("");
    let host = host.trim_end_matches('.');

    let valid = !host.is_empty()
        && !host.starts_with(['.', '-'])
        && !host.contains("..")
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    valid.then(|| host.to_owned())
}
