//! Suspended-representation codec.
//!
//! A suspended tab is navigated to a fixed internal page whose query string
//! carries what is needed to bring it back:
//! `<page>?url=<original>&title=<title>&favicon=<icon>&time=<epoch ms>`.

use serde::{Deserialize, Serialize};

/// Internal page suspended tabs are rewritten to.
pub const DEFAULT_SUSPENDED_PAGE: &str = "chrome-extension://lull/suspended.html";

/// Longest original url carried by the encoding, in characters.
pub const MAX_URL_CHARS: usize = 2000;

/// Longest title carried by the encoding, in characters.
pub const MAX_TITLE_CHARS: usize = 200;

/// Schemes a restored tab may be navigated to.
const RESTORABLE_SCHEMES: &[&str] = &["http", "https"];

/// Metadata recovered from a suspended-page address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspendedTab {
    pub url: String,
    pub title: String,
    pub favicon: Option<String>,
    /// When the tab was suspended, epoch ms.
    pub time: u64,
}

/// Encoder/decoder bound to one suspended-page base address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspendedPage {
    base: String,
}

impl Default for SuspendedPage {
    fn default() -> Self {
        Self::new(DEFAULT_SUSPENDED_PAGE)
    }
}

impl SuspendedPage {
    /// `base` must not carry a query string; anything after `?` is dropped.
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        let base: String = base.into();
        let base = match base.split_once('?') {
            Some((head, _)) => head.to_owned(),
            None => base,
        };
        Self { base }
    }

    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Whether `url` is a suspended representation produced by this page.
    #[must_use]
    pub fn is_suspended_url(&self, url: &str) -> bool {
        match url.strip_prefix(self.base.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('?') || rest.starts_with('#'),
            None => false,
        }
    }

    /// Build the suspended address for a tab, capping url and title length.
    #[must_use]
    pub fn encode(&self, url: &str, title: &str, favicon: Option<&str>, time_ms: u64) -> String {
        let url = truncate_chars(url, MAX_URL_CHARS);
        let title = truncate_chars(title, MAX_TITLE_CHARS);
        format!(
            "{}?url={}&title={}&favicon={}&time={}",
            self.base,
            urlencoding::encode(&url),
            urlencoding::encode(&title),
            urlencoding::encode(favicon.unwrap_or("")),
            time_ms
        )
    }

    /// Parse a suspended address. `None` when `url` is not a suspended
    /// representation or carries no original url.
    #[must_use]
    pub fn decode(&self, url: &str) -> Option<SuspendedTab> {
        if !self.is_suspended_url(url) {
            return None;
        }
        let parsed = url::Url::parse(url).ok()?;

        let mut decoded = SuspendedTab {
            url: String::new(),
            title: String::new(),
            favicon: None,
            time: 0,
        };
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "url" => decoded.url = value.into_owned(),
                "title" => decoded.title = value.into_owned(),
                "favicon" if !value.is_empty() => decoded.favicon = Some(value.into_owned()),
                "time" => decoded.time = value.parse().unwrap_or(0),
                _ => {}
            }
        }

        (!decoded.url.is_empty()).then_some(decoded)
    }
}

/// Validate a decoded url before navigating to it. Only network schemes pass,
/// which rejects `javascript:`, `data:`, `file:` and similar injections.
#[must_use]
pub fn restorable_url(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw.trim()).ok()?;
    RESTORABLE_SCHEMES
        .contains(&parsed.scheme())
        .then(|| parsed.to_string())
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_owned(),
        None => s.to_owned(),
    }
}
