//! Versioned command/event envelopes exchanged with the browser host.

use crate::tab::{Tab, TabChange, TabId};
use serde::{Deserialize, Serialize};

/// Contract version for command/event envelopes.
pub const EVENT_VERSION: u32 = 1;

/// Inbound command set. Tagged by `type`; `resourceId` is accepted wherever
/// `tabId` is expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    Ping,
    /// Stop the bridge after responding.
    Shutdown,

    /// Full tab table; must be the first command after start.
    SyncTabs {
        tabs: Vec<Tab>,
    },
    TabCreated {
        tab: Tab,
    },
    TabUpdated {
        tab: Tab,
        #[serde(default)]
        change_info: TabChange,
    },
    TabActivated {
        #[serde(alias = "resourceId")]
        tab_id: TabId,
        #[serde(default)]
        window_id: Option<i64>,
    },
    TabRemoved {
        #[serde(alias = "resourceId")]
        tab_id: TabId,
    },

    ReportActivity {
        #[serde(alias = "resourceId")]
        tab_id: TabId,
        #[serde(default)]
        timestamp: Option<u64>,
    },
    ReportFormStatus {
        #[serde(alias = "resourceId")]
        tab_id: TabId,
        has_unsaved_forms: bool,
    },
    RequestSuspend {
        #[serde(alias = "resourceId")]
        tab_id: TabId,
    },
    RequestRestore {
        #[serde(alias = "resourceId")]
        tab_id: TabId,
    },
    RequestSuspendAllExcept {
        #[serde(default, alias = "resourceId")]
        tab_id: Option<TabId>,
    },
    RequestRestoreAll,
    GetCountdown {
        #[serde(alias = "resourceId")]
        tab_id: TabId,
    },
    GetAllCountdowns,
    ReloadConfiguration,
}

impl Command {
    /// Wire name of the command.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Shutdown => "shutdown",
            Self::SyncTabs { .. } => "syncTabs",
            Self::TabCreated { .. } => "tabCreated",
            Self::TabUpdated { .. } => "tabUpdated",
            Self::TabActivated { .. } => "tabActivated",
            Self::TabRemoved { .. } => "tabRemoved",
            Self::ReportActivity { .. } => "reportActivity",
            Self::ReportFormStatus { .. } => "reportFormStatus",
            Self::RequestSuspend { .. } => "requestSuspend",
            Self::RequestRestore { .. } => "requestRestore",
            Self::RequestSuspendAllExcept { .. } => "requestSuspendAllExcept",
            Self::RequestRestoreAll => "requestRestoreAll",
            Self::GetCountdown { .. } => "getCountdown",
            Self::GetAllCountdowns => "getAllCountdowns",
            Self::ReloadConfiguration => "reloadConfiguration",
        }
    }

    /// Commands that can be answered before the engine has started.
    #[must_use]
    pub fn allowed_before_sync(&self) -> bool {
        matches!(self, Self::Ping | Self::Shutdown | Self::SyncTabs { .. })
    }
}

/// Outbound event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventName {
    /// The engine rewrote a tab's address; the host must navigate it.
    TabNavigate,
    TabSuspended,
    TabRestored,
    EngineReady,
}

impl EventName {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TabNavigate => "tab.navigate",
            Self::TabSuspended => "tab.suspended",
            Self::TabRestored => "tab.restored",
            Self::EngineReady => "engine.ready",
        }
    }
}

/// A versioned command envelope from host -> engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnvelope {
    pub v: u32,
    pub request_id: String,
    pub command: Command,
}

impl CommandEnvelope {
    /// Build a v1 command envelope.
    #[must_use]
    pub fn new(request_id: impl Into<String>, command: Command) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            command,
        }
    }

    /// Validate envelope version and required identifiers.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.v != EVENT_VERSION {
            return Err(ContractError::new(
                ContractErrorKind::UnsupportedVersion,
                format!(
                    "unsupported contract version {}; expected {}",
                    self.v, EVENT_VERSION
                ),
            ));
        }
        if self.request_id.trim().is_empty() {
            return Err(ContractError::new(
                ContractErrorKind::InvalidEnvelope,
                "requestId cannot be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

/// A versioned response envelope from engine -> host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

impl ResponseEnvelope {
    #[must_use]
    pub fn ok(request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: true,
            payload,
            error: None,
        }
    }

    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

/// A versioned event envelope from engine -> host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub v: u32,
    pub event_id: String,
    pub event: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    #[must_use]
    pub fn new(event_id: impl Into<String>, event: EventName, payload: serde_json::Value) -> Self {
        Self {
            v: EVENT_VERSION,
            event_id: event_id.into(),
            event: event.as_str().to_owned(),
            payload,
        }
    }
}

/// Contract validation error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractErrorKind {
    UnsupportedVersion,
    InvalidEnvelope,
}

/// Contract validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractError {
    pub kind: ContractErrorKind,
    pub message: String,
}

impl ContractError {
    #[must_use]
    pub fn new(kind: ContractErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl std::fmt::Display for ContractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ContractError {}
