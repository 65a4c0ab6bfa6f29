//! Lull: idle-tab suspension scheduler.
//!
//! Tabs that have been idle for a configurable time are rewritten to a
//! lightweight placeholder page that remembers the original address, and
//! brought back on request or on focus.
//!
//! # Architecture
//!
//! - **Timers**: one durable alarm per monitored tab, named `suspend-tab-<id>`
//! - **Ledgers**: last activity and unsaved-form status per tab
//! - **Policy**: pure exclusion rules deciding whether a tab may be suspended
//! - **Engine**: the suspension state machine plus the reconciliation sweep
//!   run at every start
//! - **Host**: versioned JSON commands/events, an actor that owns the engine,
//!   and a stdin/stdout bridge

pub mod alarms;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod ledger;
pub mod lull_dirs;
pub mod policy;
pub mod settings;
pub mod stats;
pub mod storage;
pub mod suspended;
pub mod tab;

pub use config::LullConfig;
pub use engine::{Engine, EngineParts, TabState};
pub use error::{LullError, Result};
pub use policy::{ExclusionPolicy, ExclusionReason, Verdict};
pub use settings::Settings;
pub use tab::{Tab, TabHost, TabId};
