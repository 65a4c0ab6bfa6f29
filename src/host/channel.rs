//! Command channel and router.
//!
//! The server task owns the engine outright: commands and alarm ticks are
//! handled one at a time on that task, so no engine state is ever shared.
//! Until the host sends `syncTabs` the engine does not exist yet and only
//! `ping`, `shutdown` and `syncTabs` are accepted.

use crate::engine::{AlarmOutcome, Engine, EngineParts, RestoreOutcome, SuspendOutcome};
use crate::error::{LullError, Result};
use crate::host::contract::{
    Command, CommandEnvelope, EVENT_VERSION, EventEnvelope, EventName, ResponseEnvelope,
};
use crate::host::mirror::MirroredTabs;
use crate::tab::{Tab, TabHost, TabId};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Default interval between alarm polls.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(15);

/// Sizing and timing of a command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOptions {
    pub request_capacity: usize,
    pub event_capacity: usize,
    pub tick_interval: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            request_capacity: 64,
            event_capacity: 128,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// Broadcast side of the event stream.
#[derive(Clone)]
pub struct EventSink {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventSink {
    #[must_use]
    pub fn new(tx: broadcast::Sender<EventEnvelope>) -> Self {
        Self { tx }
    }

    /// Publish an event. Having no subscriber is not an error.
    pub fn emit(&self, event: EventName, payload: serde_json::Value) {
        let envelope = EventEnvelope::new(uuid::Uuid::new_v4().to_string(), event, payload);
        let _ = self.tx.send(envelope);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }
}

struct HostCommandRequest {
    envelope: CommandEnvelope,
    response_tx: oneshot::Sender<ResponseEnvelope>,
}

#[derive(Clone)]
pub struct HostCommandClient {
    request_tx: mpsc::Sender<HostCommandRequest>,
    events: EventSink,
}

impl HostCommandClient {
    pub async fn send(&self, envelope: CommandEnvelope) -> Result<ResponseEnvelope> {
        envelope.validate().map_err(|e| {
            LullError::Contract(format!(
                "invalid command envelope {}: {}",
                envelope.request_id, e
            ))
        })?;

        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send(HostCommandRequest {
                envelope,
                response_tx,
            })
            .await
            .map_err(|e| LullError::Channel(format!("failed to send command request: {e}")))?;

        response_rx
            .await
            .map_err(|e| LullError::Channel(format!("command response dropped: {e}")))
    }

    /// Convenience wrapper building a v1 envelope.
    pub async fn call(&self, request_id: &str, command: Command) -> Result<ResponseEnvelope> {
        self.send(CommandEnvelope::new(request_id, command)).await
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }
}

pub struct HostCommandServer {
    request_rx: mpsc::Receiver<HostCommandRequest>,
    events: EventSink,
    mirror: Arc<MirroredTabs>,
    parts: Option<EngineParts>,
    engine: Option<Engine>,
    tick_interval: Duration,
}

#[must_use]
pub fn command_channel(
    options: ChannelOptions,
    parts: EngineParts,
) -> (HostCommandClient, HostCommandServer) {
    let (event_tx, _event_rx) = broadcast::channel(options.event_capacity.max(1));
    let (request_tx, request_rx) = mpsc::channel(options.request_capacity.max(1));
    let events = EventSink::new(event_tx);

    (
        HostCommandClient {
            request_tx,
            events: events.clone(),
        },
        HostCommandServer {
            request_rx,
            mirror: Arc::new(MirroredTabs::new(events.clone())),
            events,
            parts: Some(parts),
            engine: None,
            tick_interval: options.tick_interval,
        },
    )
}

impl HostCommandServer {
    /// Serve until every client is dropped.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                request = self.request_rx.recv() => {
                    let Some(request) = request else { break };
                    let request_id = request.envelope.request_id.clone();
                    let response = match self.route(&request.envelope).await {
                        Ok(response) => response,
                        Err(e) => {
                            debug!(command = request.envelope.command.name(), "command rejected: {e}");
                            ResponseEnvelope::error(request_id, e.to_string())
                        }
                    };
                    let _ = request.response_tx.send(response);
                }
                _ = ticker.tick() => self.tick().await,
            }
        }
        info!("command channel closed; router stopping");
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.engine.is_some()
    }

    /// Fire due alarms and announce suspensions.
    pub async fn tick(&mut self) {
        let Some(engine) = self.engine.as_ref() else {
            return;
        };
        for (tab_id, outcome) in engine.fire_due_alarms().await {
            debug!(tab_id = tab_id, ?outcome, "alarm handled");
            if outcome == AlarmOutcome::Suspended {
                self.events
                    .emit(EventName::TabSuspended, json!({"tabId": tab_id, "trigger": "timer"}));
            }
        }
    }

    /// Route a command envelope to the engine.
    pub async fn route(&mut self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let request_id = envelope.request_id.clone();
        let command = &envelope.command;

        if !self.is_ready() && !command.allowed_before_sync() {
            return Err(LullError::Channel(format!(
                "engine not ready: send syncTabs before {}",
                command.name()
            )));
        }

        match command {
            Command::Ping => {
                return Ok(ResponseEnvelope::ok(
                    request_id,
                    json!({
                        "pong": true,
                        "contractVersion": EVENT_VERSION,
                        "ready": self.is_ready(),
                    }),
                ));
            }
            Command::Shutdown => {
                return Ok(ResponseEnvelope::ok(request_id, json!({"accepted": true})));
            }
            Command::SyncTabs { tabs } => {
                let payload = self.handle_sync(tabs).await?;
                return Ok(ResponseEnvelope::ok(request_id, payload));
            }
            _ => {}
        }

        let Some(engine) = self.engine.as_mut() else {
            return Err(LullError::Channel("engine not started".to_owned()));
        };
        let mirror = &self.mirror;
        let events = &self.events;

        let payload = match command {
            Command::Ping | Command::Shutdown | Command::SyncTabs { .. } => json!({}),
            Command::TabCreated { tab } => {
                mirror.upsert(tab.clone())?;
                engine.on_tab_created(tab).await;
                json!({"state": engine.state_of(tab.id).await})
            }
            Command::TabUpdated { tab, change_info } => {
                mirror.upsert(tab.clone())?;
                engine.on_tab_updated(tab, change_info).await;
                json!({"state": engine.state_of(tab.id).await})
            }
            Command::TabActivated { tab_id, window_id } => {
                mirror.activate(*tab_id, *window_id)?;
                engine.on_tab_activated(*tab_id).await;
                json!({"state": engine.state_of(*tab_id).await})
            }
            Command::TabRemoved { tab_id } => {
                let known = mirror.remove(*tab_id)?.is_some();
                engine.on_tab_removed(*tab_id).await;
                json!({"removed": known})
            }
            Command::ReportActivity { tab_id, timestamp } => {
                engine.report_activity(*tab_id, *timestamp).await;
                json!({"accepted": true})
            }
            Command::ReportFormStatus {
                tab_id,
                has_unsaved_forms,
            } => {
                engine.report_form_status(*tab_id, *has_unsaved_forms).await;
                json!({"accepted": true})
            }
            Command::RequestSuspend { tab_id } => {
                let outcome = engine.suspend(*tab_id).await;
                announce_suspend(events, *tab_id, outcome);
                json!({"success": outcome.succeeded(), "outcome": to_payload(&outcome)?})
            }
            Command::RequestRestore { tab_id } => {
                let outcome = engine.restore(*tab_id).await;
                announce_restore(events, *tab_id, outcome);
                json!({"success": outcome.succeeded(), "outcome": to_payload(&outcome)?})
            }
            Command::RequestSuspendAllExcept { tab_id } => {
                let results = engine.suspend_all_except(*tab_id).await;
                for result in &results {
                    announce_suspend(events, result.tab_id, result.outcome);
                }
                let suspended = results.iter().filter(|r| r.outcome.succeeded()).count();
                json!({"suspended": suspended, "results": to_payload(&results)?})
            }
            Command::RequestRestoreAll => {
                let results = engine.restore_all().await;
                for result in &results {
                    announce_restore(events, result.tab_id, result.outcome);
                }
                let restored = results.iter().filter(|r| r.outcome.succeeded()).count();
                json!({"restored": restored, "results": to_payload(&results)?})
            }
            Command::GetCountdown { tab_id } => to_payload(&engine.countdown(*tab_id).await)?,
            Command::GetAllCountdowns => {
                json!({"countdowns": to_payload(&engine.all_countdowns().await)?})
            }
            Command::ReloadConfiguration => {
                let settings = engine.reload_configuration().await;
                json!({"settings": to_payload(settings)?})
            }
        };

        Ok(ResponseEnvelope::ok(request_id, payload))
    }

    /// Refresh the mirror and either start the engine (first sync) or
    /// reconcile it against the new tab set.
    async fn handle_sync(&mut self, tabs: &[Tab]) -> Result<serde_json::Value> {
        self.mirror.replace_all(tabs.to_vec())?;

        let report = match self.engine.as_ref() {
            Some(engine) => engine.reconcile().await?,
            None => {
                let parts = self
                    .parts
                    .take()
                    .ok_or_else(|| LullError::Channel("engine parts already consumed".to_owned()))?;
                let host: Arc<dyn TabHost> = self.mirror.clone();
                let (engine, report) = Engine::start(host, parts).await;
                self.engine = Some(engine);
                self.events
                    .emit(EventName::EngineReady, json!({"report": to_payload(&report)?}));
                report
            }
        };

        info!(tabs = tabs.len(), "tab table synced: {report}");
        Ok(json!({"report": to_payload(&report)?}))
    }
}

fn announce_suspend(events: &EventSink, tab_id: TabId, outcome: SuspendOutcome) {
    if outcome.succeeded() {
        events.emit(EventName::TabSuspended, json!({"tabId": tab_id, "trigger": "request"}));
    }
}

fn announce_restore(events: &EventSink, tab_id: TabId, outcome: RestoreOutcome) {
    if outcome.succeeded() {
        events.emit(EventName::TabRestored, json!({"tabId": tab_id}));
    } else {
        warn!(tab_id = tab_id, ?outcome, "restore did not complete");
    }
}

fn to_payload<T: Serialize + ?Sized>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| LullError::Contract(format!("cannot encode response payload: {e}")))
}
