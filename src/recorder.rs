use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use tokio::sync::watch;

use crate::{
    console::Console,
    socketio::{ClientEvent, EventSink, InboundEvent},
};

pub const NOTIFICATION_LIST_EVENT: &str = "notificationList";
pub const MONITOR_LIST_EVENT: &str = "monitorList";

const SEPARATOR_WIDTH: usize = 50;

/// Bumped each time a cached list is replaced by a fresh push.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheVersions {
    pub notifications: u64,
    pub monitors: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecorderSnapshot {
    pub events: Vec<InboundEvent>,
    pub notification_list: Option<Value>,
    pub monitor_list: Option<Value>,
    pub socket_sid: Option<String>,
    pub disconnect_reason: Option<String>,
}

impl RecorderSnapshot {
    pub fn event_names(&self) -> Vec<&str> {
        self.events.iter().map(|event| event.name.as_str()).collect()
    }
}

/// Keeps every inbound event in arrival order plus the latest list payloads
/// the server pushed.
pub struct EventRecorder {
    state: Mutex<RecorderSnapshot>,
    versions: watch::Sender<CacheVersions>,
    console: Option<Console>,
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRecorder {
    pub fn new() -> Self {
        let (versions, _) = watch::channel(CacheVersions::default());
        Self {
            state: Mutex::new(RecorderSnapshot::default()),
            versions,
            console: None,
        }
    }

    /// Also prints each event to `console` as it arrives.
    pub fn with_echo(console: Console) -> Self {
        Self {
            console: Some(console),
            ..Self::new()
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<CacheVersions> {
        self.versions.subscribe()
    }

    pub fn snapshot(&self) -> RecorderSnapshot {
        self.lock_state().clone()
    }

    pub fn notification_list(&self) -> Option<Value> {
        self.lock_state().notification_list.clone()
    }

    pub fn monitor_list(&self) -> Option<Value> {
        self.lock_state().monitor_list.clone()
    }

    pub fn event_count(&self) -> usize {
        self.lock_state().events.len()
    }

    fn record_event(&self, event: &InboundEvent) {
        tracing::info!(
            target: "recorder",
            event = %event.name,
            namespace = %event.namespace,
            arg_count = event.args.len(),
            received_at = %event.received_at.format(&Rfc3339).unwrap_or_default(),
            "event_recorded"
        );
        self.echo_event(event);

        let payload = event.first_arg().cloned();
        {
            let mut state = self.lock_state();
            state.events.push(event.clone());
            match event.name.as_str() {
                NOTIFICATION_LIST_EVENT => state.notification_list = payload,
                MONITOR_LIST_EVENT => state.monitor_list = payload,
                _ => return,
            }
        }

        match event.name.as_str() {
            NOTIFICATION_LIST_EVENT => self.versions.send_modify(|v| v.notifications += 1),
            MONITOR_LIST_EVENT => self.versions.send_modify(|v| v.monitors += 1),
            _ => {}
        }
    }

    fn echo_event(&self, event: &InboundEvent) {
        let Some(console) = &self.console else {
            return;
        };

        let mut lines = vec![
            format!("Received event: {}", event.name),
            format!("Args: {}", pretty_json(&Value::Array(event.args.clone()))),
            "-".repeat(SEPARATOR_WIDTH),
        ];
        if event.name == NOTIFICATION_LIST_EVENT {
            let data = event.first_arg().cloned().unwrap_or(Value::Null);
            lines.push(format!("NOTIFICATION LIST DATA: {}", pretty_json(&data)));
        }
        console.block(lines.iter().map(String::as_str));
    }

    fn lock_state(&self) -> MutexGuard<'_, RecorderSnapshot> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventSink for EventRecorder {
    fn on_event(&self, event: &ClientEvent) {
        match event {
            ClientEvent::Connected { sid } => {
                tracing::info!(target: "recorder", sid = ?sid, "connected");
                if let Some(console) = &self.console {
                    console.line("Connected to Uptime Kuma Socket.IO server");
                }
                self.lock_state().socket_sid = sid.clone();
            }
            ClientEvent::Disconnected { reason } => {
                tracing::info!(target: "recorder", reason = %reason, "disconnected");
                if let Some(console) = &self.console {
                    console.line(format!("Disconnected from server ({reason})"));
                }
                self.lock_state().disconnect_reason = Some(reason.clone());
            }
            ClientEvent::Event(inbound) => self.record_event(inbound),
        }
    }
}

pub fn pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
