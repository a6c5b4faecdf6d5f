use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

fn default_step_wait_ms() -> u64 {
    2_000
}

/// One scripted interaction. Every step owns a fixed window: the step runs at
/// its start and the rest of the window is spent listening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum ProbeStep {
    Login {
        #[serde(default = "default_step_wait_ms")]
        wait_ms: u64,
    },
    Call {
        event: String,
        #[serde(default)]
        args: Vec<Value>,
        #[serde(default = "default_step_wait_ms")]
        wait_ms: u64,
    },
    Emit {
        event: String,
        #[serde(default)]
        args: Vec<Value>,
        #[serde(default = "default_step_wait_ms")]
        wait_ms: u64,
    },
    CreateNotification {
        #[serde(default = "default_step_wait_ms")]
        wait_ms: u64,
    },
    ListNotifications {
        #[serde(default = "default_step_wait_ms")]
        wait_ms: u64,
    },
    ListMonitors {
        #[serde(default = "default_step_wait_ms")]
        wait_ms: u64,
    },
    Wait {
        ms: u64,
        #[serde(default)]
        label: Option<String>,
    },
}

impl ProbeStep {
    pub fn label(&self) -> String {
        match self {
            ProbeStep::Login { .. } => "login".to_string(),
            ProbeStep::Call { event, .. } => format!("call {event}"),
            ProbeStep::Emit { event, .. } => format!("emit {event}"),
            ProbeStep::CreateNotification { .. } => "create notification".to_string(),
            ProbeStep::ListNotifications { .. } => "list notifications".to_string(),
            ProbeStep::ListMonitors { .. } => "list monitors".to_string(),
            ProbeStep::Wait { label, .. } => match label {
                Some(label) => format!("wait ({label})"),
                None => "wait".to_string(),
            },
        }
    }

    pub fn window(&self) -> Duration {
        let ms = match self {
            ProbeStep::Login { wait_ms }
            | ProbeStep::Call { wait_ms, .. }
            | ProbeStep::Emit { wait_ms, .. }
            | ProbeStep::CreateNotification { wait_ms }
            | ProbeStep::ListNotifications { wait_ms }
            | ProbeStep::ListMonitors { wait_ms } => *wait_ms,
            ProbeStep::Wait { ms, .. } => *ms,
        };
        Duration::from_millis(ms)
    }
}

fn probe_call(event: &str) -> ProbeStep {
    ProbeStep::Call {
        event: event.to_string(),
        args: vec![json!({})],
        wait_ms: 2_000,
    }
}

/// The discovery session: settle, log in, try every list call Kuma might
/// answer, create a webhook notification, look again, then linger.
pub fn default_plan() -> Vec<ProbeStep> {
    vec![
        ProbeStep::Wait {
            ms: 1_000,
            label: Some("connection settle".to_string()),
        },
        ProbeStep::Login { wait_ms: 2_000 },
        ProbeStep::Wait {
            ms: 2_000,
            label: Some("initial events".to_string()),
        },
        probe_call("getNotificationList"),
        probe_call("getNotifications"),
        probe_call("getSettings"),
        ProbeStep::CreateNotification { wait_ms: 3_000 },
        probe_call("getNotificationList"),
        ProbeStep::Wait {
            ms: 5_000,
            label: Some("additional events".to_string()),
        },
    ]
}
