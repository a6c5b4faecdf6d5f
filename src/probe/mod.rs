pub mod plan;
pub mod runner;

use std::{fmt, time::Duration};

use serde_json::Value;

use crate::{preflight::PreflightOutcome, recorder::RecorderSnapshot, socketio::SessionInfo};

pub use plan::{ProbeStep, default_plan};
pub use runner::run_probe;

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Waited,
    Emitted,
    Acknowledged(Vec<Value>),
    NoAcknowledgement,
    LoggedIn,
    Rejected(String),
    Created { id: Option<u64> },
    Listed { count: usize },
    Skipped(String),
    Failed(String),
    Interrupted,
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Waited => write!(f, "waited"),
            StepOutcome::Emitted => write!(f, "emitted"),
            StepOutcome::Acknowledged(args) => write!(f, "acknowledged ({} args)", args.len()),
            StepOutcome::NoAcknowledgement => write!(f, "no acknowledgement"),
            StepOutcome::LoggedIn => write!(f, "logged in"),
            StepOutcome::Rejected(reason) => write!(f, "rejected: {reason}"),
            StepOutcome::Created { id: Some(id) } => write!(f, "created id {id}"),
            StepOutcome::Created { id: None } => write!(f, "created"),
            StepOutcome::Listed { count } => write!(f, "{count} items"),
            StepOutcome::Skipped(reason) => write!(f, "skipped: {reason}"),
            StepOutcome::Failed(reason) => write!(f, "failed: {reason}"),
            StepOutcome::Interrupted => write!(f, "interrupted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub label: String,
    pub outcome: StepOutcome,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeReport {
    pub preflight: Option<PreflightOutcome>,
    pub session: Option<SessionInfo>,
    pub steps: Vec<StepRecord>,
    pub recorded: RecorderSnapshot,
    pub interrupted: bool,
    pub connection_lost: Option<String>,
}

impl ProbeReport {
    pub fn step(&self, label: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|record| record.label == label)
    }
}
