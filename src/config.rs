use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use jsonschema::{JSONSchema, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{kuma::NotificationDraft, probe::plan::ProbeStep, socketio::ConnectOptions};

const CONFIG_SCHEMA: &str = include_str!("../kuma-probe.schema.json");

pub const DEFAULT_CONFIG_PATH: &str = "./kuma-probe.jsonc";

pub const ENV_URL: &str = "KUMA_PROBE_URL";
pub const ENV_USERNAME: &str = "KUMA_PROBE_USERNAME";
pub const ENV_PASSWORD: &str = "KUMA_PROBE_PASSWORD";
pub const ENV_TOKEN: &str = "KUMA_PROBE_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub preflight: PreflightConfig,
    #[serde(default = "default_enabled_true")]
    pub echo_events: bool,
    #[serde(default)]
    pub test_notification: NotificationDraft,
    #[serde(default = "crate::probe::plan::default_plan")]
    pub plan: Vec<ProbeStep>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            credentials: CredentialsConfig::default(),
            timing: TimingConfig::default(),
            preflight: PreflightConfig::default(),
            echo_events: true,
            test_notification: NotificationDraft::default(),
            plan: crate::probe::plan::default_plan(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_enabled_true() -> bool {
    true
}

fn default_base_url() -> String {
    "http://localhost:3001".to_string()
}

fn default_socketio_path() -> String {
    "/socket.io/".to_string()
}

fn default_namespace() -> String {
    "/".to_string()
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_ack_timeout_ms() -> u64 {
    30_000
}

fn default_refresh_settle_ms() -> u64 {
    1_000
}

fn default_preflight_timeout_ms() -> u64 {
    5_000
}

fn default_logging_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_logging_filter() -> String {
    "info".to_string()
}

fn default_logging_rotation() -> LoggingRotation {
    LoggingRotation::Daily
}

fn default_logging_retention_days() -> usize {
    14
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_socketio_path")]
    pub socketio_path: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            socketio_path: default_socketio_path(),
            namespace: default_namespace(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialsConfig {
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            password: None,
            token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimingConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    #[serde(default = "default_refresh_settle_ms")]
    pub refresh_settle_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            ack_timeout_ms: default_ack_timeout_ms(),
            refresh_settle_ms: default_refresh_settle_ms(),
        }
    }
}

impl TimingConfig {
    pub fn refresh_settle(&self) -> Duration {
        Duration::from_millis(self.refresh_settle_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreflightConfig {
    #[serde(default = "default_enabled_true")]
    pub enabled: bool,
    #[serde(default = "default_preflight_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: default_preflight_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LoggingRotation {
    Daily,
    Hourly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_logging_filter")]
    pub filter: String,
    #[serde(default = "default_logging_rotation")]
    pub rotation: LoggingRotation,
    #[serde(default = "default_logging_retention_days")]
    pub retention_days: usize,
    #[serde(default = "default_enabled_true")]
    pub stderr_warn_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_logging_dir(),
            filter: default_logging_filter(),
            rotation: default_logging_rotation(),
            retention_days: default_logging_retention_days(),
            stderr_warn_enabled: true,
        }
    }
}

impl Config {
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let config_base = config_path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_json5(&config_content, config_base)
            .with_context(|| format!("invalid config {}", config_path.display()))
    }

    /// Loads `config_path` when it exists. A missing file falls back to the
    /// built-in defaults unless the caller named it explicitly.
    pub fn load_or_default(config_path: &Path, explicit: bool) -> Result<Self> {
        if !explicit && !config_path.exists() {
            return Ok(Self::default());
        }
        Self::load(config_path)
    }

    pub fn from_json5(config_content: &str, config_base: &Path) -> Result<Self> {
        let config_value: Value =
            json5::from_str(config_content).context("failed to parse config as json5")?;
        validate_against_schema(&config_value)?;

        let mut config: Config =
            serde_json::from_value(config_value).context("failed to deserialize config")?;
        if !config.logging.dir.is_absolute() {
            config.logging.dir = config_base.join(&config.logging.dir);
        }
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base_url) = lookup(ENV_URL) {
            self.server.base_url = base_url;
        }
        if let Some(username) = lookup(ENV_USERNAME) {
            self.credentials.username = username;
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            self.credentials.password = Some(password);
        }
        if let Some(token) = lookup(ENV_TOKEN) {
            self.credentials.token = Some(token);
        }
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            base_url: self.server.base_url.clone(),
            socketio_path: self.server.socketio_path.clone(),
            namespace: self.server.namespace.clone(),
            auth: None,
            connect_timeout: Duration::from_millis(self.timing.connect_timeout_ms),
            ack_timeout: Duration::from_millis(self.timing.ack_timeout_ms),
        }
    }
}

fn validate_against_schema(config_value: &Value) -> Result<()> {
    let schema: Value =
        serde_json::from_str(CONFIG_SCHEMA).context("failed to parse embedded config schema")?;
    let compiled =
        JSONSchema::compile(&schema).map_err(|e| anyhow!("failed to compile schema: {e}"))?;

    match compiled.validate(config_value) {
        Ok(()) => Ok(()),
        Err(errors_iter) => {
            let validation_errors: Vec<ValidationError> = errors_iter.collect();
            let messages: Vec<String> = validation_errors
                .into_iter()
                .map(|error| error.to_string())
                .collect();
            Err(anyhow!("config validation failed: {}", messages.join("; ")))
        }
    }
}
