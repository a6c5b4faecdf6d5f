use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::kuma::error::{KumaError, decode_error};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub token: String,
}

impl LoginRequest {
    pub fn to_args(&self) -> Result<Vec<Value>, KumaError> {
        let body = serde_json::to_value(self).map_err(|err| decode_error("login request", err))?;
        Ok(vec![body])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub token_required: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
struct AddNotificationResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    id: Option<u64>,
}

/// Body of `addNotification`. Provider-specific settings such as
/// `webhookURL` sit next to the common fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDraft {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub apply_existing: bool,
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl Default for NotificationDraft {
    fn default() -> Self {
        let mut settings = Map::new();
        settings.insert(
            "webhookURL".to_string(),
            Value::String("https://httpbin.org/post".to_string()),
        );
        settings.insert(
            "webhookContentType".to_string(),
            Value::String("application/json".to_string()),
        );
        Self {
            name: "Socket.IO Test Notification".to_string(),
            kind: "webhook".to_string(),
            is_default: false,
            apply_existing: false,
            settings,
        }
    }
}

impl NotificationDraft {
    /// `addNotification(notification, notificationId)`; a null id creates.
    pub fn to_add_args(&self) -> Result<Vec<Value>, KumaError> {
        let body =
            serde_json::to_value(self).map_err(|err| decode_error("notification draft", err))?;
        Ok(vec![body, Value::Null])
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Notification {
    pub id: u64,
    pub name: String,
    pub kind: Option<String>,
    pub active: bool,
    pub is_default: bool,
    pub apply_existing: bool,
    pub user_id: Option<u64>,
    pub config: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNotification {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "loose_flag")]
    active: bool,
    #[serde(default, deserialize_with = "loose_flag")]
    is_default: bool,
    #[serde(default)]
    user_id: Option<u64>,
    #[serde(default)]
    config: Option<Value>,
}

impl From<RawNotification> for Notification {
    fn from(raw: RawNotification) -> Self {
        let config = match raw.config {
            Some(Value::String(text)) => match serde_json::from_str::<Map<String, Value>>(&text) {
                Ok(config) => config,
                Err(err) => {
                    tracing::debug!(
                        target: "kuma",
                        notification_id = raw.id,
                        error = %err,
                        "notification_config_undecodable"
                    );
                    Map::new()
                }
            },
            Some(Value::Object(config)) => config,
            _ => Map::new(),
        };

        Self {
            id: raw.id,
            name: raw.name.unwrap_or_default(),
            kind: config
                .get("type")
                .and_then(Value::as_str)
                .map(str::to_string),
            active: raw.active,
            is_default: raw.is_default,
            apply_existing: config.get("applyExisting").is_some_and(flag_value),
            user_id: raw.user_id,
            config,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Monitor {
    pub id: u64,
    #[serde(default, deserialize_with = "nullable_text")]
    pub name: String,
    #[serde(default, rename = "type", deserialize_with = "nullable_text")]
    pub kind: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub port: Option<u64>,
    #[serde(default)]
    pub interval: Option<u64>,
    #[serde(default, deserialize_with = "loose_flag")]
    pub active: bool,
    #[serde(
        default,
        rename = "accepted_statuscodes",
        deserialize_with = "nullable_list"
    )]
    pub accepted_status_codes: Vec<String>,
}

/// Decodes the `notificationList` push. Entries that do not look like a
/// notification are skipped.
pub fn parse_notification_list(payload: &Value) -> Result<Vec<Notification>, KumaError> {
    let Value::Array(entries) = payload else {
        return Err(decode_error(
            "notification list",
            format!("expected an array, got {}", json_kind(payload)),
        ));
    };

    let mut notifications = Vec::with_capacity(entries.len());
    for entry in entries {
        match RawNotification::deserialize(entry) {
            Ok(raw) => notifications.push(Notification::from(raw)),
            Err(err) => {
                tracing::warn!(target: "kuma", error = %err, "notification_entry_skipped");
            }
        }
    }
    Ok(notifications)
}

/// Decodes the `monitorList` push, an object keyed by monitor id. Result is
/// ordered by id.
pub fn parse_monitor_list(payload: &Value) -> Result<Vec<Monitor>, KumaError> {
    let entries: Vec<&Value> = match payload {
        Value::Object(map) => map.values().collect(),
        Value::Array(list) => list.iter().collect(),
        other => {
            return Err(decode_error(
                "monitor list",
                format!("expected an object, got {}", json_kind(other)),
            ));
        }
    };

    let mut monitors = Vec::with_capacity(entries.len());
    for entry in entries {
        match Monitor::deserialize(entry) {
            Ok(monitor) => monitors.push(monitor),
            Err(err) => {
                tracing::warn!(target: "kuma", error = %err, "monitor_entry_skipped");
            }
        }
    }
    monitors.sort_by_key(|monitor| monitor.id);
    Ok(monitors)
}

pub fn interpret_login(args: &[Value]) -> Result<LoginResponse, KumaError> {
    let body = args.first().ok_or_else(|| KumaError::EmptyResponse {
        event: "login".to_string(),
    })?;
    let response =
        LoginResponse::deserialize(body).map_err(|err| decode_error("login response", err))?;

    if response.ok {
        return Ok(response);
    }
    if response.token_required {
        return Err(KumaError::TokenRequired);
    }
    Err(KumaError::Rejected {
        event: "login".to_string(),
        message: response
            .msg
            .unwrap_or_else(|| "login rejected without a message".to_string()),
    })
}

/// Returns the id of the created notification when the server reports one.
pub fn interpret_add_notification(args: &[Value]) -> Result<Option<u64>, KumaError> {
    let body = args.first().ok_or_else(|| KumaError::EmptyResponse {
        event: "addNotification".to_string(),
    })?;
    let response = AddNotificationResponse::deserialize(body)
        .map_err(|err| decode_error("addNotification response", err))?;

    if !response.ok {
        return Err(KumaError::Rejected {
            event: "addNotification".to_string(),
            message: response
                .msg
                .unwrap_or_else(|| "rejected without a message".to_string()),
        });
    }
    Ok(response.id)
}

fn flag_value(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => matches!(text.as_str(), "1" | "true"),
        _ => false,
    }
}

fn loose_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().is_some_and(flag_value))
}

fn nullable_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn nullable_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
