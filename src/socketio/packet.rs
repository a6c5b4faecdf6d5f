//! Engine.IO v4 / Socket.IO v5 text packet codec.
//!
//! An Engine.IO frame is a one-character packet type followed by its payload.
//! A `message` frame carries exactly one Socket.IO packet:
//! `<type>[/<namespace>,][<ack id>][<json>]`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::socketio::error::{ClientError, protocol_error, serialization_error};

pub const DEFAULT_NAMESPACE: &str = "/";

/// Separator between packets in an HTTP long-polling payload.
pub const POLLING_RECORD_SEPARATOR: char = '\u{1e}';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(Option<String>),
    Pong(Option<String>),
    Message(String),
    Upgrade,
    Noop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Value,
    },
}

impl SocketPacket {
    pub fn namespace(&self) -> &str {
        match self {
            SocketPacket::Connect { namespace, .. }
            | SocketPacket::Disconnect { namespace }
            | SocketPacket::Event { namespace, .. }
            | SocketPacket::Ack { namespace, .. }
            | SocketPacket::ConnectError { namespace, .. } => namespace,
        }
    }

    fn type_char(&self) -> char {
        match self {
            SocketPacket::Connect { .. } => '0',
            SocketPacket::Disconnect { .. } => '1',
            SocketPacket::Event { .. } => '2',
            SocketPacket::Ack { .. } => '3',
            SocketPacket::ConnectError { .. } => '4',
        }
    }
}

pub fn parse_engine_packet(frame: &str) -> Result<EnginePacket, ClientError> {
    let mut chars = frame.chars();
    let Some(kind) = chars.next() else {
        return Err(protocol_error("empty engine.io frame"));
    };
    let body = chars.as_str();

    let packet = match kind {
        '0' => {
            let handshake: OpenHandshake = serde_json::from_str(body)
                .map_err(|err| protocol_error(format!("invalid engine.io open packet: {err}")))?;
            EnginePacket::Open(handshake)
        }
        '1' => EnginePacket::Close,
        '2' => EnginePacket::Ping(non_empty(body)),
        '3' => EnginePacket::Pong(non_empty(body)),
        '4' => EnginePacket::Message(body.to_string()),
        '5' => EnginePacket::Upgrade,
        '6' => EnginePacket::Noop,
        other => {
            return Err(protocol_error(format!(
                "unknown engine.io packet type '{other}'"
            )));
        }
    };
    Ok(packet)
}

pub fn encode_engine_packet(packet: &EnginePacket) -> Result<String, ClientError> {
    let encoded = match packet {
        EnginePacket::Open(handshake) => format!("0{}", to_json(handshake)?),
        EnginePacket::Close => "1".to_string(),
        EnginePacket::Ping(payload) => format!("2{}", payload.as_deref().unwrap_or("")),
        EnginePacket::Pong(payload) => format!("3{}", payload.as_deref().unwrap_or("")),
        EnginePacket::Message(payload) => format!("4{payload}"),
        EnginePacket::Upgrade => "5".to_string(),
        EnginePacket::Noop => "6".to_string(),
    };
    Ok(encoded)
}

pub fn parse_socket_packet(payload: &str) -> Result<SocketPacket, ClientError> {
    let mut chars = payload.chars();
    let Some(kind) = chars.next() else {
        return Err(protocol_error("empty socket.io packet"));
    };
    if matches!(kind, '5' | '6') {
        return Err(protocol_error(
            "binary socket.io packets are not supported",
        ));
    }

    let mut rest = chars.as_str();
    let namespace = match rest.strip_prefix('/') {
        Some(stripped) => match stripped.find(',') {
            Some(end) => {
                rest = &stripped[end + 1..];
                format!("/{}", &stripped[..end])
            }
            None => {
                rest = "";
                format!("/{stripped}")
            }
        },
        None => DEFAULT_NAMESPACE.to_string(),
    };

    let digits = rest.bytes().take_while(|byte| byte.is_ascii_digit()).count();
    let id = if digits > 0 {
        let parsed = rest[..digits]
            .parse::<u64>()
            .map_err(|err| protocol_error(format!("invalid ack id '{}': {err}", &rest[..digits])))?;
        Some(parsed)
    } else {
        None
    };
    rest = &rest[digits..];

    let data = if rest.trim().is_empty() {
        None
    } else {
        let value: Value = serde_json::from_str(rest)
            .map_err(|err| protocol_error(format!("invalid socket.io packet data: {err}")))?;
        Some(value)
    };

    let packet = match kind {
        '0' => SocketPacket::Connect { namespace, data },
        '1' => SocketPacket::Disconnect { namespace },
        '2' => {
            let Some(Value::Array(mut items)) = data else {
                return Err(protocol_error("event packet must carry a JSON array"));
            };
            if items.is_empty() {
                return Err(protocol_error("event packet is missing the event name"));
            }
            let name = match items.remove(0) {
                Value::String(name) => name,
                other => {
                    return Err(protocol_error(format!(
                        "event name must be a string, got {other}"
                    )));
                }
            };
            SocketPacket::Event {
                namespace,
                id,
                name,
                args: items,
            }
        }
        '3' => {
            let Some(id) = id else {
                return Err(protocol_error("ack packet without an ack id"));
            };
            let args = match data {
                Some(Value::Array(items)) => items,
                None => Vec::new(),
                Some(other) => {
                    return Err(protocol_error(format!(
                        "ack packet must carry a JSON array, got {other}"
                    )));
                }
            };
            SocketPacket::Ack {
                namespace,
                id,
                args,
            }
        }
        '4' => SocketPacket::ConnectError {
            namespace,
            data: data.unwrap_or(Value::Null),
        },
        other => {
            return Err(protocol_error(format!(
                "unknown socket.io packet type '{other}'"
            )));
        }
    };
    Ok(packet)
}

pub fn encode_socket_packet(packet: &SocketPacket) -> Result<String, ClientError> {
    let mut encoded = String::new();
    encoded.push(packet.type_char());
    let namespace = packet.namespace();
    if namespace != DEFAULT_NAMESPACE {
        encoded.push_str(namespace);
        encoded.push(',');
    }

    match packet {
        SocketPacket::Connect { data, .. } => {
            if let Some(data) = data {
                encoded.push_str(&to_json(data)?);
            }
        }
        SocketPacket::Disconnect { .. } => {}
        SocketPacket::Event { id, name, args, .. } => {
            if let Some(id) = id {
                encoded.push_str(&id.to_string());
            }
            let mut items = Vec::with_capacity(args.len() + 1);
            items.push(Value::String(name.clone()));
            items.extend(args.iter().cloned());
            encoded.push_str(&to_json(&items)?);
        }
        SocketPacket::Ack { id, args, .. } => {
            encoded.push_str(&id.to_string());
            encoded.push_str(&to_json(args)?);
        }
        SocketPacket::ConnectError { data, .. } => {
            encoded.push_str(&to_json(data)?);
        }
    }

    Ok(encoded)
}

/// Wraps a Socket.IO packet in an Engine.IO `message` frame.
pub fn encode_message(packet: &SocketPacket) -> Result<String, ClientError> {
    encode_engine_packet(&EnginePacket::Message(encode_socket_packet(packet)?))
}

fn non_empty(body: &str) -> Option<String> {
    (!body.is_empty()).then(|| body.to_string())
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, ClientError> {
    serde_json::to_string(value)
        .map_err(|err| serialization_error(format!("failed to encode packet data: {err}")))
}
