//! Socket.IO v4 text framing over an Engine.IO v4 websocket
//!
//! Frame layout: one Engine.IO type digit, then for `4` (message) one
//! Socket.IO type digit, an optional `/namespace,`, an optional ack id and
//! a JSON body.
//!
//! | Frame | Meaning |
//! |-------|---------|
//! | `0{...}` | Engine.IO open handshake |
//! | `1` | Engine.IO close |
//! | `2` / `3` | ping / pong |
//! | `40` / `41` | namespace connect / disconnect |
//! | `42[name, payload]` | event |
//! | `44{...}` | namespace connect error |
//! | `6` | noop |

use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::{Error, Result};

use super::identity::ConnectQuery;

/// Engine.IO protocol revision
pub const ENGINE_IO_VERSION: &str = "4";

/// Default namespace
pub const ROOT_NAMESPACE: &str = "/";

/// Server parameters from the open handshake.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(OpenInfo),
    Close,
    Ping(String),
    Pong(String),
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        ack: Option<u64>,
        name: String,
        payload: Value,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
    Noop,
}

impl Packet {
    /// Event on the root namespace
    pub fn event(name: impl Into<String>, payload: Value) -> Self {
        Packet::Event {
            namespace: ROOT_NAMESPACE.to_string(),
            ack: None,
            name: name.into(),
            payload,
        }
    }

    /// Connect to the root namespace
    pub fn connect() -> Self {
        Packet::Connect {
            namespace: ROOT_NAMESPACE.to_string(),
            data: None,
        }
    }
}

fn namespace_prefix(namespace: &str) -> String {
    if namespace == ROOT_NAMESPACE || namespace.is_empty() {
        String::new()
    } else {
        format!("{},", namespace)
    }
}

/// Encode a packet as a text frame
pub fn encode(packet: &Packet) -> String {
    match packet {
        Packet::Open(info) => format!(
            "0{}",
            serde_json::json!({
                "sid": info.sid,
                "pingInterval": info.ping_interval,
                "pingTimeout": info.ping_timeout,
            })
        ),
        Packet::Close => "1".to_string(),
        Packet::Ping(data) => format!("2{}", data),
        Packet::Pong(data) => format!("3{}", data),
        Packet::Connect { namespace, data } => format!(
            "40{}{}",
            namespace_prefix(namespace),
            data.as_ref().map(Value::to_string).unwrap_or_default()
        ),
        Packet::Disconnect { namespace } => format!("41{}", namespace_prefix(namespace)),
        Packet::Event {
            namespace,
            ack,
            name,
            payload,
        } => {
            let body = Value::Array(vec![Value::String(name.clone()), payload.clone()]);
            format!(
                "42{}{}{}",
                namespace_prefix(namespace),
                ack.map(|id| id.to_string()).unwrap_or_default(),
                body
            )
        }
        Packet::ConnectError { namespace, data } => format!(
            "44{}{}",
            namespace_prefix(namespace),
            data.as_ref().map(Value::to_string).unwrap_or_default()
        ),
        Packet::Noop => "6".to_string(),
    }
}

fn malformed(frame: &str, reason: &str) -> Error {
    let preview: String = frame.chars().take(64).collect();
    Error::Channel(format!("malformed frame ({}): {}", reason, preview))
}

/// Decode a text frame
pub fn decode(frame: &str) -> Result<Packet> {
    let mut chars = frame.chars();
    let engine_type = chars.next().ok_or_else(|| malformed(frame, "empty"))?;
    let rest = chars.as_str();

    match engine_type {
        '0' => {
            let info: OpenInfo = serde_json::from_str(rest)
                .map_err(|e| malformed(frame, &format!("open: {}", e)))?;
            Ok(Packet::Open(info))
        }
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping(rest.to_string())),
        '3' => Ok(Packet::Pong(rest.to_string())),
        '4' => decode_socket_packet(frame, rest),
        '6' => Ok(Packet::Noop),
        _ => Err(malformed(frame, "unknown engine packet type")),
    }
}

fn decode_socket_packet(frame: &str, body: &str) -> Result<Packet> {
    let mut chars = body.chars();
    let socket_type = chars.next().ok_or_else(|| malformed(frame, "missing packet type"))?;
    let mut rest = chars.as_str();

    let mut namespace = ROOT_NAMESPACE.to_string();
    if rest.starts_with('/') {
        let end = rest.find(',').unwrap_or(rest.len());
        namespace = rest[..end].to_string();
        rest = rest.get(end + 1..).unwrap_or("");
    }

    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    let ack = if digits > 0 {
        Some(
            rest[..digits]
                .parse::<u64>()
                .map_err(|_| malformed(frame, "ack id"))?,
        )
    } else {
        None
    };
    rest = &rest[digits..];

    let data = if rest.is_empty() {
        None
    } else {
        Some(serde_json::from_str::<Value>(rest).map_err(|e| malformed(frame, &e.to_string()))?)
    };

    match socket_type {
        '0' => Ok(Packet::Connect { namespace, data }),
        '1' => Ok(Packet::Disconnect { namespace }),
        '2' => {
            let Some(Value::Array(mut items)) = data else {
                return Err(malformed(frame, "event body is not an array"));
            };
            if items.is_empty() {
                return Err(malformed(frame, "event without a name"));
            }
            let name = match items.remove(0) {
                Value::String(name) => name,
                _ => return Err(malformed(frame, "event name is not a string")),
            };
            let payload = if items.is_empty() {
                Value::Null
            } else {
                items.swap_remove(0)
            };
            Ok(Packet::Event {
                namespace,
                ack,
                name,
                payload,
            })
        }
        '4' => Ok(Packet::ConnectError { namespace, data }),
        _ => Err(malformed(frame, "unsupported socket packet type")),
    }
}

/// Websocket URL of a Socket.IO server for a handshake query.
///
/// `http(s)` base URLs are mapped to `ws(s)`.
pub fn socket_url(base: &str, query: &ConnectQuery) -> Result<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| Error::Config(format!("invalid socket url {}: {}", base, e)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(Error::Config(format!(
                "unsupported socket url scheme: {}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| Error::Config(format!("cannot use scheme {} for {}", scheme, base)))?;

    let path = format!("{}/socket.io/", url.path().trim_end_matches('/'));
    url.set_path(&path);

    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        pairs.append_pair("EIO", ENGINE_IO_VERSION);
        pairs.append_pair("transport", "websocket");
        for (key, value) in query.pairs() {
            pairs.append_pair(key, &value);
        }
    }

    Ok(url)
}
