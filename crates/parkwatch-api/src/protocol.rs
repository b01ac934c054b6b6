//! Engine.IO v4 / Socket.IO v5 text framing.
//!
//! A Socket.IO server speaks two nested protocols over one WebSocket:
//! Engine.IO packets (`0` open, `2` ping, `4` message, ...) whose message
//! bodies carry Socket.IO packets (`0` connect, `2` event, ...). Only the
//! text encoding is implemented; binary attachments are recognised and
//! skipped.
//!
//! ```text
//! 0{"sid":"abc","pingInterval":25000,"pingTimeout":20000}   engine open
//! 40                                                         socket connect, "/"
//! 42["update_data",{"par1.mp4/1":"1"}]                       socket event
//! 42/admin,7["ping",{}]                                      event, namespace + ack id
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Engine.IO protocol revision requested in the connection URL.
pub const ENGINE_IO_VERSION: u8 = 4;

/// The namespace every Socket.IO server exposes.
pub const DEFAULT_NAMESPACE: &str = "/";

// ── Engine.IO ────────────────────────────────────────────────────────

/// Session parameters sent by the server in the `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Engine.IO session id.
    pub sid: String,

    /// Transports the server would accept an upgrade to.
    #[serde(default)]
    pub upgrades: Vec<String>,

    /// Milliseconds between server pings.
    pub ping_interval: u64,

    /// Milliseconds the server waits for a pong.
    pub ping_timeout: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

impl Handshake {
    /// Longest silence tolerated before the connection is considered dead.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

/// One Engine.IO text packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(frame: &str) -> Result<Self, Error> {
        let (kind, body) =
            split_kind(frame).ok_or_else(|| Error::Protocol("empty Engine.IO frame".into()))?;

        match kind {
            '0' => serde_json::from_str(body)
                .map(Self::Open)
                .map_err(|e| Error::Handshake(format!("invalid open packet: {e}"))),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(body.to_owned())),
            '3' => Ok(Self::Pong(body.to_owned())),
            '4' => Ok(Self::Message(body.to_owned())),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(Error::Protocol(format!(
                "unknown Engine.IO packet type '{other}'"
            ))),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Open(handshake) => {
                format!("0{}", serde_json::to_string(handshake).unwrap_or_default())
            }
            Self::Close => "1".into(),
            Self::Ping(data) => format!("2{data}"),
            Self::Pong(data) => format!("3{data}"),
            Self::Message(body) => format!("4{body}"),
            Self::Upgrade => "5".into(),
            Self::Noop => "6".into(),
        }
    }
}

// ── Socket.IO ────────────────────────────────────────────────────────

/// One Socket.IO packet, carried inside an Engine.IO message.
#[derive(Debug, Clone, PartialEq, Eq)]
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
        ack: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        ack: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
    /// Binary event or ack. Attachments arrive as separate frames we never read.
    Binary,
}

impl SocketPacket {
    pub fn decode(body: &str) -> Result<Self, Error> {
        let (kind, rest) =
            split_kind(body).ok_or_else(|| Error::Protocol("empty Socket.IO packet".into()))?;

        if matches!(kind, '5' | '6') {
            return Ok(Self::Binary);
        }

        let (namespace, rest) = split_namespace(rest);
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (ack_digits, json) = rest.split_at(digits);
        let ack = if ack_digits.is_empty() {
            None
        } else {
            Some(ack_digits.parse::<u64>().map_err(|e| {
                Error::Protocol(format!("invalid ack id '{ack_digits}': {e}"))
            })?)
        };

        match kind {
            '0' => Ok(Self::Connect {
                namespace,
                data: parse_optional(json)?,
            }),
            '1' => Ok(Self::Disconnect { namespace }),
            '2' => {
                let mut args = parse_array(json)?;
                if args.is_empty() {
                    return Err(Error::Protocol("event packet without a name".into()));
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    other => {
                        return Err(Error::Protocol(format!(
                            "event name must be a string, got {other}"
                        )));
                    }
                };
                Ok(Self::Event {
                    namespace,
                    ack,
                    name,
                    args,
                })
            }
            '3' => {
                let ack = ack.ok_or_else(|| Error::Protocol("ack packet without an id".into()))?;
                Ok(Self::Ack {
                    namespace,
                    ack,
                    args: parse_array(json)?,
                })
            }
            '4' => Ok(Self::ConnectError {
                namespace,
                data: parse_optional(json)?,
            }),
            other => Err(Error::Protocol(format!(
                "unknown Socket.IO packet type '{other}'"
            ))),
        }
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(self.kind());

        let namespace = self.namespace();
        if namespace != DEFAULT_NAMESPACE {
            out.push_str(namespace);
            out.push(',');
        }

        match self {
            Self::Connect { data, .. } | Self::ConnectError { data, .. } => {
                if let Some(data) = data {
                    out.push_str(&data.to_string());
                }
            }
            Self::Event {
                ack, name, args, ..
            } => {
                if let Some(id) = ack {
                    out.push_str(&id.to_string());
                }
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                out.push_str(&Value::Array(items).to_string());
            }
            Self::Ack { ack, args, .. } => {
                out.push_str(&ack.to_string());
                out.push_str(&Value::Array(args.clone()).to_string());
            }
            Self::Disconnect { .. } | Self::Binary => {}
        }

        out
    }

    pub fn namespace(&self) -> &str {
        match self {
            Self::Connect { namespace, .. }
            | Self::Disconnect { namespace }
            | Self::Event { namespace, .. }
            | Self::Ack { namespace, .. }
            | Self::ConnectError { namespace, .. } => namespace,
            Self::Binary => DEFAULT_NAMESPACE,
        }
    }

    fn kind(&self) -> char {
        match self {
            Self::Connect { .. } => '0',
            Self::Disconnect { .. } => '1',
            Self::Event { .. } => '2',
            Self::Ack { .. } => '3',
            Self::ConnectError { .. } => '4',
            Self::Binary => '5',
        }
    }

    /// Wrap this packet in an Engine.IO message frame.
    pub fn to_frame(&self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn split_kind(frame: &str) -> Option<(char, &str)> {
    let mut chars = frame.chars();
    let kind = chars.next()?;
    Some((kind, chars.as_str()))
}

fn split_namespace(rest: &str) -> (String, &str) {
    if !rest.starts_with('/') {
        return (DEFAULT_NAMESPACE.to_owned(), rest);
    }
    match rest.split_once(',') {
        Some((namespace, tail)) => (namespace.to_owned(), tail),
        None => (rest.to_owned(), ""),
    }
}

fn parse_optional(json: &str) -> Result<Option<Value>, Error> {
    if json.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(json)
        .map(Some)
        .map_err(|e| Error::deserialization(&e, json))
}

fn parse_array(json: &str) -> Result<Vec<Value>, Error> {
    serde_json::from_str(json).map_err(|e| Error::deserialization(&e, json))
}

// ── Tests ────────────────────────────────────────────────────────────
