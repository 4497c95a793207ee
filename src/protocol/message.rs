//! Typed control messages.
//!
//! The inbound message set is finite: join, select-role, or a chunk
//! envelope. Each Text frame is decoded exactly once into [`Inbound`];
//! anything that matches neither shape is an unrecognized message and
//! closes the connection.
//!
//! Wire shapes match the reference protocol:
//!
//! ```text
//! client -> relay: {"command":"join","channel":"<name>"}
//!                  {"command":"select-role","role":"sender"|"receiver"}
//! relay -> client: {"type":"STATUS","message":"..."}
//!                  {"type":"ERROR","message":"..."}
//!                  {"status":"ready"}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::chunk::ChunkEnvelope;
use crate::protocol::frame::Frame;

/// Role a connection acquires once per channel membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Sender,
    Receiver,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sender => f.write_str("sender"),
            Self::Receiver => f.write_str("receiver"),
        }
    }
}

/// Client -> relay control commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Command {
    Join { channel: String },
    SelectRole { role: Role },
}

impl Command {
    pub fn to_frame(&self) -> Frame {
        to_text_frame(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "STATUS")]
    Status,
    #[serde(rename = "ERROR")]
    Error,
}

/// The only value the `status` field ever carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadyStatus {
    #[serde(rename = "ready")]
    Ready,
}

/// Relay -> client responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Event {
        #[serde(rename = "type")]
        kind: EventKind,
        message: String,
    },
    Ready {
        status: ReadyStatus,
    },
}

impl Response {
    pub fn status(message: impl Into<String>) -> Self {
        Self::Event {
            kind: EventKind::Status,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Event {
            kind: EventKind::Error,
            message: message.into(),
        }
    }

    pub fn ready() -> Self {
        Self::Ready {
            status: ReadyStatus::Ready,
        }
    }

    pub fn to_frame(&self) -> Frame {
        to_text_frame(self)
    }
}

/// One inbound Text frame, decoded once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Control(Command),
    Chunk(ChunkEnvelope),
}

/// Decode an inbound Text frame into the typed message set.
///
/// A chunk envelope carries no `command` tag, so the control set is
/// tried first and the envelope shape second. An invalid role value
/// fails the control parse and the envelope parse, and is reported as
/// an unrecognized message.
pub fn decode_inbound(bytes: &[u8]) -> Result<Inbound> {
    if let Ok(cmd) = serde_json::from_slice::<Command>(bytes) {
        return Ok(Inbound::Control(cmd));
    }
    if let Ok(envelope) = serde_json::from_slice::<ChunkEnvelope>(bytes) {
        return Ok(Inbound::Chunk(envelope));
    }
    Err(Error::Protocol("unrecognized message".into()))
}

/// Serialize a message into a Text frame.
pub(crate) fn to_text_frame<T: Serialize>(value: &T) -> Frame {
    // Protocol messages contain only string and integer fields; JSON
    // serialization cannot fail for them.
    let body = serde_json::to_vec(value).expect("protocol message serializes to JSON");
    Frame::text(body)
}
