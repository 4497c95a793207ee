//! Relay wire protocol.
//!
//! Three layers, leaves first:
//! - `frame`: message framing over TCP (text/binary/close frames).
//! - `message`: typed control messages (join, select-role, responses).
//! - `chunk`: chunk envelope codec (metadata + base64 payload).
//!
//! The relay only ever looks at the framing and control layers; chunk
//! envelopes pass through it opaquely.

pub mod chunk;
pub mod frame;
pub mod message;

pub use chunk::{Chunk, ChunkEnvelope, ChunkMetadata};
pub use frame::{
    read_frame, write_frame, Frame, FrameKind, CLOSE_NORMAL, CLOSE_POLICY_VIOLATION,
    MAX_FRAME_SIZE,
};
pub use message::{decode_inbound, Command, EventKind, Inbound, Response, Role};
