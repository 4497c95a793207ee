//! Error taxonomy for the relay and transfer paths.
//!
//! Control-path errors are handled inside each relay session and never
//! crash the relay process. Transfer-path errors surface to the CLI as
//! a terminal failure of the whole transfer.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Wrong message type, malformed join/role message, or invalid role
    /// value. Fatal to the connection; closed with a policy-violation
    /// code.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Role slot already occupied, or receiver joining with no sender
    /// present. Recoverable: the connection stays in role selection and
    /// the client may retry.
    #[error("{0}")]
    RoleConflict(String),

    /// Forward target (paired sender or receiver) missing or its send
    /// failed.
    #[error("peer unavailable: {0}")]
    PeerUnavailable(String),

    /// Chunk envelope failed to decode: missing or non-numeric metadata,
    /// undecodable payload, or a chunk_size that disagrees with the
    /// payload length. Fatal to the transfer.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// A chunk arrived out of the expected monotonic order. Fatal to the
    /// transfer; there is no reordering buffer or retransmission.
    #[error("sequence violation: expected chunk {expected}, got {got}")]
    SequenceViolation { expected: u64, got: u64 },

    /// The total_chunks field changed mid-transfer.
    #[error("total_chunks changed mid-transfer: first chunk said {first}, got {got}")]
    InconsistentTotal { first: u64, got: u64 },

    /// Connection read/write failure. Ends the session's forward loop
    /// and triggers slot cleanup.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// The peer's outbound queue is gone (its writer task ended).
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
