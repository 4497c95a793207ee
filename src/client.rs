//! Client-side relay connection.
//!
//! A thin typed wrapper over the framed transport: join a channel,
//! request a role, then wait for the relay to report the pairing ready.
//! Chunk traffic rides the same connection via [`RelayConnection::send`]
//! and [`RelayConnection::recv`].

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::protocol::{read_frame, write_frame, Command, EventKind, Frame, Response, Role};

pub struct RelayConnection<S> {
    stream: S,
}

impl RelayConnection<TcpStream> {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

impl<S> RelayConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub async fn send(&mut self, frame: &Frame) -> Result<()> {
        write_frame(&mut self.stream, frame).await
    }

    pub async fn recv(&mut self) -> Result<Frame> {
        read_frame(&mut self.stream).await
    }

    /// Join a channel. Must be the first exchange on the connection;
    /// the relay acknowledges with a STATUS event.
    pub async fn join(&mut self, channel: &str) -> Result<()> {
        let command = Command::Join {
            channel: channel.to_string(),
        };
        self.send(&command.to_frame()).await?;

        match self.recv().await? {
            Frame::Text(bytes) => match serde_json::from_slice::<Response>(&bytes) {
                Ok(Response::Event {
                    kind: EventKind::Status,
                    ..
                }) => Ok(()),
                Ok(Response::Event {
                    kind: EventKind::Error,
                    message,
                }) => Err(Error::Protocol(message)),
                _ => Err(Error::Protocol("unrecognized join response".into())),
            },
            Frame::Close { code, reason } => Err(closed_by_relay(code, &reason)),
            Frame::Binary(_) => Err(Error::Protocol("unexpected binary frame from relay".into())),
        }
    }

    /// Request a role. The relay answers a rejected request with an
    /// ERROR event; an accepted sender gets no immediate reply at all,
    /// its ready notification arrives once a receiver pairs up. Use
    /// [`RelayConnection::await_ready`] to observe either outcome.
    pub async fn request_role(&mut self, role: Role) -> Result<()> {
        self.send(&Command::SelectRole { role }.to_frame()).await
    }

    /// Block until the relay reports the pairing ready.
    pub async fn await_ready(&mut self) -> Result<()> {
        loop {
            match self.recv().await? {
                Frame::Text(bytes) => match serde_json::from_slice::<Response>(&bytes) {
                    Ok(Response::Ready { .. }) => return Ok(()),
                    Ok(Response::Event {
                        kind: EventKind::Error,
                        message,
                    }) => return Err(Error::RoleConflict(message)),
                    // STATUS chatter is expected here; anything else
                    // (a chunk envelope, say) must not be dropped on
                    // the floor.
                    Ok(Response::Event {
                        kind: EventKind::Status,
                        ..
                    }) => continue,
                    Err(_) => {
                        return Err(Error::Protocol(
                            "unrecognized message while waiting for ready".into(),
                        ))
                    }
                },
                Frame::Close { code, reason } => return Err(closed_by_relay(code, &reason)),
                Frame::Binary(_) => {
                    return Err(Error::Protocol("unexpected binary frame from relay".into()))
                }
            }
        }
    }
}

fn closed_by_relay(code: u16, reason: &str) -> Error {
    Error::PeerUnavailable(format!("relay closed connection ({code}): {reason}"))
}

/// Derive a per-transfer channel code.
///
/// Codes need to be unique across concurrent transfers, not
/// guess-proof; the relay offers no authentication.
pub fn generate_channel_code() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let mut hasher = blake3::Hasher::new();
    hasher.update(&now.as_nanos().to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    hex::encode(&hasher.finalize().as_bytes()[..6])
}
