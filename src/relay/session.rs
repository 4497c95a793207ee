//! Per-connection relay session.
//!
//! Drives one client through join -> role selection -> forwarding ->
//! teardown. The session task owns the read half of the connection; a
//! writer task drains the outbound queue so any peer can forward frames
//! to this connection without blocking on its socket.
//!
//! ```text
//! AwaitJoin -> AwaitRole -> Forwarding -> Closed
//! ```
//!
//! Role rejections keep the session in AwaitRole; everything else that
//! goes wrong closes the connection, clears the session's slot, and
//! reaps the channel once both slots are empty.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::protocol::{
    decode_inbound, read_frame, write_frame, Command, Frame, Inbound, Response, Role,
    CLOSE_NORMAL, CLOSE_POLICY_VIOLATION,
};
use crate::relay::metrics::RelayMetrics;
use crate::relay::registry::{Assignment, ChannelRegistry, PeerHandle};

struct RelaySession {
    id: u64,
    handle: PeerHandle,
    registry: Arc<ChannelRegistry>,
    metrics: Arc<RelayMetrics>,
    handshake_timeout: Duration,
}

/// Run one accepted connection to completion.
pub async fn run<S>(
    stream: S,
    id: u64,
    registry: Arc<ChannelRegistry>,
    metrics: Arc<RelayMetrics>,
    handshake_timeout: Duration,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();

    // Writer task: the session and its peers queue frames here; a close
    // frame is the last thing ever written.
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let is_close = matches!(frame, Frame::Close { .. });
            if write_frame(&mut writer, &frame).await.is_err() {
                break;
            }
            if is_close {
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    let session = RelaySession {
        id,
        handle: PeerHandle::new(id, tx),
        registry: Arc::clone(&registry),
        metrics,
        handshake_timeout,
    };

    let mut joined: Option<String> = None;
    let mut role: Option<Role> = None;
    let result = session.drive(&mut reader, &mut joined, &mut role).await;

    if let Some(name) = joined {
        let removed = match role {
            Some(r) => registry.remove_peer(&name, r, id),
            // Joined but never occupied a slot; reap the channel if
            // nobody else is in it.
            None => registry.remove_if_empty(&name),
        };
        if removed {
            info!(channel = %name, "channel removed");
        }
    }

    match result {
        Ok(()) => debug!(session = id, "session closed"),
        Err(err) => debug!(session = id, %err, "session ended"),
    }

    drop(session);
    let _ = writer_task.await;
}

impl RelaySession {
    async fn drive<R>(
        &self,
        reader: &mut R,
        joined: &mut Option<String>,
        role: &mut Option<Role>,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let channel = self.await_join(reader).await?;
        *joined = Some(channel.clone());

        let assigned = self.await_role(reader, &channel).await?;
        *role = Some(assigned);

        self.forward(reader, &channel, assigned).await
    }

    /// Read one frame during the handshake, enforcing the handshake
    /// timeout. A stalled handshake would otherwise pin the channel
    /// entry forever.
    async fn handshake_frame<R>(&self, reader: &mut R) -> Result<Frame>
    where
        R: AsyncRead + Unpin,
    {
        match timeout(self.handshake_timeout, read_frame(reader)).await {
            Ok(frame) => frame,
            Err(_) => {
                self.close(CLOSE_POLICY_VIOLATION, "Handshake timed out");
                Err(Error::Protocol("handshake timed out".into()))
            }
        }
    }

    async fn await_join<R>(&self, reader: &mut R) -> Result<String>
    where
        R: AsyncRead + Unpin,
    {
        let bytes = match self.handshake_frame(reader).await? {
            Frame::Text(bytes) => bytes,
            Frame::Binary(_) => {
                self.close(CLOSE_POLICY_VIOLATION, "Invalid message type");
                return Err(Error::Protocol("binary frame before join".into()));
            }
            Frame::Close { .. } => return Err(Error::ConnectionClosed),
        };

        let inbound = match decode_inbound(&bytes) {
            Ok(inbound) => inbound,
            Err(err) => {
                self.close(CLOSE_POLICY_VIOLATION, "Malformed message");
                return Err(err);
            }
        };

        let Inbound::Control(Command::Join { channel }) = inbound else {
            self.close(CLOSE_POLICY_VIOLATION, "Must join a channel first");
            return Err(Error::Protocol("first message was not a join".into()));
        };

        if channel.is_empty() {
            self.close(CLOSE_POLICY_VIOLATION, "Channel name must not be empty");
            return Err(Error::Protocol("empty channel name".into()));
        }

        if self.registry.get_or_create(&channel) {
            debug!(channel = %channel, "channel created");
        }
        info!(session = self.id, channel = %channel, "client joined channel");
        self.handle
            .send(Response::status("Joined channel").to_frame())?;

        Ok(channel)
    }

    async fn await_role<R>(&self, reader: &mut R, channel: &str) -> Result<Role>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let bytes = match self.handshake_frame(reader).await? {
                Frame::Text(bytes) => bytes,
                Frame::Binary(_) => {
                    self.close(CLOSE_POLICY_VIOLATION, "Invalid message type");
                    return Err(Error::Protocol("binary frame during role selection".into()));
                }
                Frame::Close { .. } => return Err(Error::ConnectionClosed),
            };

            let requested = match decode_inbound(&bytes) {
                Ok(Inbound::Control(Command::SelectRole { role })) => role,
                Ok(Inbound::Control(Command::Join { .. })) => {
                    debug!(session = self.id, "ignoring duplicate join");
                    continue;
                }
                Ok(Inbound::Chunk(_)) => {
                    self.close(CLOSE_POLICY_VIOLATION, "Must select a role first");
                    return Err(Error::Protocol("chunk before role selection".into()));
                }
                Err(err) => {
                    self.close(CLOSE_POLICY_VIOLATION, "Invalid role selection");
                    return Err(err);
                }
            };

            match self
                .registry
                .try_assign(channel, requested, self.handle.clone())
            {
                Ok(Assignment::Sender) => {
                    info!(session = self.id, channel = %channel, "client joined as sender");
                    return Ok(Role::Sender);
                }
                Ok(Assignment::Receiver { sender }) => {
                    self.handle.send(Response::ready().to_frame())?;
                    // Best-effort: the sender may already be gone; it
                    // will notice on its next forward attempt.
                    if sender.send(Response::ready().to_frame()).is_err() {
                        debug!(
                            session = self.id,
                            channel = %channel,
                            "sender gone before ready notification"
                        );
                    }
                    info!(session = self.id, channel = %channel, "client joined as receiver");
                    return Ok(Role::Receiver);
                }
                Err(Error::RoleConflict(message)) => {
                    debug!(session = self.id, channel = %channel, %message, "role rejected");
                    self.handle.send(Response::error(&message).to_frame())?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Forward loop: serial per session, so per-pairing order is
    /// preserved. No timeout here; closing the connection is the sole
    /// cancellation mechanism once forwarding starts.
    async fn forward<R>(&self, reader: &mut R, channel: &str, role: Role) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let frame = read_frame(reader).await?;
            self.metrics.incr_messages_relayed();

            let bytes = match frame {
                Frame::Text(bytes) => bytes,
                Frame::Binary(_) => {
                    self.close(CLOSE_POLICY_VIOLATION, "Invalid message type");
                    return Err(Error::Protocol("binary frame in forward loop".into()));
                }
                Frame::Close { .. } => return Ok(()),
            };

            match role {
                Role::Sender => {
                    self.metrics.incr_chunks_received();
                    let Some(receiver) = self.registry.receiver_of(channel) else {
                        info!(
                            session = self.id,
                            channel = %channel,
                            "no receivers connected, disconnecting sender"
                        );
                        self.close(CLOSE_NORMAL, "No receivers connected");
                        return Err(Error::PeerUnavailable("no receivers connected".into()));
                    };
                    if receiver.send(Frame::Text(bytes)).is_err() {
                        self.close(CLOSE_NORMAL, "No receivers connected");
                        return Err(Error::PeerUnavailable("receiver queue closed".into()));
                    }
                    self.metrics.incr_chunks_forwarded();
                }
                Role::Receiver => {
                    // Receivers do not forward data back to the sender;
                    // inbound text is drained so disconnects are noticed.
                    debug!(session = self.id, "ignoring text frame from receiver");
                }
            }
        }
    }

    /// Queue a close frame; delivery is best-effort.
    fn close(&self, code: u16, reason: &str) {
        if self.handle.send(Frame::close(code, reason)).is_err() {
            debug!(session = self.id, "writer already gone during close");
        }
    }
}
