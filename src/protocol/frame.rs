//! Message framing over TCP.
//!
//! The relay protocol is entirely message-framed; no sub-framing is
//! required above this layer. Wire format: all multi-byte integers are
//! big-endian.
//!
//! ```text
//! len:u32 | kind:u8 | payload (len bytes)
//! ```
//!
//! Text frames carry whole JSON objects. Close frames carry a close
//! code and a UTF-8 reason:
//!
//! ```text
//! code:u16 | reason (UTF-8, remainder of payload)
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Maximum frame size (64MB) - prevents OOM from malicious/corrupted frames
pub const MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Clean shutdown: sender ran out of receivers, or a peer is done.
pub const CLOSE_NORMAL: u16 = 1000;

/// Protocol violation: wrong frame kind, malformed handshake message,
/// invalid role value, stalled handshake.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Text = 0x01,
    Binary = 0x02,
    Close = 0x08,
}

impl FrameKind {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::Text),
            0x02 => Some(Self::Binary),
            0x08 => Some(Self::Close),
            _ => None,
        }
    }
}

/// One wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A whole JSON object (control message or chunk envelope).
    Text(Bytes),
    /// Opaque binary payload. The relay protocol never sends these;
    /// receiving one during the handshake is a protocol violation.
    Binary(Bytes),
    /// Connection close with a code and human-readable reason.
    Close { code: u16, reason: String },
}

impl Frame {
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::Text(payload.into())
    }

    pub fn close(code: u16, reason: impl Into<String>) -> Self {
        Self::Close {
            code,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Text(_) => FrameKind::Text,
            Self::Binary(_) => FrameKind::Binary,
            Self::Close { .. } => FrameKind::Close,
        }
    }

    /// Payload length as it would appear on the wire.
    pub fn payload_len(&self) -> usize {
        match self {
            Self::Text(payload) | Self::Binary(payload) => payload.len(),
            Self::Close { reason, .. } => 2 + reason.len(),
        }
    }

    pub fn encode(&self) -> Bytes {
        match self {
            Self::Text(payload) | Self::Binary(payload) => {
                let mut buf = BytesMut::with_capacity(5 + payload.len());
                buf.put_u32(payload.len() as u32);
                buf.put_u8(self.kind() as u8);
                buf.put_slice(payload);
                buf.freeze()
            }
            Self::Close { code, reason } => {
                let reason_bytes = reason.as_bytes();
                let mut buf = BytesMut::with_capacity(5 + 2 + reason_bytes.len());
                buf.put_u32(2 + reason_bytes.len() as u32);
                buf.put_u8(FrameKind::Close as u8);
                buf.put_u16(*code);
                buf.put_slice(reason_bytes);
                buf.freeze()
            }
        }
    }

    fn decode(kind: FrameKind, mut payload: Bytes) -> Result<Self> {
        match kind {
            FrameKind::Text => Ok(Self::Text(payload)),
            FrameKind::Binary => Ok(Self::Binary(payload)),
            FrameKind::Close => {
                if payload.remaining() < 2 {
                    return Err(Error::Protocol("close frame payload too short".into()));
                }
                let code = payload.get_u16();
                let reason = String::from_utf8(payload.to_vec())
                    .map_err(|_| Error::Protocol("invalid UTF-8 in close reason".into()))?;
                Ok(Self::Close { code, reason })
            }
        }
    }
}

/// Read a single frame from the stream.
pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> Result<Frame> {
    let len = r.read_u32().await?;

    // Validate frame size before allocation
    if len > MAX_FRAME_SIZE {
        return Err(Error::Protocol(format!(
            "frame size {} exceeds maximum allowed size {}",
            len, MAX_FRAME_SIZE
        )));
    }

    let kind = r.read_u8().await?;
    let kind = FrameKind::from_u8(kind)
        .ok_or_else(|| Error::Protocol(format!("unknown frame kind 0x{kind:02x}")))?;

    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload).await?;

    Frame::decode(kind, Bytes::from(payload))
}

/// Write a frame to the stream and flush it.
///
/// The size cap is enforced on both sides: a frame too large for the
/// peer's `read_frame` is rejected here before any bytes hit the wire,
/// instead of corrupting the stream or failing mid-transfer on the
/// remote end. This also keeps the `len` field from ever wrapping u32.
pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, frame: &Frame) -> Result<()> {
    let payload_len = frame.payload_len();
    if payload_len > MAX_FRAME_SIZE as usize {
        return Err(Error::Protocol(format!(
            "frame size {} exceeds maximum allowed size {}",
            payload_len, MAX_FRAME_SIZE
        )));
    }
    w.write_all(&frame.encode()).await?;
    w.flush().await?;
    Ok(())
}
