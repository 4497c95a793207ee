//! Receiver-side transfer consumer.
//!
//! Consumes chunk envelopes in arrival order, validates the sequence,
//! appends payloads to the sink, and reports completion. A partially
//! written sink is never reported complete; callers decide whether to
//! keep or discard partial output.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::client::RelayConnection;
use crate::error::{Error, Result};
use crate::protocol::{Chunk, ChunkEnvelope, Frame};

/// Progress of one inbound transfer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferState {
    /// Chunks accepted so far; also the next expected chunk number.
    pub chunks_received: u64,
    /// Total announced by the first chunk; `None` before it arrives.
    pub expected_total: Option<u64>,
    pub completed: bool,
}

pub struct TransferReceiver<W> {
    sink: W,
    state: TransferState,
}

impl<W> TransferReceiver<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            state: TransferState::default(),
        }
    }

    pub fn state(&self) -> &TransferState {
        &self.state
    }

    pub fn into_sink(self) -> W {
        self.sink
    }

    /// Accept one chunk. Returns true once the transfer is complete.
    ///
    /// Chunks must arrive in order starting at zero; a gap, duplicate,
    /// or replay after completion is a sequencing violation, and a
    /// `total_chunks` that disagrees with the first chunk's is reported
    /// as inconsistent. The sink is flushed on completion.
    pub async fn accept(&mut self, chunk: Chunk) -> Result<bool> {
        if self.state.completed {
            return Err(Error::SequenceViolation {
                expected: self.state.chunks_received,
                got: chunk.chunk_number,
            });
        }

        if chunk.total_chunks == 0 {
            return Err(Error::MalformedEnvelope(
                "total_chunks must be at least 1".into(),
            ));
        }

        match self.state.expected_total {
            None => self.state.expected_total = Some(chunk.total_chunks),
            Some(first) if first != chunk.total_chunks => {
                return Err(Error::InconsistentTotal {
                    first,
                    got: chunk.total_chunks,
                });
            }
            Some(_) => {}
        }

        if chunk.chunk_number != self.state.chunks_received {
            return Err(Error::SequenceViolation {
                expected: self.state.chunks_received,
                got: chunk.chunk_number,
            });
        }

        self.sink.write_all(&chunk.data).await?;
        self.state.chunks_received += 1;

        if Some(self.state.chunks_received) == self.state.expected_total {
            self.sink.flush().await?;
            self.state.completed = true;
        }
        Ok(self.state.completed)
    }

    /// Consume frames from the relay until the transfer completes.
    ///
    /// `on_progress` is invoked once per accepted chunk with
    /// `(chunks_received, expected_total)`.
    pub async fn run<S, F>(&mut self, conn: &mut RelayConnection<S>, mut on_progress: F) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        F: FnMut(u64, u64),
    {
        loop {
            match conn.recv().await? {
                Frame::Text(bytes) => {
                    let chunk = ChunkEnvelope::from_json(&bytes)?.decode()?;
                    let done = self.accept(chunk).await?;
                    on_progress(
                        self.state.chunks_received,
                        self.state.expected_total.unwrap_or(0),
                    );
                    if done {
                        return Ok(());
                    }
                }
                Frame::Close { code, reason } => {
                    return Err(Error::PeerUnavailable(format!(
                        "relay closed connection ({code}): {reason}"
                    )));
                }
                Frame::Binary(_) => {
                    return Err(Error::Protocol("unexpected binary frame from relay".into()));
                }
            }
        }
    }
}
