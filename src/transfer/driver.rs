//! Sender-side transfer driver.
//!
//! Reads the source in fixed-size slices, wraps each slice in a chunk
//! envelope, and pushes it through the relay connection. One chunk is
//! in flight at a time; the next slice is not read until the current
//! envelope has been handed to the transport, which bounds memory to a
//! single chunk and leaves flow control to transport backpressure.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::client::RelayConnection;
use crate::error::Result;
use crate::protocol::{Chunk, MAX_FRAME_SIZE};

/// Default chunk size (4MB).
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Largest usable chunk size. Base64 expands the payload 4/3 and the
/// JSON envelope adds metadata on top, so chunks near the frame size
/// cap would produce frames the peer's decoder rejects.
pub const MAX_CHUNK_SIZE: usize = (MAX_FRAME_SIZE as usize / 4) * 3 - 1024;

pub struct TransferDriver {
    chunk_size: usize,
}

impl TransferDriver {
    /// `chunk_size` of zero is clamped to one byte.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Number of chunks a source of `source_len` bytes produces.
    ///
    /// An empty source still produces one zero-length chunk, so the
    /// receiver observes a total and can complete.
    pub fn total_chunks(&self, source_len: u64) -> u64 {
        if source_len == 0 {
            1
        } else {
            source_len.div_ceil(self.chunk_size as u64)
        }
    }

    /// Stream `source` through the relay connection.
    ///
    /// `on_progress` is invoked once per chunk with
    /// `(chunks_sent, total_chunks)`. Returns the chunk count.
    pub async fn run<R, S, F>(
        &self,
        mut source: R,
        source_len: u64,
        conn: &mut RelayConnection<S>,
        mut on_progress: F,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin,
        S: AsyncRead + AsyncWrite + Unpin,
        F: FnMut(u64, u64),
    {
        let total = self.total_chunks(source_len);
        let mut buf = vec![0u8; self.chunk_size];
        let mut sent_bytes = 0u64;

        for number in 0..total {
            let want = (source_len - sent_bytes).min(self.chunk_size as u64) as usize;
            source.read_exact(&mut buf[..want]).await?;
            sent_bytes += want as u64;

            let chunk = Chunk {
                chunk_number: number,
                total_chunks: total,
                data: Bytes::copy_from_slice(&buf[..want]),
            };
            conn.send(&chunk.to_frame()).await?;
            on_progress(number + 1, total);
        }

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ChunkEnvelope, Frame};

    #[test]
    fn test_total_chunks_even_split() {
        let driver = TransferDriver::new(4 * 1024 * 1024);
        assert_eq!(driver.total_chunks(12 * 1024 * 1024), 3);
    }

    #[test]
    fn test_total_chunks_one_byte_over() {
        let driver = TransferDriver::new(4 * 1024 * 1024);
        assert_eq!(driver.total_chunks(4 * 1024 * 1024 + 1), 2);
    }

    #[test]
    fn test_total_chunks_empty_source() {
        let driver = TransferDriver::new(4 * 1024 * 1024);
        assert_eq!(driver.total_chunks(0), 1);
    }

    #[test]
    fn test_max_chunk_size_envelope_fits_frame_cap() {
        let chunk = Chunk {
            chunk_number: u64::MAX,
            total_chunks: u64::MAX,
            data: bytes::Bytes::from(vec![0xffu8; MAX_CHUNK_SIZE]),
        };
        assert!(chunk.to_frame().payload_len() <= MAX_FRAME_SIZE as usize);
    }

    async fn collect_chunks(data: Vec<u8>, chunk_size: usize) -> (u64, Vec<Chunk>, Vec<(u64, u64)>) {
        let driver = TransferDriver::new(chunk_size);
        let expected = driver.total_chunks(data.len() as u64);
        let (client, server) = tokio::io::duplex(64 * 1024);
        let mut conn = RelayConnection::new(client);

        let reader = tokio::spawn(async move {
            let mut conn = RelayConnection::new(server);
            let mut chunks = Vec::new();
            for _ in 0..expected {
                let Frame::Text(bytes) = conn.recv().await.unwrap() else {
                    panic!("expected text frame");
                };
                chunks.push(ChunkEnvelope::from_json(&bytes).unwrap().decode().unwrap());
            }
            chunks
        });

        let mut progress = Vec::new();
        let total = driver
            .run(&data[..], data.len() as u64, &mut conn, |sent, total| {
                progress.push((sent, total))
            })
            .await
            .unwrap();
        (total, reader.await.unwrap(), progress)
    }

    #[tokio::test]
    async fn test_chunks_are_sequential_and_sized() {
        let data: Vec<u8> = (0..1000u32).flat_map(|n| n.to_be_bytes()).collect();
        let (total, chunks, progress) = collect_chunks(data.clone(), 1024).await;

        assert_eq!(total, 4);
        assert_eq!(chunks.len(), 4);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_number, i as u64);
            assert_eq!(chunk.total_chunks, 4);
        }
        assert_eq!(chunks[0].data.len(), 1024);
        assert_eq!(chunks[3].data.len(), 4000 - 3 * 1024);

        let reassembled: Vec<u8> = chunks.iter().flat_map(|c| c.data.to_vec()).collect();
        assert_eq!(reassembled, data);
        assert_eq!(progress, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
    }

    #[tokio::test]
    async fn test_one_byte_over_chunk_boundary() {
        let data = vec![0x5a; 1025];
        let (total, chunks, _) = collect_chunks(data, 1024).await;

        assert_eq!(total, 2);
        assert_eq!(chunks[0].data.len(), 1024);
        assert_eq!(chunks[1].data.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_source_sends_single_empty_chunk() {
        let (total, chunks, progress) = collect_chunks(Vec::new(), 1024).await;

        assert_eq!(total, 1);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_number, 0);
        assert_eq!(chunks[0].total_chunks, 1);
        assert!(chunks[0].data.is_empty());
        assert_eq!(progress, vec![(1, 1)]);
    }
}
