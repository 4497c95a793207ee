//! Chunk envelope codec.
//!
//! A transfer payload travels as JSON envelopes carrying sequencing
//! metadata and a base64-encoded slice of the source:
//!
//! ```text
//! {"metadata":{"chunk_number":N,"chunk_size":S,"total_chunks":T},"data":"<base64>"}
//! ```
//!
//! `total_chunks` is the count of chunks in the transfer; chunks are
//! numbered `0 .. total_chunks-1`. `chunk_size` must equal the decoded
//! payload length; a mismatch is a malformed envelope. Round-trip is
//! byte-exact, including a zero-length final chunk.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::frame::Frame;
use crate::protocol::message::to_text_frame;

/// Sequencing metadata carried by every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub chunk_number: u64,
    pub chunk_size: u64,
    pub total_chunks: u64,
}

/// Wire shape of a chunk message. `data` stays base64 until decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEnvelope {
    pub metadata: ChunkMetadata,
    pub data: String,
}

impl ChunkEnvelope {
    /// Parse an envelope out of a Text frame body.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::MalformedEnvelope(format!("invalid chunk envelope: {e}")))
    }

    /// Decode the payload and validate it against the metadata.
    pub fn decode(&self) -> Result<Chunk> {
        let raw = BASE64
            .decode(&self.data)
            .map_err(|e| Error::MalformedEnvelope(format!("invalid base64 payload: {e}")))?;

        if raw.len() as u64 != self.metadata.chunk_size {
            return Err(Error::MalformedEnvelope(format!(
                "chunk_size {} does not match payload length {}",
                self.metadata.chunk_size,
                raw.len()
            )));
        }

        Ok(Chunk {
            chunk_number: self.metadata.chunk_number,
            total_chunks: self.metadata.total_chunks,
            data: Bytes::from(raw),
        })
    }
}

/// A decoded chunk: sequencing metadata plus raw payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_number: u64,
    pub total_chunks: u64,
    pub data: Bytes,
}

impl Chunk {
    pub fn encode(&self) -> ChunkEnvelope {
        ChunkEnvelope {
            metadata: ChunkMetadata {
                chunk_number: self.chunk_number,
                chunk_size: self.data.len() as u64,
                total_chunks: self.total_chunks,
            },
            data: BASE64.encode(&self.data),
        }
    }

    pub fn to_frame(&self) -> Frame {
        to_text_frame(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chunk(number: u64, total: u64, data: &[u8]) -> Chunk {
        Chunk {
            chunk_number: number,
            total_chunks: total,
            data: Bytes::copy_from_slice(data),
        }
    }

    #[test]
    fn test_roundtrip() {
        let c = chunk(2, 3, b"hello world");
        let decoded = c.encode().decode().unwrap();
        assert_eq!(decoded, c);
    }

    #[test]
    fn test_roundtrip_zero_length_final_chunk() {
        let c = chunk(0, 1, b"");
        let decoded = c.encode().decode().unwrap();
        assert_eq!(decoded, c);
        assert_eq!(decoded.data.len(), 0);
    }

    #[test]
    fn test_chunk_size_mismatch_rejected() {
        let mut envelope = chunk(0, 1, b"abc").encode();
        envelope.metadata.chunk_size = 99;
        let err = envelope.decode().unwrap_err();
        assert!(matches!(err, Error::MalformedEnvelope(_)));
    }

    #[test]
    fn test_bad_base64_rejected() {
        let mut envelope = chunk(0, 1, b"abc").encode();
        envelope.data = "!!! not base64 !!!".to_string();
        let err = envelope.decode().unwrap_err();
        assert!(matches!(err, Error::MalformedEnvelope(_)));
    }

    #[test]
    fn test_missing_metadata_field_rejected() {
        let err = ChunkEnvelope::from_json(
            br#"{"metadata":{"chunk_number":0,"chunk_size":3},"data":"YWJj"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MalformedEnvelope(_)));
    }

    #[test]
    fn test_non_numeric_metadata_rejected() {
        let err = ChunkEnvelope::from_json(
            br#"{"metadata":{"chunk_number":"zero","chunk_size":3,"total_chunks":1},"data":"YWJj"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MalformedEnvelope(_)));
    }

    #[test]
    fn test_frame_carries_wire_shape() {
        let frame = chunk(1, 4, b"xyz").to_frame();
        let Frame::Text(body) = frame else {
            panic!("expected text frame");
        };
        let envelope = ChunkEnvelope::from_json(&body).unwrap();
        assert_eq!(envelope.metadata.chunk_number, 1);
        assert_eq!(envelope.metadata.chunk_size, 3);
        assert_eq!(envelope.metadata.total_chunks, 4);
    }

    proptest! {
        #[test]
        fn prop_roundtrip_is_byte_exact(
            number in 0u64..10_000,
            total in 1u64..10_000,
            data in proptest::collection::vec(any::<u8>(), 0..4096),
        ) {
            let c = chunk(number, total, &data);
            let decoded = c.encode().decode().unwrap();
            prop_assert_eq!(decoded, c);
        }
    }
}
