//! Relay counters.
//!
//! Three monotonically increasing counters, exposed as a plain-text
//! exposition over the metrics listener. The metrics read path never
//! touches the relay's main listener or the channel registry.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Every message read by a forwarding session, either role.
    messages_relayed: AtomicU64,
    /// Chunk messages read from senders (server-observed).
    chunks_received: AtomicU64,
    /// Chunk messages successfully handed to a receiver.
    chunks_forwarded: AtomicU64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr_messages_relayed(&self) {
        self.messages_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_chunks_received(&self) {
        self.chunks_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_chunks_forwarded(&self) {
        self.chunks_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_relayed(&self) -> u64 {
        self.messages_relayed.load(Ordering::Relaxed)
    }

    pub fn chunks_received(&self) -> u64 {
        self.chunks_received.load(Ordering::Relaxed)
    }

    pub fn chunks_forwarded(&self) -> u64 {
        self.chunks_forwarded.load(Ordering::Relaxed)
    }

    /// Plain-text exposition, one `name value` line per counter.
    pub fn render(&self) -> String {
        format!(
            "total_messages_relayed {}\ntotal_chunks_received {}\ntotal_chunks_forwarded {}\n",
            self.messages_relayed(),
            self.chunks_received(),
            self.chunks_forwarded(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_monotonic() {
        let metrics = RelayMetrics::new();
        metrics.incr_messages_relayed();
        metrics.incr_messages_relayed();
        metrics.incr_chunks_received();
        assert_eq!(metrics.messages_relayed(), 2);
        assert_eq!(metrics.chunks_received(), 1);
        assert_eq!(metrics.chunks_forwarded(), 0);
    }

    #[test]
    fn test_render_format() {
        let metrics = RelayMetrics::new();
        metrics.incr_chunks_forwarded();
        let text = metrics.render();
        assert!(text.contains("total_messages_relayed 0"));
        assert!(text.contains("total_chunks_forwarded 1"));
    }
}
