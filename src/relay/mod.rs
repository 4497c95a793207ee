//! Relay server side: channel registry, per-connection sessions,
//! counters, and the accept loops that tie them together.

pub mod metrics;
pub mod registry;
pub mod server;
pub mod session;

pub use metrics::RelayMetrics;
pub use registry::{Assignment, ChannelRegistry, PeerHandle};
pub use server::{RelayServer, DEFAULT_HANDSHAKE_TIMEOUT};
