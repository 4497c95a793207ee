//! Relay server: accept loop plus metrics listener.
//!
//! One task per accepted connection; the accept loop never blocks on a
//! session. The metrics exposition is served on its own listener so
//! operational reads never compete with relay traffic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::error::Result;
use crate::relay::metrics::RelayMetrics;
use crate::relay::registry::ChannelRegistry;
use crate::relay::session;

/// How long a connection may sit in join or role selection before the
/// relay closes it.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RelayServer {
    registry: Arc<ChannelRegistry>,
    metrics: Arc<RelayMetrics>,
    handshake_timeout: Duration,
    next_session_id: AtomicU64,
}

impl RelayServer {
    pub fn new(handshake_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            registry: Arc::new(ChannelRegistry::new()),
            metrics: Arc::new(RelayMetrics::new()),
            handshake_timeout,
            next_session_id: AtomicU64::new(1),
        })
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    /// Accept loop. Runs until the listener fails.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!(addr = %listener.local_addr()?, "relay listening");
        loop {
            let (stream, peer_addr) = listener.accept().await?;
            let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
            debug!(session = id, peer = %peer_addr, "connection accepted");
            tokio::spawn(session::run(
                stream,
                id,
                Arc::clone(&self.registry),
                Arc::clone(&self.metrics),
                self.handshake_timeout,
            ));
        }
    }

    /// Serve the metrics exposition. Runs until the listener fails.
    pub async fn serve_metrics(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!(addr = %listener.local_addr()?, "metrics listening");
        loop {
            let (stream, _) = listener.accept().await?;
            let metrics = Arc::clone(&self.metrics);
            tokio::spawn(async move {
                if let Err(err) = respond_metrics(stream, &metrics).await {
                    debug!(%err, "metrics request failed");
                }
            });
        }
    }
}

async fn respond_metrics(mut stream: TcpStream, metrics: &RelayMetrics) -> std::io::Result<()> {
    // Drain the request head; the exposition is the same for any path.
    let mut buf = [0u8; 1024];
    let _ = stream.read(&mut buf).await?;

    let body = metrics.render();
    let response = format!(
        "HTTP/1.0 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}
