//! Configuration: built-in defaults, an optional TOML file, and CLI
//! flags layered on top (flags win).

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::transfer::DEFAULT_CHUNK_SIZE;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub relay: RelaySection,
    pub transfer: TransferSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelaySection {
    /// Main listener for client connections.
    pub listen: String,
    /// Metrics exposition listener.
    pub metrics_listen: String,
    /// Seconds a connection may spend in join/role selection.
    pub handshake_timeout_secs: u64,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            metrics_listen: "0.0.0.0:9090".to_string(),
            handshake_timeout_secs: 30,
        }
    }
}

impl RelaySection {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransferSection {
    /// Relay address clients connect to.
    pub relay_addr: String,
    /// Chunk size in bytes.
    pub chunk_size: usize,
}

impl Default for TransferSection {
    fn default() -> Self {
        Self {
            relay_addr: "127.0.0.1:8080".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Config {
    /// Load from a TOML file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                toml::from_str(&text)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.relay.listen, "0.0.0.0:8080");
        assert_eq!(config.relay.metrics_listen, "0.0.0.0:9090");
        assert_eq!(config.relay.handshake_timeout_secs, 30);
        assert_eq!(config.transfer.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[relay]\nlisten = \"127.0.0.1:9999\"").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.relay.listen, "127.0.0.1:9999");
        assert_eq!(config.relay.metrics_listen, "0.0.0.0:9090");
        assert_eq!(config.transfer.relay_addr, "127.0.0.1:8080");
    }

    #[test]
    fn test_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[relay]\n\
             listen = \"0.0.0.0:7000\"\n\
             metrics_listen = \"0.0.0.0:7001\"\n\
             handshake_timeout_secs = 5\n\
             \n\
             [transfer]\n\
             relay_addr = \"relay.example:7000\"\n\
             chunk_size = 65536"
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.relay.handshake_timeout(), Duration::from_secs(5));
        assert_eq!(config.transfer.relay_addr, "relay.example:7000");
        assert_eq!(config.transfer.chunk_size, 65536);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[relay]\nlisten_addr = \"oops\"").unwrap();
        assert!(Config::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = Config::load(Some(Path::new("/nonexistent/borehole.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
