//! Transport layer for host connections
//!
//! Supports:
//! - SSH-2 shell sessions with a pseudo-terminal
//! - Telnet (RFC 854) byte streams
//! - An in-process virtual host for exercising sessions without sockets

mod ssh;
mod telnet;
mod virtual_host;

pub use ssh::{SshAuth, SshConfig, SshTransport};
pub use telnet::{TelnetConfig, TelnetTransport};
pub use virtual_host::{ConnectFailure, ResponseRule, VirtualHost, VirtualTransport};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Transport configuration, chosen once at configuration time
#[derive(Debug, Clone)]
pub enum Transport {
    /// SSH shell with a pseudo-terminal
    Ssh(SshConfig),
    /// Telnet byte stream
    Telnet(TelnetConfig),
}

impl Transport {
    /// Which mechanism this configuration selects
    pub fn transport_type(&self) -> TransportType {
        match self {
            Self::Ssh(_) => TransportType::Ssh,
            Self::Telnet(_) => TransportType::Telnet,
        }
    }
}

/// Transport type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// SSH
    Ssh,
    /// Telnet
    Telnet,
    /// In-process virtual host
    Virtual,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ssh => write!(f, "SSH"),
            Self::Telnet => write!(f, "Telnet"),
            Self::Virtual => write!(f, "Virtual"),
        }
    }
}

impl FromStr for TransportType {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ssh" => Ok(Self::Ssh),
            "telnet" => Ok(Self::Telnet),
            other => Err(TransportError::ConfigError(format!(
                "unknown transport method: {other}"
            ))),
        }
    }
}

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Host could not be reached
    #[error("Host unreachable: {0}")]
    Unreachable(String),

    /// Credentials were rejected by the host
    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    /// Connection timeout
    #[error("Connection timeout after {0} seconds")]
    Timeout(u64),

    /// Connection negotiation failed after the socket was open
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Operation requires an open transport
    #[error("Not connected")]
    NotConnected,

    /// Remote side closed the stream
    #[error("Disconnected")]
    Disconnected,

    /// Send error
    #[error("Send error: {0}")]
    SendError(String),
}

impl TransportError {
    /// Classify a socket-level connect failure
    pub(crate) fn from_connect(err: &std::io::Error, timeout_secs: u64) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                Self::Timeout(timeout_secs)
            }
            _ => Self::Unreachable(err.to_string()),
        }
    }
}

/// Transport statistics
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    /// Bytes sent
    pub bytes_sent: u64,
    /// Bytes received
    pub bytes_received: u64,
    /// Writes performed
    pub packets_sent: u64,
    /// Non-empty reads performed
    pub packets_received: u64,
    /// Connection uptime in seconds
    pub uptime_secs: u64,
}

/// Duplex byte channel to a remote host
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransportTrait: Send + Sync {
    /// Open the channel. Fails with a distinct error for unreachable hosts,
    /// rejected credentials and connect timeouts.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Close the channel. Closing a closed or never-opened transport is a no-op.
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Write all of `data` and flush
    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Non-blocking read of at most `max_len` bytes; empty when nothing is
    /// available right now
    async fn receive(&mut self, max_len: usize) -> Result<Bytes, TransportError>;

    /// Delay before the first read, while the host paints its opening screen
    fn opening_delay(&self) -> Duration {
        Duration::ZERO
    }

    /// Get transport type
    fn transport_type(&self) -> TransportType;

    /// Get connection info string
    fn connection_info(&self) -> String;

    /// Get statistics
    fn stats(&self) -> TransportStats;
}

/// Create a transport instance from configuration
pub fn create_transport(config: Transport) -> Box<dyn TransportTrait> {
    match config {
        Transport::Ssh(cfg) => Box::new(SshTransport::new(cfg)),
        Transport::Telnet(cfg) => Box::new(TelnetTransport::new(cfg)),
    }
}
