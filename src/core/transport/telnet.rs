//! Telnet transport implementation
//!
//! Implements the Telnet protocol (RFC 854) with option negotiation. Commands
//! are stripped from the inbound stream so the session only sees screen text.

use super::{TransportError, TransportStats, TransportTrait, TransportType};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

// Telnet protocol constants
const IAC: u8 = 255; // Interpret As Command
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250; // Subnegotiation Begin
const SE: u8 = 240; // Subnegotiation End

const OPT_ECHO: u8 = 1;
const OPT_SUPPRESS_GO_AHEAD: u8 = 3;
const OPT_TERMINAL_TYPE: u8 = 24;
const OPT_NAWS: u8 = 31; // Negotiate About Window Size

/// Telnet connection configuration
#[derive(Debug, Clone)]
pub struct TelnetConfig {
    /// Host address
    pub host: String,
    /// Port number (default: 23)
    pub port: u16,
    /// Terminal type to announce
    pub terminal_type: String,
    /// Connection timeout in seconds
    pub timeout_secs: u64,
    /// Pause after the socket opens before the first read
    pub opening_delay: Duration,
    /// Screen width reported through NAWS
    pub columns: u16,
    /// Screen height reported through NAWS
    pub rows: u16,
}

impl TelnetConfig {
    /// Create a new Telnet configuration
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            port: 23,
            terminal_type: "vt320".to_string(),
            timeout_secs: 30,
            opening_delay: Duration::from_millis(1000),
            columns: 80,
            rows: 24,
        }
    }

    /// Set port
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set terminal type
    #[must_use]
    pub fn terminal_type(mut self, term_type: &str) -> Self {
        self.terminal_type = term_type.to_string();
        self
    }

    /// Set connect timeout
    #[must_use]
    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set the pause before the first read
    #[must_use]
    pub fn opening_delay(mut self, delay: Duration) -> Self {
        self.opening_delay = delay;
        self
    }

    /// Set the window size reported to the host
    #[must_use]
    pub fn window_size(mut self, columns: u16, rows: u16) -> Self {
        self.columns = columns;
        self.rows = rows;
        self
    }
}

impl Default for TelnetConfig {
    fn default() -> Self {
        Self::new("localhost")
    }
}

/// Telnet transport
pub struct TelnetTransport {
    config: TelnetConfig,
    stream: Option<TcpStream>,
    stats: Arc<RwLock<TransportStats>>,
    connected_at: Option<Instant>,
    /// Buffer for incomplete Telnet sequences
    pending_data: BytesMut,
}

impl TelnetTransport {
    /// Create a new Telnet transport
    pub fn new(config: TelnetConfig) -> Self {
        Self {
            config,
            stream: None,
            stats: Arc::new(RwLock::new(TransportStats::default())),
            connected_at: None,
            pending_data: BytesMut::new(),
        }
    }

    /// Reply to an option request
    fn option_reply(command: u8, option: u8, config: &TelnetConfig) -> Option<Vec<u8>> {
        let mut response = match command {
            DO => match option {
                OPT_TERMINAL_TYPE | OPT_NAWS | OPT_SUPPRESS_GO_AHEAD => vec![IAC, WILL, option],
                _ => vec![IAC, WONT, option],
            },
            WILL => match option {
                OPT_ECHO | OPT_SUPPRESS_GO_AHEAD => vec![IAC, DO, option],
                _ => vec![IAC, DONT, option],
            },
            _ => return None,
        };

        if command == DO && option == OPT_TERMINAL_TYPE {
            response.extend_from_slice(&[IAC, SB, OPT_TERMINAL_TYPE, 0]); // 0 = IS
            response.extend_from_slice(config.terminal_type.as_bytes());
            response.extend_from_slice(&[IAC, SE]);
        }

        if command == DO && option == OPT_NAWS {
            response.extend_from_slice(&[IAC, SB, OPT_NAWS]);
            for byte in config
                .columns
                .to_be_bytes()
                .into_iter()
                .chain(config.rows.to_be_bytes())
            {
                // 255 inside a subnegotiation must be doubled
                if byte == IAC {
                    response.push(IAC);
                }
                response.push(byte);
            }
            response.extend_from_slice(&[IAC, SE]);
        }

        Some(response)
    }

    /// Strip Telnet commands from `raw_data`.
    ///
    /// Returns the screen bytes and the negotiation replies owed to the host.
    /// Incomplete trailing commands are kept in `pending` for the next read.
    fn process_incoming(
        raw_data: &[u8],
        pending: &mut BytesMut,
        config: &TelnetConfig,
    ) -> (Bytes, Vec<u8>) {
        let mut output = BytesMut::with_capacity(raw_data.len());
        let mut replies = Vec::new();
        let mut i = 0;

        while i < raw_data.len() {
            if raw_data[i] != IAC {
                output.extend_from_slice(&[raw_data[i]]);
                i += 1;
                continue;
            }

            if i + 1 >= raw_data.len() {
                pending.extend_from_slice(&raw_data[i..]);
                break;
            }

            match raw_data[i + 1] {
                IAC => {
                    // Escaped IAC (255 255 -> 255)
                    output.extend_from_slice(&[IAC]);
                    i += 2;
                }
                DO | DONT | WILL | WONT => {
                    if i + 2 >= raw_data.len() {
                        pending.extend_from_slice(&raw_data[i..]);
                        break;
                    }
                    if let Some(reply) =
                        Self::option_reply(raw_data[i + 1], raw_data[i + 2], config)
                    {
                        replies.extend_from_slice(&reply);
                    }
                    i += 3;
                }
                SB => {
                    let end = raw_data[i + 2..]
                        .windows(2)
                        .position(|w| w == [IAC, SE])
                        .map(|p| i + 2 + p);
                    match end {
                        Some(j) => i = j + 2,
                        None => {
                            pending.extend_from_slice(&raw_data[i..]);
                            break;
                        }
                    }
                }
                _ => {
                    // Other two-byte commands (NOP, GA, ...)
                    i += 2;
                }
            }
        }

        (output.freeze(), replies)
    }
}

#[async_trait]
impl TransportTrait for TelnetTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.is_connected() {
            return Ok(());
        }

        let addr = format!("{}:{}", self.config.host, self.config.port);
        let timeout_secs = self.config.timeout_secs;

        let stream = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            TcpStream::connect(&addr),
        )
        .await
        .map_err(|_| TransportError::Timeout(timeout_secs))?
        .map_err(|e| TransportError::from_connect(&e, timeout_secs))?;

        stream.set_nodelay(true).map_err(TransportError::IoError)?;

        self.stream = Some(stream);
        self.connected_at = Some(Instant::now());
        self.pending_data.clear();
        *self.stats.write() = TransportStats::default();

        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await.ok();
        }
        self.connected_at = None;
        self.pending_data.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

        // Escape any IAC bytes in the data
        let mut escaped = Vec::with_capacity(data.len());
        for &byte in data {
            if byte == IAC {
                escaped.push(IAC);
            }
            escaped.push(byte);
        }

        stream
            .write_all(&escaped)
            .await
            .map_err(TransportError::IoError)?;
        stream.flush().await.map_err(TransportError::IoError)?;

        let mut stats = self.stats.write();
        stats.bytes_sent += data.len() as u64;
        stats.packets_sent += 1;

        Ok(data.len())
    }

    async fn receive(&mut self, max_len: usize) -> Result<Bytes, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

        let mut buffer = vec![0u8; max_len.min(4096)];

        let n = match stream.try_read(&mut buffer) {
            Ok(0) => return Err(TransportError::Disconnected),
            Ok(n) => n,
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(Bytes::new()),
            Err(e) => return Err(TransportError::IoError(e)),
        };
        buffer.truncate(n);

        // Prepend any pending partial command
        if !self.pending_data.is_empty() {
            let mut combined = self.pending_data.split();
            combined.extend_from_slice(&buffer);
            buffer = combined.to_vec();
        }

        let (processed, replies) =
            Self::process_incoming(&buffer, &mut self.pending_data, &self.config);

        if !replies.is_empty() {
            stream
                .write_all(&replies)
                .await
                .map_err(TransportError::IoError)?;
        }

        if !processed.is_empty() {
            let mut stats = self.stats.write();
            stats.bytes_received += processed.len() as u64;
            stats.packets_received += 1;
        }

        Ok(processed)
    }

    fn opening_delay(&self) -> Duration {
        self.config.opening_delay
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Telnet
    }

    fn connection_info(&self) -> String {
        format!("telnet://{}:{}", self.config.host, self.config.port)
    }

    fn stats(&self) -> TransportStats {
        let mut stats = self.stats.read().clone();
        if let Some(connected_at) = self.connected_at {
            stats.uptime_secs = connected_at.elapsed().as_secs();
        }
        stats
    }
}
