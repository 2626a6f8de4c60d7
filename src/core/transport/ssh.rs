//! SSH transport implementation
//!
//! Opens an SSH-2 session, authenticates, allocates a pseudo-terminal sized to
//! the expected screen geometry and starts an interactive shell. The handshake
//! runs on the blocking pool under the connect timeout. Once the shell is up
//! the session is non-blocking and writes yield to the runtime on `WouldBlock`.

use super::{TransportError, TransportStats, TransportTrait, TransportType};
use crate::core::poll::Poller;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// libssh2 `LIBSSH2_ERROR_TIMEOUT`
const ERROR_TIMEOUT: i32 = -9;

/// Pause between write attempts while the channel window is full
const WRITE_RETRY: Duration = Duration::from_millis(10);

/// SSH authentication method
#[derive(Debug, Clone, Default)]
pub enum SshAuth {
    /// Password authentication
    Password(String),
    /// Public key authentication
    PublicKey {
        /// Path to private key file
        private_key: PathBuf,
        /// Optional passphrase for encrypted keys
        passphrase: Option<String>,
    },
    /// SSH agent authentication
    #[default]
    Agent,
}

/// SSH connection configuration
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Hostname or IP address
    pub host: String,
    /// Port (default: 22)
    pub port: u16,
    /// Username
    pub username: String,
    /// Authentication method
    pub auth: SshAuth,
    /// Connection timeout in seconds
    pub timeout_secs: u64,
    /// Terminal type for PTY
    pub term_type: String,
    /// Terminal width
    pub term_width: u32,
    /// Terminal height
    pub term_height: u32,
    /// Pause after the shell starts before the first read
    pub opening_delay: Duration,
}

impl SshConfig {
    /// Create a new SSH configuration with defaults
    pub fn new(host: &str, username: &str) -> Self {
        Self {
            host: host.to_string(),
            port: 22,
            username: username.to_string(),
            auth: SshAuth::Agent,
            timeout_secs: 30,
            term_type: "vt320".to_string(),
            term_width: 80,
            term_height: 24,
            opening_delay: Duration::from_millis(2000),
        }
    }

    /// Set port
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set password authentication
    #[must_use]
    pub fn password(mut self, password: &str) -> Self {
        self.auth = SshAuth::Password(password.to_string());
        self
    }

    /// Set public key authentication
    #[must_use]
    pub fn private_key(mut self, path: PathBuf, passphrase: Option<String>) -> Self {
        self.auth = SshAuth::PublicKey {
            private_key: path,
            passphrase,
        };
        self
    }

    /// Set connect timeout
    #[must_use]
    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set terminal size
    #[must_use]
    pub fn terminal_size(mut self, width: u32, height: u32) -> Self {
        self.term_width = width;
        self.term_height = height;
        self
    }

    /// Set terminal type announced for the PTY
    #[must_use]
    pub fn terminal_type(mut self, term_type: &str) -> Self {
        self.term_type = term_type.to_string();
        self
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self::new("localhost", "root")
    }
}

/// SSH transport using ssh2 crate (libssh2 bindings)
pub struct SshTransport {
    config: SshConfig,
    session: Option<ssh2::Session>,
    channel: Option<ssh2::Channel>,
    stats: Arc<RwLock<TransportStats>>,
    connected_at: Option<Instant>,
}

impl SshTransport {
    /// Create a new SSH transport
    pub fn new(config: SshConfig) -> Self {
        Self {
            config,
            session: None,
            channel: None,
            stats: Arc::new(RwLock::new(TransportStats::default())),
            connected_at: None,
        }
    }
}

fn resolve(config: &SshConfig) -> Result<Vec<SocketAddr>, TransportError> {
    let addrs: Vec<SocketAddr> = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|e| TransportError::Unreachable(format!("{}: {}", config.host, e)))?
        .collect();
    if addrs.is_empty() {
        return Err(TransportError::Unreachable(format!(
            "{}: no addresses",
            config.host
        )));
    }
    Ok(addrs)
}

fn open_tcp(config: &SshConfig) -> Result<TcpStream, TransportError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let mut last_err = None;
    for addr in resolve(config)? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(match last_err {
        Some(e) => TransportError::from_connect(&e, config.timeout_secs),
        None => TransportError::Unreachable(config.host.clone()),
    })
}

fn timed_out(err: &ssh2::Error) -> bool {
    matches!(err.code(), ssh2::ErrorCode::Session(ERROR_TIMEOUT))
}

/// Map a libssh2 failure, keeping timeouts distinct from other errors
fn classify(
    err: ssh2::Error,
    timeout_secs: u64,
    other: impl FnOnce(ssh2::Error) -> TransportError,
) -> TransportError {
    if timed_out(&err) {
        TransportError::Timeout(timeout_secs)
    } else {
        other(err)
    }
}

/// Write all of `data` to a non-blocking writer, sleeping on `WouldBlock`
async fn write_nonblocking<W: Write>(
    writer: &mut W,
    data: &[u8],
    timeout_secs: u64,
) -> Result<(), TransportError> {
    let poller = Poller::new(WRITE_RETRY, Duration::from_secs(timeout_secs));
    let mut written = 0;

    loop {
        let step = if written < data.len() {
            writer.write(&data[written..])
        } else {
            writer.flush().map(|()| 0)
        };
        match step {
            Ok(0) if written < data.len() => return Err(TransportError::Disconnected),
            Ok(0) => return Ok(()),
            Ok(n) => written += n,
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if poller.expired() {
                    return Err(TransportError::Timeout(timeout_secs));
                }
                poller.wait().await;
            }
            Err(e) => return Err(TransportError::IoError(e)),
        }
    }
}

/// Authenticate with the configured method
fn authenticate(config: &SshConfig, session: &ssh2::Session) -> Result<(), TransportError> {
    match &config.auth {
        SshAuth::Password(password) => {
            session
                .userauth_password(&config.username, password)
                .map_err(|e| {
                    classify(e, config.timeout_secs, |e| {
                        TransportError::AuthRejected(format!("password: {e}"))
                    })
                })?;
        }
        SshAuth::PublicKey {
            private_key,
            passphrase,
        } => {
            session
                .userauth_pubkey_file(&config.username, None, private_key, passphrase.as_deref())
                .map_err(|e| {
                    classify(e, config.timeout_secs, |e| {
                        TransportError::AuthRejected(format!("public key: {e}"))
                    })
                })?;
        }
        SshAuth::Agent => {
            let mut agent = session
                .agent()
                .map_err(|e| TransportError::ConnectionFailed(format!("agent: {e}")))?;
            agent
                .connect()
                .map_err(|e| TransportError::ConnectionFailed(format!("agent: {e}")))?;
            agent
                .list_identities()
                .map_err(|e| TransportError::ConnectionFailed(format!("agent: {e}")))?;

            let identities = agent.identities().unwrap_or_default();
            let accepted = identities
                .iter()
                .any(|identity| agent.userauth(&config.username, identity).is_ok());
            if !accepted {
                return Err(TransportError::AuthRejected(
                    "no agent identity accepted".to_string(),
                ));
            }
        }
    }

    if !session.authenticated() {
        return Err(TransportError::AuthRejected(config.username.clone()));
    }
    Ok(())
}

/// Blocking handshake: socket, SSH negotiation, auth, PTY and shell
fn open_shell(config: &SshConfig) -> Result<(ssh2::Session, ssh2::Channel), TransportError> {
    let tcp = open_tcp(config)?;

    let mut session =
        ssh2::Session::new().map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
    session.set_timeout(u32::try_from(config.timeout_secs * 1000).unwrap_or(u32::MAX));
    session.set_tcp_stream(tcp);
    session.handshake().map_err(|e| {
        classify(e, config.timeout_secs, |e| {
            TransportError::ConnectionFailed(format!("SSH handshake failed: {e}"))
        })
    })?;

    authenticate(config, &session)?;

    let mut channel = session
        .channel_session()
        .map_err(|e| TransportError::ConnectionFailed(format!("channel open failed: {e}")))?;
    channel
        .request_pty(
            &config.term_type,
            None,
            Some((config.term_width, config.term_height, 0, 0)),
        )
        .map_err(|e| TransportError::ConnectionFailed(format!("PTY request failed: {e}")))?;
    channel
        .shell()
        .map_err(|e| TransportError::ConnectionFailed(format!("shell request failed: {e}")))?;

    session.set_blocking(false);
    Ok((session, channel))
}

#[async_trait]
impl TransportTrait for SshTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.is_connected() {
            return Ok(());
        }

        tracing::debug!("opening ssh shell to {}", self.connection_info());
        let config = self.config.clone();
        let timeout_secs = config.timeout_secs;
        let handshake = tokio::task::spawn_blocking(move || open_shell(&config));
        let (session, channel) =
            tokio::time::timeout(Duration::from_secs(timeout_secs), handshake)
                .await
                .map_err(|_| TransportError::Timeout(timeout_secs))?
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))??;

        self.session = Some(session);
        self.channel = Some(channel);
        self.connected_at = Some(Instant::now());
        *self.stats.write() = TransportStats::default();
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if let Some(session) = self.session.as_ref() {
            session.set_blocking(true);
        }
        if let Some(mut channel) = self.channel.take() {
            let _ = channel.close();
            let _ = channel.wait_close();
        }
        if let Some(session) = self.session.take() {
            let _ = session.disconnect(None, "client disconnect", None);
        }
        self.connected_at = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.session.is_some() && self.channel.is_some()
    }

    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let channel = self.channel.as_mut().ok_or(TransportError::NotConnected)?;
        write_nonblocking(channel, data, self.config.timeout_secs).await?;

        let mut stats = self.stats.write();
        stats.bytes_sent += data.len() as u64;
        stats.packets_sent += 1;

        Ok(data.len())
    }

    async fn receive(&mut self, max_len: usize) -> Result<Bytes, TransportError> {
        let channel = self.channel.as_mut().ok_or(TransportError::NotConnected)?;

        let mut buffer = vec![0u8; max_len.min(4096)];

        match channel.read(&mut buffer) {
            Ok(0) => {
                if channel.eof() {
                    Err(TransportError::Disconnected)
                } else {
                    Ok(Bytes::new())
                }
            }
            Ok(n) => {
                buffer.truncate(n);

                let mut stats = self.stats.write();
                stats.bytes_received += n as u64;
                stats.packets_received += 1;

                Ok(Bytes::from(buffer))
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(Bytes::new()),
            Err(e) => Err(TransportError::IoError(e)),
        }
    }

    fn opening_delay(&self) -> Duration {
        self.config.opening_delay
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Ssh
    }

    fn connection_info(&self) -> String {
        format!(
            "ssh://{}@{}:{}",
            self.config.username, self.config.host, self.config.port
        )
    }

    fn stats(&self) -> TransportStats {
        let mut stats = self.stats.read().clone();
        if let Some(connected_at) = self.connected_at {
            stats.uptime_secs = connected_at.elapsed().as_secs();
        }
        stats
    }
}
