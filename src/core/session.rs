//! Session management for screen-oriented hosts
//!
//! A Session owns one transport and the screen buffer: the text of the last
//! frame received. There is no background reader. Every read is a pump the
//! caller triggers, directly or through a send, so a session is driven by a
//! single task.

use super::keys::{FunctionKey, Key, UnknownKey, LINE_TERMINATOR};
use super::poll::Poller;
use super::screen::{Geometry, Screen};
use super::transcript::{Direction, Transcript};
use super::transport::{create_transport, Transport, TransportError, TransportStats, TransportTrait};
use bytes::BytesMut;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Longest frame excerpt written to trace logs
const TRACE_EXCERPT: usize = 200;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not connected
    Disconnected,
    /// Connect in progress
    Connecting,
    /// Connected and active
    Connected,
}

/// Stage of the sign-on handshake that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    /// Waiting for the sign-on prompt
    SignOn,
    /// Waiting for the main menu after credentials
    MainMenu,
}

impl fmt::Display for LoginStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SignOn => write!(f, "sign-on"),
            Self::MainMenu => write!(f, "main menu"),
        }
    }
}

/// Session error types
#[derive(Error, Debug)]
pub enum SessionError {
    /// Operation requires a connected session
    #[error("Not connected")]
    NotConnected,

    /// Function key outside 1..=24
    #[error("Invalid function key: F{0} (must be 1-24)")]
    InvalidFunctionKey(u8),

    /// Key name not in the supported set
    #[error("Unsupported key: {0}")]
    UnknownKey(String),

    /// Sign-on handshake did not see the expected screen
    #[error("Login failed: {stage} screen not seen (waiting for {expected:?})")]
    LoginFailed {
        /// Stage that timed out
        stage: LoginStage,
        /// Marker text that never appeared
        expected: String,
    },

    /// No field matched the locator
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<UnknownKey> for SessionError {
    fn from(err: UnknownKey) -> Self {
        Self::UnknownKey(err.0)
    }
}

/// Settle and poll timings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingConfig {
    /// Pause after typed text before reading
    pub text_settle: Duration,
    /// Pause after a named key before reading
    pub key_settle: Duration,
    /// Pause after a function key before reading
    pub function_key_settle: Duration,
    /// Pause at the start of each pump
    pub read_settle: Duration,
    /// Pause between reads inside one pump
    pub burst_delay: Duration,
    /// Interval between checks in wait loops
    pub poll_interval: Duration,
    /// Largest frame one pump will collect, in bytes
    pub read_buffer: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            text_settle: Duration::from_millis(500),
            key_settle: Duration::from_millis(500),
            function_key_settle: Duration::from_millis(1000),
            read_settle: Duration::from_millis(100),
            burst_delay: Duration::from_millis(50),
            poll_interval: Duration::from_millis(100),
            read_buffer: 8192,
        }
    }
}

/// User credentials
#[derive(Clone, Default)]
pub struct Credentials {
    /// User name
    pub username: String,
    /// Password
    pub password: String,
}

impl Credentials {
    /// Create credentials
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

/// Application-level sign-on performed during connect
#[derive(Debug, Clone)]
pub struct LoginScript {
    /// Credentials typed at the sign-on screen
    pub credentials: Credentials,
    /// Text identifying the sign-on screen
    pub sign_on_marker: String,
    /// Text identifying the main menu
    pub main_menu_marker: String,
    /// How long to wait for the sign-on screen
    pub sign_on_timeout: Duration,
    /// How long to wait for the main menu after sending credentials
    pub main_menu_timeout: Duration,
}

impl LoginScript {
    /// Script with the default markers and timeouts
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            sign_on_marker: "Sign On".to_string(),
            main_menu_marker: "MAIN".to_string(),
            sign_on_timeout: Duration::from_secs(5),
            main_menu_timeout: Duration::from_secs(15),
        }
    }
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Session name (for logs)
    pub name: String,
    /// Transport configuration
    pub transport: Transport,
    /// Sign-on performed after the transport opens
    pub login: Option<LoginScript>,
    /// Settle and poll timings
    pub timing: TimingConfig,
    /// Screen size
    pub geometry: Geometry,
}

impl SessionConfig {
    /// Create a configuration with default timings and no sign-on
    pub fn new(name: &str, transport: Transport) -> Self {
        Self {
            name: name.to_string(),
            transport,
            login: None,
            timing: TimingConfig::default(),
            geometry: Geometry::default(),
        }
    }
}

/// A connection to one host and its screen buffer
pub struct Session {
    id: Uuid,
    name: String,
    state: SessionState,
    transport: Box<dyn TransportTrait>,
    login: Option<LoginScript>,
    timing: TimingConfig,
    geometry: Geometry,
    screen: String,
    transcript: Option<Transcript>,
}

impl Session {
    /// Create a closed session from configuration
    pub fn new(config: SessionConfig) -> Self {
        let mut session = Self::with_transport(
            &config.name,
            create_transport(config.transport),
            config.timing,
        );
        session.login = config.login;
        session.geometry = config.geometry;
        session
    }

    /// Create a closed session over an existing transport
    pub fn with_transport(name: &str, transport: Box<dyn TransportTrait>, timing: TimingConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            state: SessionState::Disconnected,
            transport,
            login: None,
            timing,
            geometry: Geometry::default(),
            screen: String::new(),
            transcript: None,
        }
    }

    /// Perform `login` during every connect
    #[must_use]
    pub fn with_login(mut self, login: LoginScript) -> Self {
        self.login = Some(login);
        self
    }

    /// Set the screen size
    #[must_use]
    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Record traffic into `transcript`
    #[must_use]
    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = Some(transcript);
        self
    }

    /// Get session ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get session name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Settle and poll timings
    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    /// Screen size
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Transport connection info
    pub fn connection_info(&self) -> String {
        self.transport.connection_info()
    }

    /// Transport statistics
    pub fn stats(&self) -> TransportStats {
        self.transport.stats()
    }

    /// Transcript, if recording
    pub fn transcript(&self) -> Option<&Transcript> {
        self.transcript.as_ref()
    }

    /// Text of the last frame received
    pub fn current_screen(&self) -> &str {
        &self.screen
    }

    /// Forget the current frame without talking to the host
    pub fn clear_screen(&mut self) {
        self.screen.clear();
    }

    /// Open the transport, read the first frame and run the sign-on script.
    ///
    /// Connecting an already connected session is a no-op. Any failure
    /// closes the transport and leaves the session disconnected.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        if self.is_connected() {
            return Ok(());
        }

        tracing::info!(session = %self.id, "Connecting to {}", self.transport.connection_info());
        self.state = SessionState::Connecting;

        match self.open().await {
            Ok(()) => {
                tracing::info!(session = %self.id, "Connected to {}", self.transport.connection_info());
                self.note("connected");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(session = %self.id, "Connect failed: {}", e);
                if let Err(close) = self.transport.disconnect().await {
                    tracing::debug!("Close after failed connect: {}", close);
                }
                self.state = SessionState::Disconnected;
                self.screen.clear();
                Err(e)
            }
        }
    }

    async fn open(&mut self) -> Result<(), SessionError> {
        self.transport.connect().await?;
        self.state = SessionState::Connected;

        let delay = self.transport.opening_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.read_current_screen().await?;

        if let Some(login) = self.login.clone() {
            self.sign_on(&login).await?;
        }
        Ok(())
    }

    async fn sign_on(&mut self, login: &LoginScript) -> Result<(), SessionError> {
        if !self.wait_for_text(&login.sign_on_marker, login.sign_on_timeout).await? {
            return Err(SessionError::LoginFailed {
                stage: LoginStage::SignOn,
                expected: login.sign_on_marker.clone(),
            });
        }

        tracing::debug!(session = %self.id, "Signing on as {}", login.credentials.username);
        self.type_line(&login.credentials.username, false).await?;
        self.type_line(&login.credentials.password, true).await?;

        if !self.wait_for_text(&login.main_menu_marker, login.main_menu_timeout).await? {
            return Err(SessionError::LoginFailed {
                stage: LoginStage::MainMenu,
                expected: login.main_menu_marker.clone(),
            });
        }
        Ok(())
    }

    /// Close the transport and clear the screen buffer.
    ///
    /// Close errors are logged and swallowed; calling this twice is safe.
    pub async fn disconnect(&mut self) {
        if self.state != SessionState::Disconnected {
            tracing::info!(session = %self.id, "Disconnecting from {}", self.transport.connection_info());
            self.note("disconnected");
        }
        if let Err(e) = self.transport.disconnect().await {
            tracing::warn!(session = %self.id, "Error while closing transport: {}", e);
        }
        self.state = SessionState::Disconnected;
        self.screen.clear();
    }

    fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }

    /// Type `text` followed by a line terminator, settle, then pump
    pub async fn send_text(&mut self, text: &str) -> Result<(), SessionError> {
        self.type_line(text, false).await
    }

    async fn type_line(&mut self, text: &str, secret: bool) -> Result<(), SessionError> {
        self.ensure_connected()?;
        if secret {
            tracing::debug!(session = %self.id, "Sending text: ********");
        } else {
            tracing::debug!(session = %self.id, "Sending text: {}", text);
        }

        let line = format!("{text}{LINE_TERMINATOR}");
        self.transport.send(line.as_bytes()).await?;
        if let Some(transcript) = self.transcript.as_mut() {
            let recorded = if secret { format!("********{LINE_TERMINATOR}") } else { line };
            transcript.record(Direction::Sent, recorded.as_bytes());
        }

        self.settle(self.timing.text_settle).await
    }

    /// Write bytes as-is: no terminator, no settle, no read
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<(), SessionError> {
        self.ensure_connected()?;
        tracing::trace!(session = %self.id, "Sending {} raw bytes", data.len());
        self.transport.send(data).await?;
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.record(Direction::Sent, data);
        }
        Ok(())
    }

    /// Press function key F`number` (1-24), settle, then pump
    pub async fn send_function_key(&mut self, number: u8) -> Result<(), SessionError> {
        let key = FunctionKey::new(number).ok_or(SessionError::InvalidFunctionKey(number))?;
        self.ensure_connected()?;
        tracing::debug!(session = %self.id, "Sending function key {}", key);

        self.send_raw(key.escape_sequence().as_bytes()).await?;
        self.settle(self.timing.function_key_settle).await
    }

    /// Press a key by name (`ENTER`, `TAB`, `ESCAPE`; case-insensitive)
    pub async fn send_key(&mut self, name: &str) -> Result<(), SessionError> {
        let key: Key = name.parse()?;
        self.press(key).await
    }

    /// Press a named key, settle, then pump
    pub async fn press(&mut self, key: Key) -> Result<(), SessionError> {
        self.ensure_connected()?;
        tracing::debug!(session = %self.id, "Sending key {}", key);

        self.send_raw(key.sequence().as_bytes()).await?;
        self.settle(self.timing.key_settle).await
    }

    /// Sleep for `duration`, then pump
    pub async fn settle(&mut self, duration: Duration) -> Result<(), SessionError> {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
        self.read_current_screen().await.map(|_| ())
    }

    /// Type `command`, wait `wait`, and return the resulting screen text
    pub async fn execute(&mut self, command: &str, wait: Duration) -> Result<String, SessionError> {
        self.send_text(command).await?;
        self.settle(wait).await?;
        Ok(self.screen.clone())
    }

    /// Pump: drain whatever the host has sent into a new frame.
    ///
    /// Reads until nothing more is immediately available or the read buffer
    /// is full, pausing briefly between reads to catch bursts. When anything
    /// was read the screen buffer is replaced with it; otherwise it is left
    /// as it was. Returns the number of bytes read.
    pub async fn read_current_screen(&mut self) -> Result<usize, SessionError> {
        self.ensure_connected()?;
        if !self.timing.read_settle.is_zero() {
            tokio::time::sleep(self.timing.read_settle).await;
        }

        let capacity = self.timing.read_buffer.max(1);
        let mut frame = BytesMut::with_capacity(capacity);
        while frame.len() < capacity {
            let chunk = self.transport.receive(capacity - frame.len()).await?;
            if chunk.is_empty() {
                break;
            }
            frame.extend_from_slice(&chunk);
            if !self.timing.burst_delay.is_zero() {
                tokio::time::sleep(self.timing.burst_delay).await;
            }
        }

        if frame.is_empty() {
            return Ok(0);
        }

        self.screen = String::from_utf8_lossy(&frame).into_owned();
        tracing::trace!(
            session = %self.id,
            bytes = frame.len(),
            "Screen: {}",
            excerpt(&self.screen)
        );
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.record(Direction::Received, &frame);
        }
        Ok(frame.len())
    }

    /// Pump until `text` is on screen or `timeout` elapses.
    ///
    /// A timeout is `Ok(false)`, not an error. The deadline is checked before
    /// each pump, so a zero timeout returns at once.
    pub async fn wait_for_text(&mut self, text: &str, timeout: Duration) -> Result<bool, SessionError> {
        self.ensure_connected()?;
        let poller = Poller::new(self.timing.poll_interval, timeout);

        while !poller.expired() {
            self.read_current_screen().await?;
            if self.screen.contains(text) {
                tracing::debug!(session = %self.id, "Found text on screen: {}", text);
                return Ok(true);
            }
            poller.wait().await;
        }

        tracing::warn!(session = %self.id, "Timeout waiting for text: {}", text);
        Ok(false)
    }

    /// Pump, then snapshot the buffer as a [`Screen`]
    pub async fn screen(&mut self) -> Result<Screen, SessionError> {
        Screen::capture(self).await
    }

    /// Substring test against the current buffer; does not pump
    pub fn is_text_on_screen(&self, text: &str) -> bool {
        self.screen.contains(text)
    }

    fn note(&mut self, message: &str) {
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.note(message);
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("connection", &self.transport.connection_info())
            .finish()
    }
}

fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(TRACE_EXCERPT) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
