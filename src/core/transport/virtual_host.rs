//! Virtual host transport
//!
//! A scriptable in-process host. Frames queued on the [`VirtualHost`] are
//! delivered to the session on its next pump; response rules queue a frame
//! whenever the session writes bytes containing a trigger text. Everything the
//! session writes is kept for inspection.

use super::{TransportError, TransportStats, TransportTrait, TransportType};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Response rule: when written bytes contain `trigger`, queue `frame`
#[derive(Debug, Clone)]
pub struct ResponseRule {
    /// Text to look for in written data
    pub trigger: String,
    /// Frame queued when the trigger matches
    pub frame: String,
}

/// Scripted connect failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailure {
    /// Behave like an unreachable host
    Unreachable,
    /// Reject credentials
    AuthRejected,
    /// Time out
    Timeout,
}

#[derive(Debug, Default)]
struct HostState {
    incoming: VecDeque<Bytes>,
    written: Vec<u8>,
    rules: Vec<ResponseRule>,
    connected: bool,
    hung_up: bool,
    connect_count: u32,
    failure: Option<ConnectFailure>,
    stats: TransportStats,
}

/// Handle to a virtual host, shared with the transports it creates
#[derive(Debug, Clone, Default)]
pub struct VirtualHost {
    state: Arc<Mutex<HostState>>,
}

impl VirtualHost {
    /// Create an empty host
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport connected to this host
    pub fn transport(&self) -> VirtualTransport {
        VirtualTransport { host: self.clone() }
    }

    /// Queue a frame for the next pump
    pub fn push_frame(&self, frame: impl Into<String>) {
        let frame: String = frame.into();
        self.state.lock().incoming.push_back(Bytes::from(frame));
    }

    /// Add a response rule
    pub fn respond_to(&self, trigger: impl Into<String>, frame: impl Into<String>) {
        self.state.lock().rules.push(ResponseRule {
            trigger: trigger.into(),
            frame: frame.into(),
        });
    }

    /// Make the next connect attempt fail
    pub fn fail_next_connect(&self, failure: ConnectFailure) {
        self.state.lock().failure = Some(failure);
    }

    /// Close the stream from the host side; pending reads fail
    pub fn hang_up(&self) {
        self.state.lock().hung_up = true;
    }

    /// Bytes written by the session so far
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    /// Written bytes as text
    pub fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.state.lock().written).into_owned()
    }

    /// Take and clear the written bytes
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.lock().written)
    }

    /// Frames not yet read
    pub fn pending_frames(&self) -> usize {
        self.state.lock().incoming.len()
    }

    /// Whether a transport is currently connected
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Number of successful connects
    pub fn connect_count(&self) -> u32 {
        self.state.lock().connect_count
    }
}

/// Transport end of a [`VirtualHost`]
#[derive(Debug)]
pub struct VirtualTransport {
    host: VirtualHost,
}

#[async_trait]
impl TransportTrait for VirtualTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let mut state = self.host.state.lock();
        if state.connected {
            return Ok(());
        }
        match state.failure.take() {
            Some(ConnectFailure::Unreachable) => {
                Err(TransportError::Unreachable("virtual host".to_string()))
            }
            Some(ConnectFailure::AuthRejected) => {
                Err(TransportError::AuthRejected("virtual host".to_string()))
            }
            Some(ConnectFailure::Timeout) => Err(TransportError::Timeout(30)),
            None => {
                state.connected = true;
                state.hung_up = false;
                state.connect_count += 1;
                state.stats = TransportStats::default();
                Ok(())
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.host.state.lock().connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.host.is_connected()
    }

    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.host.state.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if state.hung_up {
            return Err(TransportError::Disconnected);
        }

        state.written.extend_from_slice(data);
        state.stats.bytes_sent += data.len() as u64;
        state.stats.packets_sent += 1;

        let text = String::from_utf8_lossy(data);
        let matched: Vec<Bytes> = state
            .rules
            .iter()
            .filter(|rule| text.contains(&rule.trigger))
            .map(|rule| Bytes::from(rule.frame.clone()))
            .collect();
        state.incoming.extend(matched);

        Ok(data.len())
    }

    async fn receive(&mut self, max_len: usize) -> Result<Bytes, TransportError> {
        let mut state = self.host.state.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if state.hung_up {
            return Err(TransportError::Disconnected);
        }

        let Some(mut chunk) = state.incoming.pop_front() else {
            return Ok(Bytes::new());
        };
        if chunk.len() > max_len {
            let rest = chunk.split_off(max_len);
            state.incoming.push_front(rest);
        }

        state.stats.bytes_received += chunk.len() as u64;
        state.stats.packets_received += 1;
        Ok(chunk)
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Virtual
    }

    fn connection_info(&self) -> String {
        "virtual://host".to_string()
    }

    fn stats(&self) -> TransportStats {
        self.host.state.lock().stats.clone()
    }
}
