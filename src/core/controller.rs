//! Session coordinator
//!
//! A small TCP service that lets separate processes hand "new session"
//! options to the one process that owns the terminal sessions. Each inbound
//! connection carries a single line of options, which is broadcast to every
//! subscriber. Instances are independent: bind as many as needed, on
//! distinct addresses, and stop each with [`Controller::shutdown`].

use chrono::{DateTime, Local};
use futures::StreamExt;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;

/// Longest accepted options line
const MAX_LINE: usize = 64 * 1024;
/// Events buffered per subscriber before old ones are dropped
const EVENT_CAPACITY: usize = 64;

/// Options received from a peer
#[derive(Debug, Clone)]
pub struct ControllerEvent {
    /// Raw options line, without terminator
    pub options: String,
    /// Sender address
    pub peer: SocketAddr,
    /// Arrival time
    pub received_at: DateTime<Local>,
}

struct Inner {
    local_addr: SocketAddr,
    events: broadcast::Sender<ControllerEvent>,
    token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Handle to a running coordinator; clones share the same service
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl Controller {
    /// Bind `addr` and start accepting
    pub async fn bind(addr: impl ToSocketAddrs) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let token = CancellationToken::new();

        let task = tokio::spawn(accept_loop(listener, events.clone(), token.clone()));
        tracing::info!("Controller listening on {}", local_addr);

        Ok(Self {
            inner: Arc::new(Inner {
                local_addr,
                events,
                token,
                task: Mutex::new(Some(task)),
            }),
        })
    }

    /// Bound address
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Receive future events
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.inner.events.subscribe()
    }

    /// Whether the service is still accepting
    pub fn is_running(&self) -> bool {
        !self.inner.token.is_cancelled()
    }

    /// Stop accepting and close the listener. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.inner.token.cancel();
        let task = self.inner.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!("Controller task ended abnormally: {}", e);
            }
            tracing::info!("Controller on {} stopped", self.inner.local_addr);
        }
    }

    /// Send one options line to the controller at `addr`
    pub async fn notify(addr: impl ToSocketAddrs, options: &str) -> std::io::Result<()> {
        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(options.trim_end().as_bytes()).await?;
        stream.write_all(b"\n").await?;
        stream.shutdown().await
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("local_addr", &self.inner.local_addr)
            .field("running", &self.is_running())
            .finish()
    }
}

async fn accept_loop(
    listener: TcpListener,
    events: broadcast::Sender<ControllerEvent>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!("Controller connection from {}", peer);
                    tokio::spawn(read_options(stream, peer, events.clone(), token.clone()));
                }
                Err(e) => tracing::warn!("Controller accept failed: {}", e),
            },
        }
    }
}

async fn read_options(
    stream: TcpStream,
    peer: SocketAddr,
    events: broadcast::Sender<ControllerEvent>,
    token: CancellationToken,
) {
    let mut lines = FramedRead::new(stream, LinesCodec::new_with_max_length(MAX_LINE));

    let line = tokio::select! {
        _ = token.cancelled() => return,
        line = lines.next() => line,
    };

    match line {
        Some(Ok(options)) => {
            tracing::info!("New session options from {}: {}", peer, options);
            let event = ControllerEvent {
                options,
                peer,
                received_at: Local::now(),
            };
            if events.send(event).is_err() {
                tracing::debug!("No subscribers for controller event");
            }
        }
        Some(Err(e)) => tracing::warn!("Bad options line from {}: {}", peer, e),
        None => tracing::debug!("{} closed without sending options", peer),
    }
}
