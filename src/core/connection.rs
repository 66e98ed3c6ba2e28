//! Persistent bidirectional connection for one manuscript.
//!
//! A [`ConnectionManager`] owns a driver task that walks the
//! `Disconnected -> Connecting -> Connected -> Disconnected` cycle and
//! reconnects after the [`ReconnectPolicy`] delay for as long as the manager
//! is open. Because a single task drives the cycle, at most one connect
//! attempt is ever in flight per manager.
//!
//! Events are reported on an unbounded channel tagged with the manager's link
//! id, mirroring how streams are tagged elsewhere, so a consumer can drop
//! events from a link it already replaced.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{parse_inbound, InboundMessage, ParagraphFrame};
use crate::core::store::ConnectionState;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The connection could not be established.
    Connect(String),
    /// An established connection failed while reading or writing.
    Transport(String),
    /// The peer closed the connection.
    Closed,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::Connect(reason) => write!(f, "Failed to connect: {reason}"),
            ConnectionError::Transport(reason) => write!(f, "Connection failed: {reason}"),
            ConnectionError::Closed => write!(f, "Connection closed by peer"),
        }
    }
}

impl std::error::Error for ConnectionError {}

pub type FrameSink = Pin<Box<dyn Sink<String, Error = ConnectionError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, ConnectionError>> + Send>>;

/// Text-frame halves of an established connection.
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Factory for transports; substituted in tests.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Transport, ConnectionError>;
}

/// WebSocket transport over `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Transport, ConnectionError> {
        let (socket, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| ConnectionError::Connect(e.to_string()))?;
        let (write, read) = socket.split();

        let sink = write
            .sink_map_err(|e| ConnectionError::Transport(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, ConnectionError>(Message::Text(text))));

        let stream = read.filter_map(|item| {
            future::ready(match item {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => {
                        debug!("ignoring non-UTF-8 binary frame");
                        None
                    }
                },
                Ok(Message::Close(_)) => Some(Err(ConnectionError::Closed)),
                Ok(_) => None,
                Err(e) => Some(Err(ConnectionError::Transport(e.to_string()))),
            })
        });

        Ok(Transport {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    StateChanged(ConnectionState),
    Message(InboundMessage),
    /// An inbound frame that could not be parsed.
    Malformed { error: String },
}

/// Backoff schedule and attempt counter for reconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delay: Duration,
    max_attempts: Option<u32>,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
            attempts: 0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay before the next attempt, or `None` once the cap is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self
            .max_attempts
            .is_some_and(|max_attempts| self.attempts >= max_attempts)
        {
            return None;
        }
        self.attempts += 1;
        Some(self.delay)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RECONNECT_DELAY)
    }
}

pub struct ConnectionParams {
    pub connector: Arc<dyn Connector>,
    pub url: String,
    pub policy: ReconnectPolicy,
    pub events: mpsc::UnboundedSender<(ConnectionEvent, u64)>,
    pub link_id: u64,
    pub scope: CancellationToken,
}

pub struct ConnectionManager {
    link_id: u64,
    state: watch::Receiver<ConnectionState>,
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
    driver: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Start connecting immediately. The driver stops when the manager is
    /// closed or dropped, or when `params.scope` is cancelled.
    pub fn open(params: ConnectionParams) -> Self {
        let ConnectionParams {
            connector,
            url,
            policy,
            events,
            link_id,
            scope,
        } = params;

        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = scope.child_token();

        let driver = Driver {
            connector,
            url,
            policy,
            events,
            link_id,
            cancel: cancel.clone(),
            state: state_tx,
            outbound: outbound_rx,
        };
        let handle = tokio::spawn(driver.run());

        Self {
            link_id,
            state: state_rx,
            outbound: outbound_tx,
            cancel,
            driver: Some(handle),
        }
    }

    pub fn link_id(&self) -> u64 {
        self.link_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Transmit a frame. Frames are never queued: unless the connection is
    /// up this returns `false` and the frame is dropped.
    pub fn send(&self, frame: &ParagraphFrame) -> bool {
        if !self.is_connected() {
            debug!(link = self.link_id, "send skipped; not connected");
            return false;
        }

        match serde_json::to_string(frame) {
            Ok(text) => self.outbound.send(text).is_ok(),
            Err(e) => {
                warn!(error = %e, "failed to encode outbound frame");
                false
            }
        }
    }

    /// Stop the driver and close the socket. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.cancel.cancel();
    }

    /// Like [`close`](Self::close) but waits for the driver to finish.
    pub async fn close_and_wait(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.driver.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum LinkEnd {
    /// Closed from our side; do not reconnect.
    Closed,
    /// Lost to the peer or the network.
    Dropped,
}

struct Driver {
    connector: Arc<dyn Connector>,
    url: String,
    policy: ReconnectPolicy,
    events: mpsc::UnboundedSender<(ConnectionEvent, u64)>,
    link_id: u64,
    cancel: CancellationToken,
    state: watch::Sender<ConnectionState>,
    outbound: mpsc::UnboundedReceiver<String>,
}

impl Driver {
    async fn run(mut self) {
        loop {
            self.set_state(ConnectionState::Connecting);
            info!(link = self.link_id, url = %self.url, "connecting");

            let attempt = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.connector.connect(&self.url) => result,
            };

            match attempt {
                Ok(transport) => {
                    self.policy.reset();
                    // Anything queued before this link existed is stale.
                    while self.outbound.try_recv().is_ok() {}
                    self.set_state(ConnectionState::Connected);
                    info!(link = self.link_id, "connected");

                    if let LinkEnd::Closed = self.pump(transport).await {
                        break;
                    }
                }
                Err(e) => warn!(link = self.link_id, error = %e, "connect attempt failed"),
            }

            self.set_state(ConnectionState::Disconnected);
            let Some(delay) = self.policy.next_delay() else {
                warn!(
                    link = self.link_id,
                    attempts = self.policy.attempts(),
                    "giving up on reconnecting"
                );
                break;
            };
            info!(
                link = self.link_id,
                attempt = self.policy.attempts(),
                delay_ms = delay.as_millis() as u64,
                "scheduling reconnect"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ConnectionState::Disconnected);
        debug!(link = self.link_id, "connection driver stopped");
    }

    async fn pump(&mut self, transport: Transport) -> LinkEnd {
        let Transport {
            mut sink,
            mut stream,
        } = transport;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = tokio::time::timeout(CLOSE_GRACE, sink.close()).await;
                    return LinkEnd::Closed;
                }
                frame = self.outbound.recv() => match frame {
                    Some(text) => {
                        // A send stalled on backpressure must not hold up close.
                        let sent = tokio::select! {
                            _ = self.cancel.cancelled() => return LinkEnd::Closed,
                            sent = sink.send(text) => sent,
                        };
                        if let Err(e) = sent {
                            warn!(link = self.link_id, error = %e, "send failed");
                            return LinkEnd::Dropped;
                        }
                    }
                    None => {
                        let _ = tokio::time::timeout(CLOSE_GRACE, sink.close()).await;
                        return LinkEnd::Closed;
                    }
                },
                inbound = stream.next() => match inbound {
                    Some(Ok(text)) => self.dispatch_frame(&text),
                    Some(Err(e)) => {
                        info!(link = self.link_id, error = %e, "connection lost");
                        return LinkEnd::Dropped;
                    }
                    None => {
                        info!(link = self.link_id, "connection closed by peer");
                        return LinkEnd::Dropped;
                    }
                },
            }
        }
    }

    fn dispatch_frame(&self, text: &str) {
        match parse_inbound(text) {
            Ok(Some(message)) => self.emit(ConnectionEvent::Message(message)),
            Ok(None) => debug!(link = self.link_id, "ignoring unrecognized message kind"),
            Err(e) => {
                warn!(link = self.link_id, error = %e, "failed to parse inbound frame");
                self.emit(ConnectionEvent::Malformed {
                    error: e.to_string(),
                });
            }
        }
    }

    fn set_state(&self, next: ConnectionState) {
        if *self.state.borrow() == next {
            return;
        }
        self.state.send_replace(next);
        self.emit(ConnectionEvent::StateChanged(next));
    }

    fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send((event, self.link_id));
    }
}
