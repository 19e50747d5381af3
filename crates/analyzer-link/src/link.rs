//! Analyzer link over WebSocket
//!
//! Each successful `connect` spawns a writer task draining a small bounded
//! outbound queue and a reader task decoding inbound signals. Both tasks are
//! tagged with a connection generation so a stale task from a previous
//! connection can never mark a newer one as lost.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::{AlertSignal, ConnectionState, Frame, FrameFormat, FrameSink, LinkError, LinkEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Analyzer link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Analyzer WebSocket endpoint
    pub endpoint: String,
    /// Handshake budget (milliseconds)
    pub connect_timeout_ms: u64,
    /// Maximum time a send may wait for queue space (milliseconds)
    pub send_timeout_ms: u64,
    /// Time allowed for the close handshake on disconnect (milliseconds)
    pub close_timeout_ms: u64,
    /// Outbound frames allowed in flight to the socket writer
    pub outbound_capacity: usize,
    /// Outbound frame encoding
    pub frame_format: FrameFormat,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8000/ws".to_string(),
            connect_timeout_ms: 3000,
            send_timeout_ms: 50,
            close_timeout_ms: 500,
            outbound_capacity: 2,
            frame_format: FrameFormat::DataUrl,
        }
    }
}

/// State shared with the per-connection tasks
struct Shared {
    state: watch::Sender<ConnectionState>,
    outbound: StdMutex<Option<mpsc::Sender<Message>>>,
    events: mpsc::UnboundedSender<LinkEvent>,
    generation: AtomicU64,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("Analyzer link {} -> {}", previous, next);
        }
    }

    fn outbound(&self) -> Option<mpsc::Sender<Message>> {
        match self.outbound.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_outbound(&self, tx: Option<mpsc::Sender<Message>>) {
        match self.outbound.lock() {
            Ok(mut slot) => *slot = tx,
            Err(poisoned) => *poisoned.into_inner() = tx,
        }
    }

    /// Peer-side loss of connection `generation`
    fn mark_lost(&self, generation: u64, reason: String) {
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        if self.state() != ConnectionState::Connected {
            // Local disconnect in progress
            return;
        }
        warn!("Analyzer connection lost: {}", reason);
        self.set_outbound(None);
        self.set_state(ConnectionState::Disconnected);
        metrics::counter!("analyzer_connection_lost_total").increment(1);
        let _ = self.events.send(LinkEvent::ConnectionLost { reason });
    }
}

/// Background tasks of one live connection
struct Connection {
    generation: u64,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl Connection {
    /// Let the writer flush and send a close frame, then tear down
    async fn close(self, budget: Duration) {
        let Connection {
            generation,
            mut writer,
            reader,
        } = self;
        if tokio::time::timeout(budget, &mut writer).await.is_err() {
            debug!("Connection {} writer did not close in time", generation);
            writer.abort();
        }
        reader.abort();
    }

    fn abort(self) {
        self.writer.abort();
        self.reader.abort();
    }
}

/// Resets a `Connecting` state left behind by a cancelled connect
struct ConnectingGuard<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.shared.state() == ConnectionState::Connecting {
            self.shared.set_state(ConnectionState::Disconnected);
        }
    }
}

/// Duplex link to the analyzer
pub struct AnalyzerLink {
    config: LinkConfig,
    shared: Arc<Shared>,
    connection: Mutex<Option<Connection>>,
}

impl AnalyzerLink {
    /// Create a disconnected link and the receiver for its inbound events
    pub fn new(config: LinkConfig) -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        let link = Self {
            config,
            shared: Arc::new(Shared {
                state: state_tx,
                outbound: StdMutex::new(None),
                events: events_tx,
                generation: AtomicU64::new(0),
            }),
            connection: Mutex::new(None),
        };
        (link, events_rx)
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Watch connection state changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Establish the connection.
    ///
    /// Returns the current state without doing anything when already
    /// connecting or connected.
    pub async fn connect(&self, endpoint: &str) -> Result<ConnectionState, LinkError> {
        let current = self.state();
        if matches!(
            current,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            debug!("Connect ignored, link already {}", current);
            return Ok(current);
        }

        let mut slot = self.connection.lock().await;
        let current = self.state();
        if matches!(
            current,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            return Ok(current);
        }
        if let Some(stale) = slot.take() {
            stale.abort();
        }

        self.shared.set_state(ConnectionState::Connecting);
        let mut guard = ConnectingGuard {
            shared: &*self.shared,
            armed: true,
        };
        info!("Connecting to analyzer at {}", endpoint);

        let budget = Duration::from_millis(self.config.connect_timeout_ms);
        let ws = match tokio::time::timeout(budget, connect_async(endpoint)).await {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                self.shared.set_state(ConnectionState::Disconnected);
                warn!("Analyzer connect to {} failed: {}", endpoint, e);
                return Err(LinkError::Connection(format!("{}: {}", endpoint, e)));
            }
            Err(_) => {
                self.shared.set_state(ConnectionState::Disconnected);
                warn!(
                    "Analyzer handshake with {} timed out after {}ms",
                    endpoint, self.config.connect_timeout_ms
                );
                return Err(LinkError::Connection(format!(
                    "{}: handshake timed out after {}ms",
                    endpoint, self.config.connect_timeout_ms
                )));
            }
        };
        guard.armed = false;

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (write, read) = ws.split();
        let (tx, rx) = mpsc::channel(self.config.outbound_capacity.max(1));

        self.shared.set_outbound(Some(tx));
        self.shared.set_state(ConnectionState::Connected);

        let writer = tokio::spawn(writer_task(write, rx, self.shared.clone(), generation));
        let reader = tokio::spawn(reader_task(read, self.shared.clone(), generation));
        *slot = Some(Connection {
            generation,
            writer,
            reader,
        });

        info!("Connected to analyzer at {} (connection {})", endpoint, generation);
        Ok(ConnectionState::Connected)
    }

    /// Queue a frame for transmission.
    ///
    /// Never waits longer than the send budget; a frame that cannot be queued
    /// in time is dropped.
    pub async fn send(&self, frame: Frame) -> Result<(), LinkError> {
        if self.state() != ConnectionState::Connected {
            return Err(LinkError::NotConnected);
        }
        let tx = self.shared.outbound().ok_or(LinkError::NotConnected)?;
        let sequence = frame.sequence;
        let message = self.config.frame_format.encode(frame)?;

        let budget = Duration::from_millis(self.config.send_timeout_ms);
        match tx.send_timeout(message, budget).await {
            Ok(()) => {
                debug!("Frame {} queued", sequence);
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => {
                Err(LinkError::SendTimeout(self.config.send_timeout_ms))
            }
            Err(SendTimeoutError::Closed(_)) => Err(LinkError::NotConnected),
        }
    }

    /// Close the connection. Safe to call in any state.
    pub async fn disconnect(&self) {
        let mut slot = self.connection.lock().await;
        if self.state() == ConnectionState::Disconnected && slot.is_none() {
            return;
        }

        self.shared.set_state(ConnectionState::Closing);
        // Dropping the sender lets the writer drain and send a close frame
        self.shared.set_outbound(None);
        if let Some(connection) = slot.take() {
            let generation = connection.generation;
            connection
                .close(Duration::from_millis(self.config.close_timeout_ms))
                .await;
            info!("Analyzer connection {} closed", generation);
        }
        self.shared.set_state(ConnectionState::Disconnected);
    }
}

impl Drop for AnalyzerLink {
    fn drop(&mut self) {
        // The connection tasks share `Shared`; without this the writer
        // would wait on the outbound queue forever.
        self.shared.set_outbound(None);
        self.shared.set_state(ConnectionState::Disconnected);
        if let Some(connection) = self.connection.get_mut().take() {
            let budget = Duration::from_millis(self.config.close_timeout_ms);
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(connection.close(budget));
                }
                Err(_) => connection.abort(),
            }
        }
    }
}

#[async_trait]
impl FrameSink for AnalyzerLink {
    fn connection_state(&self) -> ConnectionState {
        self.state()
    }

    async fn send(&self, frame: Frame) -> Result<(), LinkError> {
        AnalyzerLink::send(self, frame).await
    }
}

async fn writer_task(
    mut write: SplitSink<WsStream, Message>,
    mut rx: mpsc::Receiver<Message>,
    shared: Arc<Shared>,
    generation: u64,
) {
    while let Some(message) = rx.recv().await {
        if let Err(e) = write.send(message).await {
            shared.mark_lost(generation, format!("write failed: {}", e));
            return;
        }
        metrics::counter!("frames_sent_total").increment(1);
    }

    if let Err(e) = write.close().await {
        debug!("Close handshake on connection {} failed: {}", generation, e);
    }
    debug!("Writer for connection {} finished", generation);
}

async fn reader_task(mut read: SplitStream<WsStream>, shared: Arc<Shared>, generation: u64) {
    while let Some(message) = read.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    warn!("Ignoring non-UTF-8 binary message from analyzer");
                    continue;
                }
            },
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|f| format!("closed by analyzer (code {})", u16::from(f.code)))
                    .unwrap_or_else(|| "closed by analyzer".to_string());
                shared.mark_lost(generation, reason);
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                shared.mark_lost(generation, e.to_string());
                return;
            }
        };

        match AlertSignal::decode(&text) {
            Ok(signal) => {
                debug!("Analyzer signal {}", signal.kind.as_str());
                if shared.events.send(LinkEvent::Signal(signal)).is_err() {
                    debug!("Link event receiver dropped");
                }
            }
            Err(e) => {
                warn!("Skipping analyzer message: {}", e);
                metrics::counter!("analyzer_undecodable_total").increment(1);
            }
        }
    }

    shared.mark_lost(generation, "stream ended".to_string());
}
