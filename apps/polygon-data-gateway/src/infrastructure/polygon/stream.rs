//! Upstream Feed Connector
//!
//! Owns the single WebSocket connection to the Polygon stocks feed and
//! its reconnect/backoff state machine:
//!
//! `Disconnected → Connecting → Authenticating → Streaming → Disconnected`
//!
//! The loop runs for the life of the process; a close retries after the
//! short delay, auth rejections and other errors after the long delay,
//! with no retry cap. Subscribe/unsubscribe requests reach the connector
//! through a command channel and are only written while Streaming — the
//! registry's symbol set is the durable source of truth and is replayed
//! after every successful authentication.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::market::Symbol;
use crate::domain::subscription::SubscriptionRegistry;
use crate::infrastructure::polygon::auth::{AuthSignal, ConnectionState, classify_status};
use crate::infrastructure::polygon::codec::{CodecError, FeedCodec, FeedFrame};
use crate::infrastructure::polygon::messages::{ControlRequest, FeedEvent};

type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

// =============================================================================
// Commands
// =============================================================================

/// Upstream subscription request from the downstream side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedCommand {
    /// Subscribe to a symbol's quote channel.
    Subscribe(Symbol),
    /// Unsubscribe from a symbol's quote channel.
    Unsubscribe(Symbol),
}

/// Create the command channel linking feed handles to the connector.
#[must_use]
pub fn feed_channel(capacity: usize) -> (FeedHandle, mpsc::Receiver<FeedCommand>) {
    let (tx, rx) = mpsc::channel(capacity);
    (FeedHandle { tx }, rx)
}

/// Cloneable sender for upstream subscription requests.
///
/// Request paths never touch the socket; they enqueue commands here and
/// the connector writes them when it is streaming.
#[derive(Debug, Clone)]
pub struct FeedHandle {
    tx: mpsc::Sender<FeedCommand>,
}

impl FeedHandle {
    /// Request an upstream subscribe for a symbol.
    pub async fn subscribe(&self, symbol: &str) {
        if self
            .tx
            .send(FeedCommand::Subscribe(symbol.to_string()))
            .await
            .is_err()
        {
            warn!(symbol, "feed connector gone, dropping subscribe request");
        }
    }

    /// Request an upstream unsubscribe for a symbol.
    pub async fn unsubscribe(&self, symbol: &str) {
        if self
            .tx
            .send(FeedCommand::Unsubscribe(symbol.to_string()))
            .await
            .is_err()
        {
            warn!(symbol, "feed connector gone, dropping unsubscribe request");
        }
    }
}

// =============================================================================
// Feed State
// =============================================================================

/// Shared connection state and counters, read by the health endpoint.
pub struct FeedState {
    state: RwLock<ConnectionState>,
    reconnect_attempts: AtomicU32,
    messages_received: AtomicU64,
    last_connected: RwLock<Option<DateTime<Utc>>>,
}

/// Point-in-time snapshot of the feed state.
#[derive(Debug, Clone, Serialize)]
pub struct FeedStatus {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Reconnect attempts since the last successful authentication.
    pub reconnect_attempts: u32,
    /// Data events received over the life of the process.
    pub messages_received: u64,
    /// When the feed last authenticated successfully.
    pub last_connected: Option<DateTime<Utc>>,
}

impl Default for FeedState {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedState {
    /// New state, starting disconnected.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ConnectionState::Disconnected),
            reconnect_attempts: AtomicU32::new(0),
            messages_received: AtomicU64::new(0),
            last_connected: RwLock::new(None),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Point-in-time snapshot.
    #[must_use]
    pub fn status(&self) -> FeedStatus {
        FeedStatus {
            state: self.state(),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            last_connected: *self.last_connected.read(),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    fn record_authenticated(&self) {
        *self.last_connected.write() = Some(Utc::now());
        self.reconnect_attempts.store(0, Ordering::Relaxed);
    }

    fn record_retry(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Connector settings.
#[derive(Clone)]
pub struct FeedConnectorConfig {
    /// Feed WebSocket URL.
    pub url: String,
    /// Raw API key sent in the auth frame.
    pub api_key: String,
    /// Delay before retrying after an upstream close.
    pub reconnect_delay: Duration,
    /// Delay before retrying after an auth rejection or any other error.
    pub error_retry_delay: Duration,
}

impl FeedConnectorConfig {
    /// Settings with the standard retry delays (5s after a close, 30s
    /// after anything else).
    #[must_use]
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            reconnect_delay: Duration::from_secs(5),
            error_retry_delay: Duration::from_secs(30),
        }
    }
}

impl std::fmt::Debug for FeedConnectorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedConnectorConfig")
            .field("url", &self.url)
            .field("api_key", &"***")
            .field("reconnect_delay", &self.reconnect_delay)
            .field("error_retry_delay", &self.error_retry_delay)
            .finish()
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Why a connection attempt ended.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// The WebSocket handshake failed.
    #[error("connect failed: {0}")]
    Connect(#[source] tungstenite::Error),

    /// The feed rejected our credentials.
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    /// The upstream closed the connection.
    #[error("connection closed by upstream")]
    Closed,

    /// A read or write failed mid-stream.
    #[error("transport error: {0}")]
    Transport(#[source] tungstenite::Error),

    /// An outbound control frame could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ConnectorError {
    /// Backoff before the next attempt.
    #[must_use]
    pub const fn retry_delay(&self, config: &FeedConnectorConfig) -> Duration {
        match self {
            Self::Closed => config.reconnect_delay,
            _ => config.error_retry_delay,
        }
    }
}

// =============================================================================
// Feed Connector
// =============================================================================

/// Owner of the single upstream feed connection.
pub struct FeedConnector {
    config: FeedConnectorConfig,
    registry: Arc<SubscriptionRegistry>,
    state: Arc<FeedState>,
    events: mpsc::Sender<FeedEvent>,
    commands: mpsc::Receiver<FeedCommand>,
    cancel: CancellationToken,
    codec: FeedCodec,
}

impl FeedConnector {
    /// Wire a connector. `commands` is the receiver half from
    /// [`feed_channel`]; decoded data events flow out through `events`.
    pub fn new(
        config: FeedConnectorConfig,
        registry: Arc<SubscriptionRegistry>,
        state: Arc<FeedState>,
        events: mpsc::Sender<FeedEvent>,
        commands: mpsc::Receiver<FeedCommand>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            registry,
            state,
            events,
            commands,
            cancel,
            codec: FeedCodec::new(),
        }
    }

    /// Run until shutdown, reconnecting forever on failure.
    pub async fn run(mut self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.state.set_state(ConnectionState::Connecting);
            let delay = match self.connect_and_stream().await {
                Ok(()) => break,
                Err(err) => {
                    self.state.set_state(ConnectionState::Disconnected);
                    self.state.record_retry();
                    let delay = err.retry_delay(&self.config);
                    warn!(
                        error = %err,
                        retry_in_secs = delay.as_secs(),
                        "feed connection lost"
                    );
                    delay
                }
            };

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.state.set_state(ConnectionState::Disconnected);
        info!("feed connector stopped");
    }

    /// One connection attempt: handshake, auth, then stream until the
    /// connection dies or shutdown is requested. `Ok(())` means a clean
    /// cancellation.
    async fn connect_and_stream(&mut self) -> Result<(), ConnectorError> {
        info!(url = %self.config.url, "connecting to upstream feed");
        let (ws, _) = connect_async(&self.config.url)
            .await
            .map_err(ConnectorError::Connect)?;
        let (mut writer, mut reader) = ws.split();

        self.state.set_state(ConnectionState::Authenticating);
        Self::send_control(
            &self.codec,
            &mut writer,
            &ControlRequest::auth(&self.config.api_key),
        )
        .await?;

        let mut streaming = false;
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = writer.send(Message::Close(None)).await;
                    return Ok(());
                }

                command = self.commands.recv() => {
                    match command {
                        Some(command) if streaming => {
                            self.apply_command(&mut writer, command).await?;
                        }
                        // Not streaming yet: the registry still records the
                        // membership and the post-auth replay covers it.
                        Some(command) => debug!(?command, "deferring command until streaming"),
                        None => return Ok(()),
                    }
                }

                frame = Self::next_frame(&mut reader) => {
                    match frame? {
                        Some(text) => {
                            streaming = self.handle_text(&mut writer, &text, streaming).await?;
                        }
                        None => {}
                    }
                }
            }
        }
    }

    /// Read one frame, answering pings inline. `Ok(None)` is a frame the
    /// connector ignores.
    async fn next_frame(reader: &mut WsReader) -> Result<Option<String>, ConnectorError> {
        match reader.next().await {
            Some(Ok(Message::Text(text))) => Ok(Some(text.to_string())),
            Some(Ok(Message::Close(_))) | None => Err(ConnectorError::Closed),
            Some(Ok(_)) => Ok(None),
            Some(Err(
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed,
            )) => Err(ConnectorError::Closed),
            Some(Err(err)) => Err(ConnectorError::Transport(err)),
        }
    }

    /// Process one text frame. Returns the updated streaming flag.
    async fn handle_text(
        &self,
        writer: &mut WsWriter,
        text: &str,
        mut streaming: bool,
    ) -> Result<bool, ConnectorError> {
        let frames = match self.codec.decode(text) {
            Ok(frames) => frames,
            Err(err) => {
                warn!(error = %err, "dropping undecodable feed frame");
                return Ok(streaming);
            }
        };

        for frame in frames {
            match frame {
                FeedFrame::Status(status) => match classify_status(&status) {
                    AuthSignal::Connected => {
                        debug!("feed socket connected, awaiting auth result");
                    }
                    AuthSignal::Success => {
                        streaming = true;
                        self.state.set_state(ConnectionState::Streaming);
                        self.state.record_authenticated();
                        info!("upstream feed authenticated");
                        self.resubscribe_all(writer).await?;
                    }
                    AuthSignal::Failure(detail) => {
                        if streaming {
                            warn!(detail, "feed status error while streaming");
                        } else {
                            return Err(ConnectorError::AuthRejected(detail));
                        }
                    }
                },
                FeedFrame::Event(event) => {
                    self.state.record_message();
                    if self.events.send(event).await.is_err() {
                        debug!("dispatcher gone, dropping feed event");
                    }
                }
            }
        }

        Ok(streaming)
    }

    /// Replay the registry's full symbol set after authentication.
    async fn resubscribe_all(&self, writer: &mut WsWriter) -> Result<(), ConnectorError> {
        let symbols = self.registry.active_symbols();
        if symbols.is_empty() {
            return Ok(());
        }

        info!(count = symbols.len(), "replaying upstream subscriptions");
        for symbol in symbols {
            Self::send_control(&self.codec, writer, &ControlRequest::subscribe(&symbol)).await?;
        }
        Ok(())
    }

    async fn apply_command(
        &self,
        writer: &mut WsWriter,
        command: FeedCommand,
    ) -> Result<(), ConnectorError> {
        let request = match &command {
            FeedCommand::Subscribe(symbol) => {
                debug!(symbol, "subscribing upstream");
                ControlRequest::subscribe(symbol)
            }
            FeedCommand::Unsubscribe(symbol) => {
                debug!(symbol, "unsubscribing upstream");
                ControlRequest::unsubscribe(symbol)
            }
        };
        Self::send_control(&self.codec, writer, &request).await
    }

    async fn send_control(
        codec: &FeedCodec,
        writer: &mut WsWriter,
        request: &ControlRequest,
    ) -> Result<(), ConnectorError> {
        let text = codec.encode(request)?;
        writer
            .send(Message::Text(text.into()))
            .await
            .map_err(ConnectorError::Transport)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delays_follow_error_class() {
        let config = FeedConnectorConfig::new("wss://example", "key");

        assert_eq!(
            ConnectorError::Closed.retry_delay(&config),
            Duration::from_secs(5)
        );
        assert_eq!(
            ConnectorError::AuthRejected("bad key".into()).retry_delay(&config),
            Duration::from_secs(30)
        );
        assert_eq!(
            ConnectorError::Connect(tungstenite::Error::ConnectionClosed).retry_delay(&config),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn config_debug_redacts_the_api_key() {
        let config = FeedConnectorConfig::new("wss://example", "super-secret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("***"));
    }

    #[tokio::test]
    async fn feed_handle_enqueues_commands() {
        let (handle, mut rx) = feed_channel(8);
        handle.subscribe("AAPL").await;
        handle.unsubscribe("AAPL").await;

        assert_eq!(rx.recv().await, Some(FeedCommand::Subscribe("AAPL".into())));
        assert_eq!(
            rx.recv().await,
            Some(FeedCommand::Unsubscribe("AAPL".into()))
        );
    }

    #[tokio::test]
    async fn feed_handle_tolerates_a_dead_connector() {
        let (handle, rx) = feed_channel(1);
        drop(rx);
        // Must not panic or block.
        handle.subscribe("AAPL").await;
    }

    #[test]
    fn feed_state_lifecycle() {
        let state = FeedState::new();
        assert_eq!(state.state(), ConnectionState::Disconnected);
        assert!(state.status().last_connected.is_none());

        state.set_state(ConnectionState::Streaming);
        state.record_retry();
        state.record_retry();
        state.record_message();
        state.record_authenticated();

        let status = state.status();
        assert_eq!(status.state, ConnectionState::Streaming);
        assert_eq!(status.reconnect_attempts, 0);
        assert_eq!(status.messages_received, 1);
        assert!(status.last_connected.is_some());
    }
}
