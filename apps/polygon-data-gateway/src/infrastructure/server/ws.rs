//! WebSocket Streaming Sessions
//!
//! Each `/ws/{symbol}` connection becomes a session: a bounded outbound
//! queue registered as a sink with the subscription registry, plus a
//! task that pumps queued frames onto the socket. The dispatcher never
//! touches sockets directly; it enqueues through the `Sink` trait and a
//! slow client only loses its own frames.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::application::context::ServiceContext;
use crate::domain::market::{StreamKind, StreamMessage};
use crate::domain::subscription::{Sink, SinkClosed, SinkId, UpstreamChange};
use crate::domain::tier::DataTier;

use super::TierParams;

/// Monotonic sink identifier source.
static NEXT_SINK_ID: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// Channel Sink
// =============================================================================

/// Sink backed by a bounded channel into a session task.
///
/// `try_send` keeps the broadcast path non-blocking: a full queue drops
/// the frame for this client only, and a closed channel reports the
/// sink as dead so the registry evicts it.
pub struct ChannelSink {
    id: SinkId,
    tx: mpsc::Sender<StreamMessage>,
}

impl ChannelSink {
    /// Wrap a session queue as a registry sink.
    #[must_use]
    pub fn new(tx: mpsc::Sender<StreamMessage>) -> Self {
        Self {
            id: NEXT_SINK_ID.fetch_add(1, Ordering::Relaxed),
            tx,
        }
    }
}

impl Sink for ChannelSink {
    fn id(&self) -> SinkId {
        self.id
    }

    fn send(&self, message: &StreamMessage) -> Result<(), SinkClosed> {
        match self.tx.try_send(message.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                debug!(sink_id = self.id, symbol = %message.symbol, "session queue full, dropping frame");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(SinkClosed),
        }
    }
}

// =============================================================================
// Upgrade Handler
// =============================================================================

/// `GET /ws/{symbol}` upgrade handler.
///
/// Tiers without streaming entitlement are refused before the upgrade
/// completes.
pub async fn ws_handler(
    State(ctx): State<Arc<ServiceContext>>,
    Path(symbol): Path<String>,
    Query(params): Query<TierParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let tier = super::resolve_tier(params.tier.as_deref());
    if !tier.config().streaming_enabled {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": format!("tier '{}' does not include streaming access", tier.name()),
            })),
        )
            .into_response();
    }

    let symbol = symbol.to_ascii_uppercase();
    ws.on_upgrade(move |socket| session(socket, ctx, symbol))
}

// =============================================================================
// Session
// =============================================================================

async fn session(socket: WebSocket, ctx: Arc<ServiceContext>, symbol: String) {
    let (queue_tx, mut queue_rx) = mpsc::channel(ctx.server.session_queue_capacity);
    let sink = Arc::new(ChannelSink::new(queue_tx));
    let sink_id = sink.id();

    if ctx.registry.subscribe(&symbol, sink) == UpstreamChange::Subscribe {
        ctx.feed.subscribe(&symbol).await;
    }
    info!(%symbol, sink_id, "streaming session opened");

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Initial snapshot so the client is not silent until the next tick.
    // Served at the top tier: the session itself is already tier-gated.
    match ctx
        .orchestrator
        .get_quote(&symbol, DataTier::InstitutionalElite)
        .await
    {
        Ok(quote) => {
            let snapshot = StreamMessage::new(StreamKind::Quote, &symbol, quote.payload());
            if ws_tx
                .send(Message::Text(snapshot.to_json().into()))
                .await
                .is_err()
            {
                close_session(&ctx, &symbol, sink_id).await;
                return;
            }
        }
        Err(err) => {
            warn!(%symbol, error = %err, "initial quote snapshot unavailable");
        }
    }

    let heartbeat = ctx.server.heartbeat_interval;
    loop {
        tokio::select! {
            frame = queue_rx.recv() => {
                let Some(frame) = frame else { break };
                if ws_tx
                    .send(Message::Text(frame.to_json().into()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            inbound = tokio::time::timeout(heartbeat, ws_rx.next()) => {
                match inbound {
                    // No client traffic within the heartbeat window.
                    Err(_) => {
                        let beat = StreamMessage::heartbeat(&symbol);
                        if ws_tx
                            .send(Message::Text(beat.to_json().into()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(Some(Ok(Message::Text(text)))) => {
                        if text.as_str() == "ping"
                            && ws_tx.send(Message::Text("pong".into())).await.is_err()
                        {
                            break;
                        }
                    }
                    Ok(Some(Ok(Message::Close(_))) | None) => break,
                    Ok(Some(Ok(_))) => {}
                    Ok(Some(Err(err))) => {
                        debug!(%symbol, error = %err, "session socket error");
                        break;
                    }
                }
            }
        }
    }

    close_session(&ctx, &symbol, sink_id).await;
}

async fn close_session(ctx: &ServiceContext, symbol: &str, sink_id: SinkId) {
    if ctx.registry.unsubscribe(symbol, sink_id) == UpstreamChange::Unsubscribe {
        ctx.feed.unsubscribe(symbol).await;
    }
    info!(%symbol, sink_id, "streaming session closed");
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sink_ids_are_unique() {
        let (tx, _rx) = mpsc::channel(1);
        let a = ChannelSink::new(tx.clone());
        let b = ChannelSink::new(tx);
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn full_queue_drops_frame_without_killing_sink() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = ChannelSink::new(tx);
        let frame = StreamMessage::new(StreamKind::Quote, "AAPL", json!({ "bid": "1.00" }));

        sink.send(&frame).expect("first frame fits");
        sink.send(&frame).expect("overflow drops, sink stays live");

        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_queue_reports_dead_sink() {
        let (tx, rx) = mpsc::channel(1);
        let sink = ChannelSink::new(tx);
        drop(rx);

        let frame = StreamMessage::heartbeat("AAPL");
        assert!(sink.send(&frame).is_err());
    }
}
