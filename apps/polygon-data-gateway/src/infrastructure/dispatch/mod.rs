//! Broadcast Dispatcher
//!
//! Pumps decoded feed events into canonical stream frames and fans them
//! out through the subscription registry. When a broadcast evicts the
//! last sink for a symbol, the dispatcher asks the feed connector to
//! unsubscribe that symbol upstream.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::domain::market::{RealTimeQuote, StreamKind, StreamMessage};
use crate::domain::subscription::SubscriptionRegistry;
use crate::infrastructure::polygon::messages::{
    AggregateEvent, FeedEvent, QuoteEvent, TradeEvent, timestamp_from_millis,
};
use crate::infrastructure::polygon::stream::FeedHandle;

// =============================================================================
// Payload Mapping
// =============================================================================

impl From<QuoteEvent> for RealTimeQuote {
    fn from(event: QuoteEvent) -> Self {
        Self {
            symbol: event.symbol,
            bid: event.bid_price,
            ask: event.ask_price,
            bid_size: event.bid_size,
            ask_size: event.ask_size,
            timestamp: timestamp_from_millis(event.timestamp_ms),
        }
    }
}

fn trade_payload(event: &TradeEvent) -> Value {
    json!({
        "price": event.price,
        "size": event.size,
        "timestamp": timestamp_from_millis(event.timestamp_ms).to_rfc3339(),
        "conditions": event.conditions,
        "exchange": event.exchange,
    })
}

fn aggregate_payload(event: &AggregateEvent) -> Value {
    json!({
        "open": event.open,
        "high": event.high,
        "low": event.low,
        "close": event.close,
        "volume": event.volume,
        "timestamp": timestamp_from_millis(event.start_ms).to_rfc3339(),
    })
}

/// Classify a feed event into the downstream frame shape.
#[must_use]
pub fn classify(event: &FeedEvent) -> StreamMessage {
    match event {
        FeedEvent::Quote(quote) => {
            let canonical: RealTimeQuote = quote.clone().into();
            StreamMessage::new(StreamKind::Quote, quote.symbol.clone(), canonical.payload())
        }
        FeedEvent::Trade(trade) => {
            StreamMessage::new(StreamKind::Trade, trade.symbol.clone(), trade_payload(trade))
        }
        FeedEvent::Aggregate(aggregate) => StreamMessage::new(
            StreamKind::Aggregate,
            aggregate.symbol.clone(),
            aggregate_payload(aggregate),
        ),
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Event pump between the feed connector and the subscription registry.
pub struct BroadcastDispatcher {
    registry: Arc<SubscriptionRegistry>,
    feed: FeedHandle,
}

impl BroadcastDispatcher {
    /// Wire a dispatcher.
    pub fn new(registry: Arc<SubscriptionRegistry>, feed: FeedHandle) -> Self {
        Self { registry, feed }
    }

    /// Pump events until the connector side closes the channel.
    pub async fn run(self, mut events: mpsc::Receiver<FeedEvent>) {
        while let Some(event) = events.recv().await {
            self.dispatch(&event).await;
        }
        info!("broadcast dispatcher stopped");
    }

    /// Fan one event out to its symbol's sinks.
    pub async fn dispatch(&self, event: &FeedEvent) {
        let message = classify(event);
        let outcome = self.registry.broadcast(&message.symbol, &message);

        if outcome.evicted > 0 {
            debug!(
                symbol = %message.symbol,
                evicted = outcome.evicted,
                delivered = outcome.delivered,
                "evicted dead sinks during broadcast"
            );
        }
        if outcome.needs_unsubscribe {
            self.feed.unsubscribe(&message.symbol).await;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
