//! Market Data Types - Canonical quote, trade, bar, and news structures.
//!
//! These are the shapes the gateway caches and serves downstream, decoupled
//! from Polygon's wire field names. Prices use [`Decimal`] to avoid float
//! drift in spread and midpoint arithmetic.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Ticker symbol (uppercase by convention, e.g. "AAPL").
pub type Symbol = String;

// =============================================================================
// Real-Time Quote
// =============================================================================

/// Latest NBBO quote for a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealTimeQuote {
    /// Ticker symbol.
    pub symbol: Symbol,
    /// Best bid price.
    pub bid: Decimal,
    /// Best ask price.
    pub ask: Decimal,
    /// Size at the bid.
    pub bid_size: u64,
    /// Size at the ask.
    pub ask_size: u64,
    /// Quote time (UTC).
    pub timestamp: DateTime<Utc>,
}

impl RealTimeQuote {
    /// Bid-ask spread.
    #[must_use]
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    /// Midpoint price.
    #[must_use]
    pub fn midpoint(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// Quote age relative to `now`, in whole seconds. Future-dated quotes
    /// clamp to zero.
    #[must_use]
    pub fn age_seconds(&self, now: DateTime<Utc>) -> u64 {
        (now - self.timestamp).num_seconds().max(0).unsigned_abs()
    }

    /// JSON payload served to clients, including the derived spread and
    /// midpoint fields.
    #[must_use]
    pub fn payload(&self) -> Value {
        json!({
            "symbol": self.symbol,
            "bid": self.bid,
            "ask": self.ask,
            "bid_size": self.bid_size,
            "ask_size": self.ask_size,
            "timestamp": self.timestamp.to_rfc3339(),
            "spread": self.spread(),
            "midpoint": self.midpoint(),
        })
    }
}

// =============================================================================
// Last Trade
// =============================================================================

/// Most recent trade print for a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastTrade {
    /// Ticker symbol.
    pub symbol: Symbol,
    /// Trade price.
    pub price: Decimal,
    /// Trade size.
    pub size: u64,
    /// Trade condition codes.
    pub conditions: Vec<i64>,
    /// Reporting exchange identifier.
    pub exchange: i64,
    /// Trade time (UTC).
    pub timestamp: DateTime<Utc>,
}

impl LastTrade {
    /// Trade age relative to `now`, in whole seconds. Future-dated trades
    /// clamp to zero.
    #[must_use]
    pub fn age_seconds(&self, now: DateTime<Utc>) -> u64 {
        (now - self.timestamp).num_seconds().max(0).unsigned_abs()
    }

    /// JSON payload served to clients.
    #[must_use]
    pub fn payload(&self) -> Value {
        json!({
            "symbol": self.symbol,
            "price": self.price,
            "size": self.size,
            "conditions": self.conditions,
            "exchange": self.exchange,
            "timestamp": self.timestamp.to_rfc3339(),
        })
    }
}

// =============================================================================
// OHLCV Bar
// =============================================================================

/// Aggregated OHLCV bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OhlcvBar {
    /// Ticker symbol.
    pub symbol: Symbol,
    /// Bar start time (UTC).
    pub timestamp: DateTime<Utc>,
    /// Opening price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Closing price.
    pub close: Decimal,
    /// Total volume.
    pub volume: u64,
    /// Volume-weighted average price, when the upstream provides it.
    pub vwap: Option<Decimal>,
    /// Transaction count, when the upstream provides it.
    pub transactions: Option<u64>,
}

// =============================================================================
// News Item
// =============================================================================

/// Published news article with ticker associations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    /// Upstream article identifier.
    pub id: String,
    /// Headline.
    pub title: String,
    /// Short description.
    pub summary: String,
    /// Canonical article URL.
    pub url: String,
    /// Publication time (UTC).
    pub published: DateTime<Utc>,
    /// Tickers the article mentions.
    pub symbols: Vec<Symbol>,
    /// Article keywords.
    pub keywords: Vec<String>,
}

// =============================================================================
// Stream Message
// =============================================================================

/// Downstream stream frame classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// NBBO quote update.
    Quote,
    /// Trade print.
    Trade,
    /// Minute aggregate bar.
    Aggregate,
    /// Keepalive for idle sessions.
    Heartbeat,
}

impl StreamKind {
    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Trade => "trade",
            Self::Aggregate => "aggregate",
            Self::Heartbeat => "heartbeat",
        }
    }
}

/// Canonical frame pushed to downstream WebSocket clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMessage {
    /// Frame classification.
    #[serde(rename = "type")]
    pub kind: StreamKind,
    /// Ticker symbol (empty for heartbeats).
    pub symbol: Symbol,
    /// Event payload.
    pub data: Value,
    /// Gateway-side emission time (UTC).
    pub timestamp: DateTime<Utc>,
}

impl StreamMessage {
    /// Build a frame stamped with the current time.
    #[must_use]
    pub fn new(kind: StreamKind, symbol: impl Into<Symbol>, data: Value) -> Self {
        Self {
            kind,
            symbol: symbol.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    /// Keepalive frame for an idle session.
    #[must_use]
    pub fn heartbeat(symbol: impl Into<Symbol>) -> Self {
        Self::new(StreamKind::Heartbeat, symbol, json!({ "status": "alive" }))
    }

    /// Serialize to the wire representation.
    #[must_use]
    pub fn to_json(&self) -> String {
        json!({
            "type": self.kind.as_str(),
            "symbol": self.symbol,
            "data": self.data,
            "timestamp": self.timestamp.to_rfc3339(),
        })
        .to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn sample_quote() -> RealTimeQuote {
        RealTimeQuote {
            symbol: "AAPL".to_string(),
            bid: dec("150.10"),
            ask: dec("150.20"),
            bid_size: 300,
            ask_size: 500,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn spread_and_midpoint() {
        let quote = sample_quote();
        assert_eq!(quote.spread(), dec("0.10"));
        assert_eq!(quote.midpoint(), dec("150.15"));
    }

    #[test]
    fn quote_payload_includes_derived_fields() {
        let payload = sample_quote().payload();
        assert_eq!(payload["symbol"], "AAPL");
        assert!(payload.get("spread").is_some());
        assert!(payload.get("midpoint").is_some());
        assert!(payload["timestamp"].is_string());
    }

    #[test]
    fn quote_age_clamps_future_timestamps() {
        let now = Utc::now();
        let mut quote = sample_quote();
        quote.timestamp = now - chrono::Duration::seconds(120);
        assert_eq!(quote.age_seconds(now), 120);

        quote.timestamp = now + chrono::Duration::seconds(30);
        assert_eq!(quote.age_seconds(now), 0);
    }

    #[test]
    fn quote_survives_cache_round_trip() {
        let quote = sample_quote();
        let encoded = serde_json::to_string(&quote).unwrap();
        let decoded: RealTimeQuote = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, quote);
    }

    #[test]
    fn stream_message_wire_shape() {
        let msg = StreamMessage::new(
            StreamKind::Quote,
            "MSFT",
            json!({ "bid": "410.05" }),
        );
        let value: Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(value["type"], "quote");
        assert_eq!(value["symbol"], "MSFT");
        assert_eq!(value["data"]["bid"], "410.05");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn heartbeat_frame_shape() {
        let msg = StreamMessage::heartbeat("AAPL");
        let value: Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(value["type"], "heartbeat");
        assert_eq!(value["data"]["status"], "alive");
    }
}
