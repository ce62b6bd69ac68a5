//! Polygon WebSocket Wire Types
//!
//! Outbound control requests and inbound event frames for the stocks
//! feed. Inbound frames arrive as single objects or arrays, tagged by an
//! `ev` discriminator (`status`, `Q`, `T`, `A`); numeric fields the feed
//! omits default to zero.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Outbound Control Requests
// =============================================================================

/// Control frame sent to the feed (`auth`, `subscribe`, `unsubscribe`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlRequest {
    /// Verb: `auth`, `subscribe`, or `unsubscribe`.
    pub action: &'static str,
    /// API key for auth, `Q.<SYMBOL>` channel otherwise.
    pub params: String,
}

impl ControlRequest {
    /// Authentication request carrying the raw API key.
    #[must_use]
    pub fn auth(api_key: &str) -> Self {
        Self {
            action: "auth",
            params: api_key.to_string(),
        }
    }

    /// Subscribe to a symbol's quote channel.
    #[must_use]
    pub fn subscribe(symbol: &str) -> Self {
        Self {
            action: "subscribe",
            params: format!("Q.{symbol}"),
        }
    }

    /// Unsubscribe from a symbol's quote channel.
    #[must_use]
    pub fn unsubscribe(symbol: &str) -> Self {
        Self {
            action: "unsubscribe",
            params: format!("Q.{symbol}"),
        }
    }
}

// =============================================================================
// Inbound Status Frames
// =============================================================================

/// Connection/auth status frame (`ev: "status"`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusMessage {
    /// Status code: `connected`, `auth_success`, `auth_failed`, ...
    #[serde(default)]
    pub status: String,
    /// Human-readable detail.
    #[serde(default)]
    pub message: String,
}

// =============================================================================
// Inbound Data Events
// =============================================================================

/// NBBO quote event (`ev: "Q"`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuoteEvent {
    /// Ticker symbol.
    #[serde(rename = "sym")]
    pub symbol: String,
    /// Bid price.
    #[serde(rename = "bp", default)]
    pub bid_price: Decimal,
    /// Ask price.
    #[serde(rename = "ap", default)]
    pub ask_price: Decimal,
    /// Bid size.
    #[serde(rename = "bs", default)]
    pub bid_size: u64,
    /// Ask size.
    #[serde(rename = "as", default)]
    pub ask_size: u64,
    /// Quote time, epoch milliseconds.
    #[serde(rename = "t", default)]
    pub timestamp_ms: i64,
}

/// Trade event (`ev: "T"`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TradeEvent {
    /// Ticker symbol.
    #[serde(rename = "sym")]
    pub symbol: String,
    /// Trade price.
    #[serde(rename = "p", default)]
    pub price: Decimal,
    /// Trade size.
    #[serde(rename = "s", default)]
    pub size: u64,
    /// Condition codes.
    #[serde(rename = "c", default)]
    pub conditions: Vec<i64>,
    /// Reporting exchange identifier.
    #[serde(rename = "x", default)]
    pub exchange: i64,
    /// Trade time, epoch milliseconds.
    #[serde(rename = "t", default)]
    pub timestamp_ms: i64,
}

/// Minute aggregate event (`ev: "A"`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AggregateEvent {
    /// Ticker symbol.
    #[serde(rename = "sym")]
    pub symbol: String,
    /// Opening price.
    #[serde(rename = "o", default)]
    pub open: Decimal,
    /// High price.
    #[serde(rename = "h", default)]
    pub high: Decimal,
    /// Low price.
    #[serde(rename = "l", default)]
    pub low: Decimal,
    /// Closing price.
    #[serde(rename = "c", default)]
    pub close: Decimal,
    /// Bar volume.
    #[serde(rename = "v", default)]
    pub volume: u64,
    /// Bar start time, epoch milliseconds.
    #[serde(rename = "s", default)]
    pub start_ms: i64,
}

/// Decoded data event from the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// NBBO quote update.
    Quote(QuoteEvent),
    /// Trade print.
    Trade(TradeEvent),
    /// Minute aggregate bar.
    Aggregate(AggregateEvent),
}

impl FeedEvent {
    /// The event's ticker symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::Quote(q) => &q.symbol,
            Self::Trade(t) => &t.symbol,
            Self::Aggregate(a) => &a.symbol,
        }
    }
}

/// Convert feed epoch milliseconds to UTC. Out-of-range values clamp to
/// the epoch.
#[must_use]
pub fn timestamp_from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_request_wire_shapes() {
        let auth = serde_json::to_string(&ControlRequest::auth("secret-key")).unwrap();
        assert_eq!(auth, r#"{"action":"auth","params":"secret-key"}"#);

        let sub = serde_json::to_string(&ControlRequest::subscribe("AAPL")).unwrap();
        assert_eq!(sub, r#"{"action":"subscribe","params":"Q.AAPL"}"#);

        let unsub = serde_json::to_string(&ControlRequest::unsubscribe("TSLA")).unwrap();
        assert_eq!(unsub, r#"{"action":"unsubscribe","params":"Q.TSLA"}"#);
    }

    #[test]
    fn quote_event_missing_numerics_default_to_zero() {
        let event: QuoteEvent = serde_json::from_str(r#"{"sym":"AAPL","bp":150.1}"#).unwrap();
        assert_eq!(event.symbol, "AAPL");
        assert_eq!(event.ask_price, Decimal::ZERO);
        assert_eq!(event.bid_size, 0);
        assert_eq!(event.timestamp_ms, 0);
    }

    #[test]
    fn trade_event_full_frame() {
        let event: TradeEvent = serde_json::from_str(
            r#"{"ev":"T","sym":"MSFT","p":410.55,"s":200,"c":[14,41],"x":4,"t":1700000000000}"#,
        )
        .unwrap();
        assert_eq!(event.symbol, "MSFT");
        assert_eq!(event.size, 200);
        assert_eq!(event.conditions, vec![14, 41]);
        assert_eq!(event.exchange, 4);
    }

    #[test]
    fn epoch_millis_conversion() {
        let ts = timestamp_from_millis(1_700_000_000_000);
        assert_eq!(ts.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(timestamp_from_millis(i64::MAX), DateTime::UNIX_EPOCH);
    }
}
