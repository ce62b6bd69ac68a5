//! Feed Codec
//!
//! Decodes inbound Polygon frames. The feed sends either a single JSON
//! object or an array of objects; each object carries an `ev`
//! discriminator. Unknown event types and data frames without a symbol
//! are dropped with a log line, never propagated as errors — only
//! structurally invalid JSON fails the decode.

use serde_json::Value;
use tracing::{debug, warn};

use crate::infrastructure::polygon::messages::{
    AggregateEvent, FeedEvent, QuoteEvent, StatusMessage, TradeEvent,
};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// Decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedFrame {
    /// Connection/auth status.
    Status(StatusMessage),
    /// Market data event.
    Event(FeedEvent),
}

/// JSON codec for the Polygon stocks feed.
#[derive(Debug, Default, Clone)]
pub struct FeedCodec;

impl FeedCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame into zero or more [`FeedFrame`]s.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object or array.
    pub fn decode(&self, text: &str) -> Result<Vec<FeedFrame>, CodecError> {
        let trimmed = text.trim();

        if trimmed.starts_with('[') {
            let values: Vec<Value> = serde_json::from_str(trimmed)?;
            let mut frames = Vec::with_capacity(values.len());
            for value in values {
                if let Some(frame) = Self::decode_value(value)? {
                    frames.push(frame);
                }
            }
            Ok(frames)
        } else if trimmed.starts_with('{') {
            let value: Value = serde_json::from_str(trimmed)?;
            Ok(Self::decode_value(value)?.into_iter().collect())
        } else {
            Err(CodecError::InvalidFormat(format!(
                "expected JSON array or object, got: {}...",
                &trimmed[..trimmed.len().min(50)]
            )))
        }
    }

    /// Decode one frame object. Returns `None` for frames the gateway
    /// drops (missing `ev`, missing `sym`, unknown event types).
    fn decode_value(value: Value) -> Result<Option<FeedFrame>, CodecError> {
        let Some(ev) = value.get("ev").and_then(Value::as_str) else {
            debug!("dropping frame without ev discriminator");
            return Ok(None);
        };

        if ev == "status" {
            let status: StatusMessage = serde_json::from_value(value)?;
            return Ok(Some(FeedFrame::Status(status)));
        }

        if value.get("sym").and_then(Value::as_str).is_none() {
            debug!(ev, "dropping data frame without symbol");
            return Ok(None);
        }

        let event = match ev {
            "Q" => match serde_json::from_value::<QuoteEvent>(value) {
                Ok(q) => FeedEvent::Quote(q),
                Err(err) => {
                    warn!(error = %err, "dropping undecodable quote frame");
                    return Ok(None);
                }
            },
            "T" => match serde_json::from_value::<TradeEvent>(value) {
                Ok(t) => FeedEvent::Trade(t),
                Err(err) => {
                    warn!(error = %err, "dropping undecodable trade frame");
                    return Ok(None);
                }
            },
            "A" => match serde_json::from_value::<AggregateEvent>(value) {
                Ok(a) => FeedEvent::Aggregate(a),
                Err(err) => {
                    warn!(error = %err, "dropping undecodable aggregate frame");
                    return Ok(None);
                }
            },
            other => {
                debug!(ev = other, "dropping unrecognized event type");
                return Ok(None);
            }
        };

        Ok(Some(FeedFrame::Event(event)))
    }

    /// Encode a control request to its wire string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode<T: serde::Serialize>(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn decodes_status_array() {
        let codec = FeedCodec::new();
        let frames = codec
            .decode(r#"[{"ev":"status","status":"auth_success","message":"authenticated"}]"#)
            .unwrap();

        assert_eq!(frames.len(), 1);
        match &frames[0] {
            FeedFrame::Status(status) => {
                assert_eq!(status.status, "auth_success");
                assert_eq!(status.message, "authenticated");
            }
            FeedFrame::Event(_) => panic!("expected status frame"),
        }
    }

    #[test]
    fn decodes_mixed_event_array() {
        let codec = FeedCodec::new();
        let frames = codec
            .decode(
                r#"[
                    {"ev":"Q","sym":"AAPL","bp":150.10,"ap":150.20,"bs":3,"as":5,"t":1700000000000},
                    {"ev":"T","sym":"AAPL","p":150.15,"s":100,"t":1700000000100},
                    {"ev":"A","sym":"AAPL","o":150.0,"h":151.0,"l":149.5,"c":150.5,"v":12000,"s":1700000000000}
                ]"#,
            )
            .unwrap();

        assert_eq!(frames.len(), 3);
        assert!(matches!(&frames[0], FeedFrame::Event(FeedEvent::Quote(_))));
        assert!(matches!(&frames[1], FeedFrame::Event(FeedEvent::Trade(_))));
        assert!(matches!(
            &frames[2],
            FeedFrame::Event(FeedEvent::Aggregate(_))
        ));
    }

    #[test]
    fn decodes_single_object() {
        let codec = FeedCodec::new();
        let frames = codec
            .decode(r#"{"ev":"Q","sym":"TSLA","bp":240.00,"ap":240.05}"#)
            .unwrap();

        assert_eq!(frames.len(), 1);
        match &frames[0] {
            FeedFrame::Event(FeedEvent::Quote(quote)) => {
                assert_eq!(quote.symbol, "TSLA");
                assert_eq!(quote.bid_size, 0);
            }
            _ => panic!("expected quote event"),
        }
    }

    #[test]
    fn drops_frames_without_discriminator_or_symbol() {
        let codec = FeedCodec::new();
        let frames = codec
            .decode(
                r#"[
                    {"sym":"AAPL","bp":1.0},
                    {"ev":"Q","bp":1.0},
                    {"ev":"Q","sym":"AAPL","bp":150.10}
                ]"#,
            )
            .unwrap();

        // Only the complete frame survives.
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn drops_unrecognized_event_types() {
        let codec = FeedCodec::new();
        let frames = codec
            .decode(r#"[{"ev":"LULD","sym":"AAPL"},{"ev":"T","sym":"AAPL","p":10.0,"s":1}]"#)
            .unwrap();

        assert_eq!(frames.len(), 1);
        assert!(matches!(&frames[0], FeedFrame::Event(FeedEvent::Trade(_))));
    }

    #[test]
    fn empty_array_decodes_to_nothing() {
        let codec = FeedCodec::new();
        assert!(codec.decode("[]").unwrap().is_empty());
    }

    #[test]
    fn malformed_json_is_an_error() {
        let codec = FeedCodec::new();
        assert!(codec.decode(r#"[{"ev":"Q""#).is_err());
        assert!(codec.decode("pong").is_err());
    }

    #[test]
    fn quote_decimals_survive_decode() {
        let codec = FeedCodec::new();
        let frames = codec
            .decode(r#"{"ev":"Q","sym":"NVDA","bp":495.07,"ap":495.12}"#)
            .unwrap();

        match &frames[0] {
            FeedFrame::Event(FeedEvent::Quote(quote)) => {
                assert_eq!(quote.bid_price, Decimal::new(49_507, 2));
                assert_eq!(quote.ask_price, Decimal::new(49_512, 2));
            }
            _ => panic!("expected quote event"),
        }
    }
}
