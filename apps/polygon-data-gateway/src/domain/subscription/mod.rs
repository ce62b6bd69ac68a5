//! Subscription Registry
//!
//! Domain types for tracking downstream stream sessions per symbol.
//!
//! # Design
//!
//! The registry tracks, per symbol, the ordered set of live sinks and a
//! single `upstream_subscribed` flag. The flag and the sink set live behind
//! the same lock, so the invariant "upstream-subscribed iff at least one
//! sink" can never be observed broken. Mutations return an
//! [`UpstreamChange`] telling the caller whether the upstream feed needs a
//! subscribe or unsubscribe; the registry itself never touches the socket.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::domain::market::{StreamMessage, Symbol};

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for a downstream sink (one WebSocket session).
pub type SinkId = u64;

/// The sink's receiver is gone; the session should be evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("sink closed")]
pub struct SinkClosed;

/// Downstream delivery endpoint for stream frames.
///
/// `send` must not block: implementations hand the frame to a bounded
/// session queue and report [`SinkClosed`] once the session is gone.
pub trait Sink: Send + Sync {
    /// Stable identifier for this sink.
    fn id(&self) -> SinkId;

    /// Deliver one frame. A full queue drops the frame without error;
    /// a closed session returns [`SinkClosed`].
    fn send(&self, message: &StreamMessage) -> Result<(), SinkClosed>;
}

/// Upstream feed action required after a registry mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamChange {
    /// No upstream action needed.
    None,
    /// First sink joined the symbol; subscribe upstream.
    Subscribe,
    /// Last sink left the symbol; unsubscribe upstream.
    Unsubscribe,
}

/// Result of a broadcast pass over one symbol's sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BroadcastOutcome {
    /// Sinks that accepted the frame.
    pub delivered: usize,
    /// Dead sinks evicted during the pass.
    pub evicted: usize,
    /// The eviction emptied the symbol; unsubscribe upstream.
    pub needs_unsubscribe: bool,
}

/// Registry-wide counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    /// Symbols with at least one sink.
    pub symbols: usize,
    /// Total live sinks across all symbols.
    pub sinks: usize,
}

// =============================================================================
// Per-Symbol State
// =============================================================================

struct SymbolEntry {
    /// Sinks in join order; broadcast iterates in this order.
    sinks: Vec<Arc<dyn Sink>>,
    upstream_subscribed: bool,
}

// =============================================================================
// Subscription Registry
// =============================================================================

/// Thread-safe symbol → sink registry.
///
/// Multiple sessions can watch the same symbol while the gateway holds a
/// single upstream subscription for it. The first join and the last leave
/// are the only mutations that require upstream traffic.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<HashMap<Symbol, SymbolEntry>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a sink to a symbol.
    ///
    /// Returns [`UpstreamChange::Subscribe`] when this is the symbol's
    /// first sink. Re-attaching an already-present sink id is a no-op.
    pub fn subscribe(&self, symbol: &str, sink: Arc<dyn Sink>) -> UpstreamChange {
        let mut entries = self.entries.write();
        let entry = entries.entry(symbol.to_string()).or_insert_with(|| SymbolEntry {
            sinks: Vec::new(),
            upstream_subscribed: false,
        });

        if entry.sinks.iter().any(|s| s.id() == sink.id()) {
            return UpstreamChange::None;
        }

        entry.sinks.push(sink);

        if entry.upstream_subscribed {
            UpstreamChange::None
        } else {
            entry.upstream_subscribed = true;
            UpstreamChange::Subscribe
        }
    }

    /// Detach a sink from a symbol.
    ///
    /// Returns [`UpstreamChange::Unsubscribe`] when this was the symbol's
    /// last sink. Unknown symbols and sink ids are no-ops.
    pub fn unsubscribe(&self, symbol: &str, sink_id: SinkId) -> UpstreamChange {
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(symbol) else {
            return UpstreamChange::None;
        };

        let before = entry.sinks.len();
        entry.sinks.retain(|s| s.id() != sink_id);
        if entry.sinks.len() == before {
            return UpstreamChange::None;
        }

        if entry.sinks.is_empty() {
            entries.remove(symbol);
            UpstreamChange::Unsubscribe
        } else {
            UpstreamChange::None
        }
    }

    /// Deliver a frame to every sink watching a symbol, in join order.
    ///
    /// Sinks that report [`SinkClosed`] are evicted during the same pass.
    /// When eviction empties the symbol, the outcome asks the caller to
    /// unsubscribe upstream.
    pub fn broadcast(&self, symbol: &str, message: &StreamMessage) -> BroadcastOutcome {
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(symbol) else {
            return BroadcastOutcome::default();
        };

        let mut outcome = BroadcastOutcome::default();
        entry.sinks.retain(|sink| match sink.send(message) {
            Ok(()) => {
                outcome.delivered += 1;
                true
            }
            Err(SinkClosed) => {
                outcome.evicted += 1;
                false
            }
        });

        if entry.sinks.is_empty() {
            entries.remove(symbol);
            outcome.needs_unsubscribe = true;
        }

        outcome
    }

    /// Symbols currently holding an upstream subscription. Used to replay
    /// subscriptions after a reconnect.
    #[must_use]
    pub fn active_symbols(&self) -> Vec<Symbol> {
        self.entries.read().keys().cloned().collect()
    }

    /// Whether a symbol has at least one sink.
    #[must_use]
    pub fn is_subscribed(&self, symbol: &str) -> bool {
        self.entries.read().contains_key(symbol)
    }

    /// Registry-wide counts.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let entries = self.entries.read();
        RegistryStats {
            symbols: entries.len(),
            sinks: entries.values().map(|e| e.sinks.len()).sum(),
        }
    }

    /// Drop every sink and symbol. Returns the symbols that were
    /// upstream-subscribed so the caller can unsubscribe them.
    pub fn clear(&self) -> Vec<Symbol> {
        let mut entries = self.entries.write();
        entries.drain().map(|(symbol, _)| symbol).collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::StreamKind;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Records delivered frames; can be flipped dead to simulate a closed
    /// session.
    struct RecordingSink {
        id: SinkId,
        alive: Mutex<bool>,
        received: Mutex<Vec<StreamMessage>>,
    }

    impl RecordingSink {
        fn new(id: SinkId) -> Arc<Self> {
            Arc::new(Self {
                id,
                alive: Mutex::new(true),
                received: Mutex::new(Vec::new()),
            })
        }

        fn kill(&self) {
            *self.alive.lock() = false;
        }

        fn count(&self) -> usize {
            self.received.lock().len()
        }
    }

    impl Sink for RecordingSink {
        fn id(&self) -> SinkId {
            self.id
        }

        fn send(&self, message: &StreamMessage) -> Result<(), SinkClosed> {
            if *self.alive.lock() {
                self.received.lock().push(message.clone());
                Ok(())
            } else {
                Err(SinkClosed)
            }
        }
    }

    fn frame(symbol: &str) -> StreamMessage {
        StreamMessage::new(StreamKind::Quote, symbol, json!({ "bid": "1.00" }))
    }

    #[test]
    fn first_join_requires_upstream_subscribe() {
        let registry = SubscriptionRegistry::new();
        let a = RecordingSink::new(1);
        let b = RecordingSink::new(2);

        assert_eq!(registry.subscribe("AAPL", a), UpstreamChange::Subscribe);
        assert_eq!(registry.subscribe("AAPL", b), UpstreamChange::None);
        assert_eq!(registry.stats().sinks, 2);
    }

    #[test]
    fn duplicate_sink_id_is_ignored() {
        let registry = SubscriptionRegistry::new();
        let sink = RecordingSink::new(7);

        assert_eq!(
            registry.subscribe("AAPL", sink.clone()),
            UpstreamChange::Subscribe
        );
        assert_eq!(registry.subscribe("AAPL", sink), UpstreamChange::None);
        assert_eq!(registry.stats().sinks, 1);
    }

    #[test]
    fn last_leave_requires_upstream_unsubscribe() {
        let registry = SubscriptionRegistry::new();
        let a = RecordingSink::new(1);
        let b = RecordingSink::new(2);
        registry.subscribe("AAPL", a);
        registry.subscribe("AAPL", b);

        assert_eq!(registry.unsubscribe("AAPL", 1), UpstreamChange::None);
        assert_eq!(registry.unsubscribe("AAPL", 2), UpstreamChange::Unsubscribe);
        assert!(!registry.is_subscribed("AAPL"));
    }

    #[test]
    fn unsubscribe_unknown_symbol_or_sink_is_noop() {
        let registry = SubscriptionRegistry::new();
        assert_eq!(registry.unsubscribe("TSLA", 9), UpstreamChange::None);

        registry.subscribe("AAPL", RecordingSink::new(1));
        assert_eq!(registry.unsubscribe("AAPL", 9), UpstreamChange::None);
        assert!(registry.is_subscribed("AAPL"));
    }

    #[test]
    fn broadcast_delivers_in_join_order() {
        let registry = SubscriptionRegistry::new();
        let a = RecordingSink::new(1);
        let b = RecordingSink::new(2);
        registry.subscribe("AAPL", a.clone());
        registry.subscribe("AAPL", b.clone());

        let outcome = registry.broadcast("AAPL", &frame("AAPL"));
        assert_eq!(outcome.delivered, 2);
        assert_eq!(outcome.evicted, 0);
        assert!(!outcome.needs_unsubscribe);
        assert_eq!(a.count(), 1);
        assert_eq!(b.count(), 1);
    }

    #[test]
    fn broadcast_to_unwatched_symbol_is_noop() {
        let registry = SubscriptionRegistry::new();
        let outcome = registry.broadcast("NVDA", &frame("NVDA"));
        assert_eq!(outcome, BroadcastOutcome::default());
    }

    #[test]
    fn dead_sinks_are_evicted_and_survivors_still_receive() {
        let registry = SubscriptionRegistry::new();
        let dead = RecordingSink::new(1);
        let live = RecordingSink::new(2);
        registry.subscribe("AAPL", dead.clone());
        registry.subscribe("AAPL", live.clone());

        dead.kill();
        let outcome = registry.broadcast("AAPL", &frame("AAPL"));
        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.evicted, 1);
        assert!(!outcome.needs_unsubscribe);
        assert_eq!(live.count(), 1);
        assert_eq!(registry.stats().sinks, 1);
    }

    #[test]
    fn eviction_of_last_sink_requests_unsubscribe() {
        let registry = SubscriptionRegistry::new();
        let sink = RecordingSink::new(1);
        registry.subscribe("AAPL", sink.clone());

        sink.kill();
        let outcome = registry.broadcast("AAPL", &frame("AAPL"));
        assert_eq!(outcome.evicted, 1);
        assert!(outcome.needs_unsubscribe);
        assert!(!registry.is_subscribed("AAPL"));

        // Rejoining after eviction is a fresh first join.
        let again = RecordingSink::new(3);
        assert_eq!(registry.subscribe("AAPL", again), UpstreamChange::Subscribe);
    }

    #[test]
    fn clear_returns_subscribed_symbols() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe("AAPL", RecordingSink::new(1));
        registry.subscribe("TSLA", RecordingSink::new(2));

        let mut symbols = registry.clear();
        symbols.sort();
        assert_eq!(symbols, vec!["AAPL".to_string(), "TSLA".to_string()]);
        assert_eq!(registry.stats(), RegistryStats::default());
    }

    #[test]
    fn active_symbols_tracks_membership() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe("AAPL", RecordingSink::new(1));
        registry.subscribe("MSFT", RecordingSink::new(2));
        registry.unsubscribe("AAPL", 1);

        assert_eq!(registry.active_symbols(), vec!["MSFT".to_string()]);
    }
}
