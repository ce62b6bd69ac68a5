//! Service Context
//!
//! Owns the wired-together collaborators behind the HTTP/WS surface.
//! Built once in `main` and shared by `Arc`; nothing in the gateway
//! reaches for global state.

use std::sync::Arc;
use std::time::Instant;

use crate::application::orchestrator::DataAccessOrchestrator;
use crate::domain::subscription::SubscriptionRegistry;
use crate::infrastructure::cache::TieredCache;
use crate::infrastructure::config::ServerSettings;
use crate::infrastructure::polygon::stream::{FeedHandle, FeedState};
use crate::infrastructure::ratelimit::RateLimiter;

/// Shared service wiring handed to every request handler.
pub struct ServiceContext {
    /// Tiered TTL cache.
    pub cache: Arc<TieredCache>,
    /// Sliding-window limiter.
    pub limiter: Arc<RateLimiter>,
    /// Symbol → sink registry.
    pub registry: Arc<SubscriptionRegistry>,
    /// Pull-path coordinator.
    pub orchestrator: DataAccessOrchestrator,
    /// Upstream subscription request channel.
    pub feed: FeedHandle,
    /// Feed connection state and counters.
    pub feed_state: Arc<FeedState>,
    /// Server behavior knobs (heartbeat interval, session queues).
    pub server: ServerSettings,
    started_at: Instant,
}

impl ServiceContext {
    /// Assemble the context.
    #[must_use]
    pub fn new(
        cache: Arc<TieredCache>,
        limiter: Arc<RateLimiter>,
        registry: Arc<SubscriptionRegistry>,
        orchestrator: DataAccessOrchestrator,
        feed: FeedHandle,
        feed_state: Arc<FeedState>,
        server: ServerSettings,
    ) -> Self {
        Self {
            cache,
            limiter,
            registry,
            orchestrator,
            feed,
            feed_state,
            server,
            started_at: Instant::now(),
        }
    }

    /// Seconds since the context was built.
    #[must_use]
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
