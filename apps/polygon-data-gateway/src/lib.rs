#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Polygon Data Gateway - Tiered Market Data Distribution
//!
//! A gateway service that maintains a single connection to Polygon's
//! WebSocket feed, multiplexes real-time market data to many downstream
//! clients, and serves REST pull paths (quotes, aggregates, trades, news)
//! through tier-aware caching and rate limiting.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core data types and subscription logic
//!   - `tier`: Subscription tier table and per-tier policy
//!   - `market`: Canonical quote/trade/bar/news types and stream messages
//!   - `subscription`: Symbol → sink registry with upstream change tracking
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Interfaces for the cache store and the upstream data API
//!   - `orchestrator`: Limiter → cache → upstream coordination
//!   - `context`: Shared service wiring
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `polygon`: WebSocket feed connector and REST client
//!   - `dispatch`: Feed event classification and fan-out
//!   - `cache` / `ratelimit`: In-process tiered cache and sliding-window limiter
//!   - `server`: axum HTTP API + downstream WebSocket endpoint
//!   - `config`: Environment-driven configuration
//!   - `telemetry`: Tracing and OTLP export
//!
//! # Data Flow
//!
//! ```text
//! Polygon WS ──► Feed Connector ──► Dispatcher ──► Subscription ──► Client 1..N
//!                                                   Registry
//! Polygon REST ◄── Orchestrator ◄── Rate Limiter ◄── HTTP API ◄── Client
//!                      │
//!                 Tiered Cache
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core data types with no external service dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::market::{
    LastTrade, NewsItem, OhlcvBar, RealTimeQuote, StreamKind, StreamMessage, Symbol,
};
pub use domain::subscription::{
    RegistryStats, Sink, SinkClosed, SinkId, SubscriptionRegistry, UpstreamChange,
};
pub use domain::tier::{DataTier, TierConfig};

// Application
pub use application::context::ServiceContext;
pub use application::orchestrator::{DataAccessOrchestrator, DataError};
pub use application::ports::{CacheStore, FetchError, MarketDataApi, StoreError};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, Credentials, FeedSettings, GatewayConfig, ServerSettings,
};

// Cache and rate limiting (for integration tests)
pub use infrastructure::cache::{CacheStats, MemoryStore, TieredCache};
pub use infrastructure::ratelimit::{RateLimiter, RateLimiterStats};

// Upstream clients (for integration tests)
pub use infrastructure::polygon::rest::PolygonRestClient;
pub use infrastructure::polygon::stream::{
    FeedCommand, FeedConnector, FeedConnectorConfig, FeedHandle, FeedState, feed_channel,
};

// Dispatcher (for integration tests)
pub use infrastructure::dispatch::BroadcastDispatcher;

// HTTP + WS server
pub use infrastructure::server::{GatewayServer, GatewayServerError};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
