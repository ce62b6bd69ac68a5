//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following the
//! Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`CacheStore`]: Key-value store with per-entry TTL backing the
//!   tiered cache
//! - [`MarketDataApi`]: Upstream REST API for quotes, aggregates,
//!   trades, and news

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::market::{LastTrade, NewsItem, OhlcvBar, RealTimeQuote};

// =============================================================================
// Cache Store
// =============================================================================

/// Failure inside a cache backend.
///
/// The tiered cache treats every variant as a miss; store errors never
/// propagate to request paths.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backend is unreachable or refused the operation.
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    /// The stored value could not be read back.
    #[error("cache store read failed: {0}")]
    Read(String),
}

/// Key-value store with per-entry expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a live value. Expired entries read as `None`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store a value with a TTL, replacing any existing entry and its
    /// expiry.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    /// Remove an entry if present.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// List live keys matching a glob-style pattern (`*` wildcard).
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, StoreError>;
}

// =============================================================================
// Market Data API
// =============================================================================

/// Failure fetching from the upstream REST API.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Upstream answered with a non-success status.
    #[error("upstream returned status {0}")]
    Status(u16),
    /// The request never completed.
    #[error("upstream transport error: {0}")]
    Transport(String),
    /// The response body did not match the expected shape.
    #[error("upstream response decode error: {0}")]
    Decode(String),
}

/// Upstream pull API for market data.
#[async_trait]
pub trait MarketDataApi: Send + Sync {
    /// Latest NBBO quote for a symbol.
    async fn last_quote(&self, symbol: &str) -> Result<RealTimeQuote, FetchError>;

    /// Most recent trade print, or `None` when the upstream has no data
    /// for the symbol.
    async fn last_trade(&self, symbol: &str) -> Result<Option<LastTrade>, FetchError>;

    /// Aggregate bars for a symbol over the given timespan, newest-last.
    /// Unknown symbols produce an empty list.
    async fn aggregates(
        &self,
        symbol: &str,
        timespan: &str,
        limit: u32,
    ) -> Result<Vec<OhlcvBar>, FetchError>;

    /// Recent news, optionally filtered to a symbol.
    async fn news(&self, symbol: Option<&str>, limit: u32) -> Result<Vec<NewsItem>, FetchError>;
}
