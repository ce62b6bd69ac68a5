//! Tiered Cache
//!
//! TTL key-value caching over a pluggable [`CacheStore`] backend, with
//! hit/miss accounting. The cache itself is policy-free: callers supply
//! the TTL (derived from tier config) with every write.
//!
//! # Degradation
//!
//! A failing backend never surfaces to request paths. Reads degrade to
//! misses, writes and deletes to no-ops; the failure is logged and the
//! request continues against the upstream.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::application::ports::{CacheStore, StoreError};

// =============================================================================
// Key Prefixes
// =============================================================================

/// Cache key for a real-time quote.
#[must_use]
pub fn quote_key(symbol: &str) -> String {
    format!("quote:{symbol}")
}

/// Cache key for historical aggregates.
#[must_use]
pub fn market_data_key(symbol: &str, timespan: &str, limit: u32) -> String {
    format!("market_data:{symbol}:{timespan}:{limit}")
}

/// Cache key for a last trade.
#[must_use]
pub fn trade_key(symbol: &str) -> String {
    format!("trade:{symbol}")
}

/// Cache key for news results.
#[must_use]
pub fn news_key(symbol: Option<&str>, limit: u32) -> String {
    format!("news:{}:{limit}", symbol.unwrap_or("all"))
}

// =============================================================================
// Memory Store
// =============================================================================

/// In-process [`CacheStore`] with per-entry expiry.
///
/// Entries are pruned lazily on read and during `scan`.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries (expired entries excluded).
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|(_, expires)| *expires > now)
            .count()
    }

    /// Whether the store holds no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.entries
            .lock()
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, (_, expires)| *expires > now);
        Ok(entries
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect())
    }
}

/// Match a key against a glob pattern supporting `*` wildcards only.
fn glob_match(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return key.is_empty();
    };
    if !key.starts_with(first) {
        return false;
    }

    let mut rest = &key[first.len()..];
    let mut last: Option<&str> = None;
    for part in parts {
        last = Some(part);
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }

    // A trailing literal must sit at the end of the key.
    match last {
        Some(part) if !part.is_empty() => key.ends_with(part),
        Some(_) => true,
        None => rest.is_empty(),
    }
}

// =============================================================================
// Tiered Cache
// =============================================================================

/// Aggregate cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    /// Reads that found a live entry.
    pub hits: u64,
    /// Reads that found nothing (including degraded reads).
    pub misses: u64,
    /// `hits / (hits + misses)`, rounded to 2 decimals; 0.0 with no
    /// traffic.
    pub hit_rate: f64,
    /// Live quote entries.
    pub quote_keys: usize,
    /// Live historical aggregate entries.
    pub market_data_keys: usize,
    /// Live trade entries.
    pub trade_keys: usize,
    /// Live news entries.
    pub news_keys: usize,
}

/// TTL cache with hit/miss accounting and degrade-to-miss semantics.
pub struct TieredCache {
    store: Arc<dyn CacheStore>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TieredCache {
    /// Wrap a backing store.
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Fetch a live value. Expired entries, absent entries, and backend
    /// failures all read as `None` and count as misses.
    pub async fn get(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(Some(value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key, "cache hit");
                Some(value)
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key, "cache miss");
                None
            }
            Err(err) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                warn!(key, error = %err, "cache read degraded to miss");
                None
            }
        }
    }

    /// Store a value with a TTL. Backend failures are logged and
    /// swallowed.
    pub async fn set(&self, key: &str, value: String, ttl: Duration) {
        if let Err(err) = self.store.set(key, value, ttl).await {
            warn!(key, error = %err, "cache write dropped");
        }
    }

    /// Remove an entry. Backend failures are logged and swallowed.
    pub async fn delete(&self, key: &str) {
        if let Err(err) = self.store.delete(key).await {
            warn!(key, error = %err, "cache delete dropped");
        }
    }

    /// Fetch and deserialize a cached value. Undecodable entries read as
    /// misses.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, error = %err, "cached value undecodable, treating as miss");
                None
            }
        }
    }

    /// Serialize and store a value with a TTL.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key, raw, ttl).await,
            Err(err) => warn!(key, error = %err, "cache write skipped, value unserializable"),
        }
    }

    /// Live keys matching a glob-style `*` pattern. Backend failures are
    /// logged and read as no matches.
    pub async fn scan(&self, pattern: &str) -> Vec<String> {
        match self.store.scan(pattern).await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(pattern, error = %err, "cache scan degraded to empty");
                Vec::new()
            }
        }
    }

    /// `hits / (hits + misses)`, rounded to 2 decimals. 0.0 with no
    /// traffic.
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            return 0.0;
        }
        ((hits as f64 / total as f64) * 100.0).round() / 100.0
    }

    /// Aggregate statistics, including per-prefix live key counts.
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            hit_rate: self.hit_rate(),
            quote_keys: self.scan("quote:*").await.len(),
            market_data_keys: self.scan("market_data:*").await.len(),
            trade_keys: self.scan("trade:*").await.len(),
            news_keys: self.scan("news:*").await.len(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    /// Store whose every operation fails, for degradation tests.
    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn scan(&self, _pattern: &str) -> Result<Vec<String>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    fn cache() -> TieredCache {
        TieredCache::new(Arc::new(MemoryStore::new()))
    }

    #[test_case("quote:*", "quote:AAPL", true)]
    #[test_case("quote:*", "trade:AAPL", false)]
    #[test_case("market_data:*:day:*", "market_data:AAPL:day:100", true)]
    #[test_case("market_data:*:day:*", "market_data:AAPL:week:100", false)]
    #[test_case("*", "anything", true)]
    #[test_case("news:all:50", "news:all:50", true)]
    #[test_case("news:all:50", "news:all:500", false; "literal must match whole key")]
    fn glob_patterns(pattern: &str, key: &str, expected: bool) {
        assert_eq!(glob_match(pattern, key), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn get_never_returns_expired_entries() {
        let store = MemoryStore::new();
        store
            .set("quote:AAPL", "v1".into(), Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(store.get("quote:AAPL").await.unwrap(), Some("v1".into()));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("quote:AAPL").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn set_resets_the_expiry_clock() {
        let store = MemoryStore::new();
        store
            .set("k", "v1".into(), Duration::from_secs(10))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(8)).await;
        store
            .set("k", "v2".into(), Duration::from_secs(10))
            .await
            .unwrap();

        // Past the original expiry but within the refreshed one.
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(store.get("k").await.unwrap(), Some("v2".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn scan_excludes_expired_entries() {
        let store = MemoryStore::new();
        store
            .set("quote:AAPL", "a".into(), Duration::from_secs(5))
            .await
            .unwrap();
        store
            .set("quote:TSLA", "b".into(), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(store.scan("quote:*").await.unwrap(), vec!["quote:TSLA"]);
    }

    #[tokio::test]
    async fn hit_rate_rounds_to_two_decimals() {
        let cache = cache();
        assert_eq!(cache.hit_rate(), 0.0);

        cache.set("k", "v".into(), Duration::from_secs(60)).await;
        assert!(cache.get("k").await.is_some());
        assert!(cache.get("k").await.is_some());
        assert!(cache.get("absent").await.is_none());

        // 2 hits / 3 reads.
        assert_eq!(cache.hit_rate(), 0.67);
    }

    #[tokio::test]
    async fn scan_returns_matching_live_keys() {
        let cache = cache();
        let ttl = Duration::from_secs(60);
        cache.set(&quote_key("AAPL"), "q".into(), ttl).await;
        cache.set(&quote_key("TSLA"), "q".into(), ttl).await;
        cache.set(&trade_key("AAPL"), "t".into(), ttl).await;

        let mut keys = cache.scan("quote:*").await;
        keys.sort();
        assert_eq!(keys, vec!["quote:AAPL", "quote:TSLA"]);
        assert!(cache.scan("news:*").await.is_empty());
    }

    #[tokio::test]
    async fn broken_store_degrades_to_always_miss() {
        let cache = TieredCache::new(Arc::new(BrokenStore));

        cache.set("k", "v".into(), Duration::from_secs(60)).await;
        assert!(cache.get("k").await.is_none());
        cache.delete("k").await;
        assert!(cache.scan("quote:*").await.is_empty());

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.quote_keys, 0);
    }

    #[tokio::test]
    async fn undecodable_cached_value_reads_as_miss() {
        let cache = cache();
        cache
            .set("quote:AAPL", "not json".into(), Duration::from_secs(60))
            .await;

        let decoded: Option<crate::domain::market::RealTimeQuote> =
            cache.get_json("quote:AAPL").await;
        assert!(decoded.is_none());
    }

    #[tokio::test]
    async fn stats_counts_keys_per_prefix() {
        let cache = cache();
        let ttl = Duration::from_secs(60);
        cache.set(&quote_key("AAPL"), "q".into(), ttl).await;
        cache.set(&quote_key("TSLA"), "q".into(), ttl).await;
        cache
            .set(&market_data_key("AAPL", "day", 100), "m".into(), ttl)
            .await;
        cache.set(&news_key(None, 10), "n".into(), ttl).await;

        let stats = cache.stats().await;
        assert_eq!(stats.quote_keys, 2);
        assert_eq!(stats.market_data_keys, 1);
        assert_eq!(stats.trade_keys, 0);
        assert_eq!(stats.news_keys, 1);
    }
}
