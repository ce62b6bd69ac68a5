//! Data Access Orchestrator
//!
//! Coordinates every pull path: rate limiter first, then cache, then the
//! upstream API, then cache fill. Tier policy decides staleness
//! tolerance, TTLs, quotas, and batch limits; the orchestrator itself
//! holds no per-tier state.

use std::sync::Arc;

use chrono::Utc;
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::ports::{FetchError, MarketDataApi};
use crate::domain::market::{LastTrade, NewsItem, OhlcvBar, RealTimeQuote};
use crate::domain::tier::DataTier;
use crate::infrastructure::cache::{
    TieredCache, market_data_key, news_key, quote_key, trade_key,
};
use crate::infrastructure::ratelimit::RateLimiter;

// =============================================================================
// Errors
// =============================================================================

/// Failure of a pull-path request.
#[derive(Debug, Error)]
pub enum DataError {
    /// The tier's per-minute quota is exhausted for this operation.
    #[error("rate limit exceeded")]
    RateLimited,
    /// A batch request named more symbols than the tier allows.
    #[error("batch size {requested} exceeds tier limit {limit}")]
    BatchSizeExceeded {
        /// Symbols in the request.
        requested: usize,
        /// The tier's batch limit.
        limit: usize,
    },
    /// The upstream fetch failed.
    #[error(transparent)]
    Upstream(#[from] FetchError),
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Tier-aware coordinator over limiter, cache, and upstream API.
pub struct DataAccessOrchestrator {
    cache: Arc<TieredCache>,
    limiter: Arc<RateLimiter>,
    api: Arc<dyn MarketDataApi>,
}

impl DataAccessOrchestrator {
    /// Wire the orchestrator over its collaborators.
    pub fn new(
        cache: Arc<TieredCache>,
        limiter: Arc<RateLimiter>,
        api: Arc<dyn MarketDataApi>,
    ) -> Self {
        Self {
            cache,
            limiter,
            api,
        }
    }

    /// Latest quote for a symbol, served from cache while the cached
    /// quote is younger than the tier's staleness tolerance.
    ///
    /// # Errors
    ///
    /// [`DataError::RateLimited`] when the tier quota is exhausted,
    /// [`DataError::Upstream`] when a required upstream fetch fails.
    pub async fn get_quote(
        &self,
        symbol: &str,
        tier: DataTier,
    ) -> Result<RealTimeQuote, DataError> {
        let symbol = symbol.to_ascii_uppercase();
        let cfg = tier.config();

        if !self.limiter.is_allowed(&quote_key(&symbol), tier) {
            return Err(DataError::RateLimited);
        }

        let key = quote_key(&symbol);
        if let Some(cached) = self.cache.get_json::<RealTimeQuote>(&key).await {
            let age = cached.age_seconds(Utc::now());
            if age < cfg.real_time_delay.as_secs() {
                debug!(symbol, age, tier = %tier, "serving cached quote");
                return Ok(cached);
            }
            debug!(symbol, age, tier = %tier, "cached quote too stale for tier");
        }

        let quote = self.api.last_quote(&symbol).await?;
        self.cache
            .set_json(&key, &quote, cfg.real_time_delay)
            .await;
        Ok(quote)
    }

    /// Historical aggregate bars, keyed by `(symbol, timespan, limit)`.
    /// A cached result is a hit regardless of the requesting tier.
    ///
    /// # Errors
    ///
    /// [`DataError::RateLimited`] or [`DataError::Upstream`].
    pub async fn get_historical(
        &self,
        symbol: &str,
        timespan: &str,
        limit: u32,
        tier: DataTier,
    ) -> Result<Vec<OhlcvBar>, DataError> {
        let symbol = symbol.to_ascii_uppercase();
        let cfg = tier.config();

        if !self
            .limiter
            .is_allowed(&format!("market_data:{symbol}"), tier)
        {
            return Err(DataError::RateLimited);
        }

        let key = market_data_key(&symbol, timespan, limit);
        if let Some(cached) = self.cache.get_json::<Vec<OhlcvBar>>(&key).await {
            return Ok(cached);
        }

        let bars = self.api.aggregates(&symbol, timespan, limit).await?;
        self.cache
            .set_json(&key, &bars, cfg.historical_cache_ttl)
            .await;
        Ok(bars)
    }

    /// Most recent trade print, or `None` when the upstream has nothing
    /// for the symbol. Served from cache while the cached trade is
    /// younger than the tier's staleness tolerance, like quotes.
    ///
    /// # Errors
    ///
    /// [`DataError::RateLimited`] or [`DataError::Upstream`].
    pub async fn get_last_trade(
        &self,
        symbol: &str,
        tier: DataTier,
    ) -> Result<Option<LastTrade>, DataError> {
        let symbol = symbol.to_ascii_uppercase();
        let cfg = tier.config();

        if !self.limiter.is_allowed(&trade_key(&symbol), tier) {
            return Err(DataError::RateLimited);
        }

        let key = trade_key(&symbol);
        if let Some(cached) = self.cache.get_json::<LastTrade>(&key).await {
            let age = cached.age_seconds(Utc::now());
            if age < cfg.real_time_delay.as_secs() {
                debug!(symbol, age, tier = %tier, "serving cached trade");
                return Ok(Some(cached));
            }
            debug!(symbol, age, tier = %tier, "cached trade too stale for tier");
        }

        let trade = self.api.last_trade(&symbol).await?;
        if let Some(trade) = &trade {
            self.cache.set_json(&key, trade, cfg.real_time_delay).await;
        }
        Ok(trade)
    }

    /// Recent news, optionally filtered to a symbol, cached per
    /// `(symbol, limit)` with the tier's news TTL.
    ///
    /// # Errors
    ///
    /// [`DataError::RateLimited`] or [`DataError::Upstream`].
    pub async fn get_news(
        &self,
        symbol: Option<&str>,
        limit: u32,
        tier: DataTier,
    ) -> Result<Vec<NewsItem>, DataError> {
        let symbol = symbol.map(str::to_ascii_uppercase);
        let cfg = tier.config();

        if !self.limiter.is_allowed("news", tier) {
            return Err(DataError::RateLimited);
        }

        let key = news_key(symbol.as_deref(), limit);
        if let Some(cached) = self.cache.get_json::<Vec<NewsItem>>(&key).await {
            return Ok(cached);
        }

        let items = self.api.news(symbol.as_deref(), limit).await?;
        self.cache.set_json(&key, &items, cfg.news_cache_ttl).await;
        Ok(items)
    }

    /// Quotes for many symbols at once, resolved concurrently with no
    /// ordering guarantee.
    ///
    /// Individual symbol failures are logged and omitted; a request where
    /// every symbol fails returns an empty `Vec`.
    ///
    /// # Errors
    ///
    /// [`DataError::BatchSizeExceeded`] when the request names more
    /// symbols than the tier allows. The check runs before any per-symbol
    /// work.
    pub async fn get_batch_quotes(
        &self,
        symbols: &[String],
        tier: DataTier,
    ) -> Result<Vec<RealTimeQuote>, DataError> {
        let limit = tier.config().batch_size_limit;
        if symbols.len() > limit {
            return Err(DataError::BatchSizeExceeded {
                requested: symbols.len(),
                limit,
            });
        }

        let mut lookups: FuturesUnordered<_> = symbols
            .iter()
            .map(|symbol| async move { (symbol.as_str(), self.get_quote(symbol, tier).await) })
            .collect();

        let mut quotes = Vec::with_capacity(symbols.len());
        while let Some((symbol, result)) = lookups.next().await {
            match result {
                Ok(quote) => quotes.push(quote),
                Err(err) => warn!(symbol, error = %err, "batch quote lookup failed, omitting"),
            }
        }
        Ok(quotes)
    }
}

// =============================================================================
// Tests
// =============================================================================
