//! Polygon REST Client
//!
//! Pull-path adapter implementing [`MarketDataApi`] against the Polygon
//! HTTP API:
//!
//! - `/v2/aggs/ticker/{symbol}/range/1/{timespan}/{from}/{to}`
//! - `/v2/last/nbbo/{symbol}`
//! - `/v2/last/trade/{symbol}`
//! - `/v2/reference/news`
//!
//! A 404 or an empty `results` envelope is an empty result, not an
//! error; any other non-success status is a [`FetchError::Status`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::application::ports::{FetchError, MarketDataApi};
use crate::domain::market::{LastTrade, NewsItem, OhlcvBar, RealTimeQuote};
use crate::infrastructure::polygon::messages::timestamp_from_millis;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Response Envelopes
// =============================================================================

#[derive(Debug, Deserialize)]
struct AggsResponse {
    #[serde(default)]
    results: Vec<AggsResult>,
}

#[derive(Debug, Deserialize)]
struct AggsResult {
    #[serde(rename = "t", default)]
    timestamp_ms: i64,
    #[serde(rename = "o", default)]
    open: Decimal,
    #[serde(rename = "h", default)]
    high: Decimal,
    #[serde(rename = "l", default)]
    low: Decimal,
    #[serde(rename = "c", default)]
    close: Decimal,
    #[serde(rename = "v", default)]
    volume: f64,
    #[serde(rename = "vw")]
    vwap: Option<Decimal>,
    #[serde(rename = "n")]
    transactions: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct LastQuoteResponse {
    #[serde(default)]
    results: Option<LastQuoteResult>,
}

#[derive(Debug, Default, Deserialize)]
struct LastQuoteResult {
    #[serde(rename = "P", default)]
    bid: Decimal,
    #[serde(rename = "p", default)]
    ask: Decimal,
    #[serde(rename = "S", default)]
    bid_size: u64,
    #[serde(rename = "s", default)]
    ask_size: u64,
}

#[derive(Debug, Deserialize)]
struct LastTradeResponse {
    #[serde(default)]
    results: Option<LastTradeResult>,
}

#[derive(Debug, Deserialize)]
struct LastTradeResult {
    #[serde(rename = "t", default)]
    timestamp_ns: i64,
    #[serde(rename = "p", default)]
    price: Decimal,
    #[serde(rename = "s", default)]
    size: u64,
    #[serde(rename = "c", default)]
    conditions: Vec<i64>,
    #[serde(rename = "x", default)]
    exchange: i64,
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    results: Vec<NewsResult>,
}

#[derive(Debug, Deserialize)]
struct NewsResult {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    article_url: String,
    #[serde(default)]
    published_utc: String,
    #[serde(default)]
    tickers: Vec<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

// =============================================================================
// Conversions
// =============================================================================

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn bar_from_result(symbol: &str, result: AggsResult) -> OhlcvBar {
    OhlcvBar {
        symbol: symbol.to_string(),
        timestamp: timestamp_from_millis(result.timestamp_ms),
        open: result.open,
        high: result.high,
        low: result.low,
        close: result.close,
        // The aggregates endpoint reports volume as a float.
        volume: result.volume.max(0.0) as u64,
        vwap: result.vwap,
        transactions: result.transactions,
    }
}

fn trade_from_result(symbol: &str, result: LastTradeResult) -> LastTrade {
    LastTrade {
        symbol: symbol.to_string(),
        price: result.price,
        size: result.size,
        conditions: result.conditions,
        exchange: result.exchange,
        // The last-trade endpoint reports nanoseconds.
        timestamp: timestamp_from_millis(result.timestamp_ns / 1_000_000),
    }
}

fn news_from_result(result: NewsResult) -> NewsItem {
    let published = result
        .published_utc
        .parse::<chrono::DateTime<Utc>>()
        .unwrap_or_default();
    NewsItem {
        id: result.id,
        title: result.title,
        summary: result.description,
        url: result.article_url,
        published,
        symbols: result.tickers,
        keywords: result.keywords,
    }
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for the Polygon pull endpoints.
pub struct PolygonRestClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl PolygonRestClient {
    /// Build a client with the standard request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be
    /// constructed.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, FetchError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .query(query)
            .send()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(url, "upstream returned 404, treating as empty");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|err| FetchError::Decode(err.to_string()))
    }
}

#[async_trait]
impl MarketDataApi for PolygonRestClient {
    async fn last_quote(&self, symbol: &str) -> Result<RealTimeQuote, FetchError> {
        let url = format!("{}/v2/last/nbbo/{symbol}", self.base_url);
        let envelope: Option<LastQuoteResponse> = self.get_json(&url, &[]).await?;
        let result = envelope
            .and_then(|e| e.results)
            .unwrap_or_default();

        Ok(RealTimeQuote {
            symbol: symbol.to_string(),
            bid: result.bid,
            ask: result.ask,
            bid_size: result.bid_size,
            ask_size: result.ask_size,
            // Quote freshness is measured from fetch time.
            timestamp: Utc::now(),
        })
    }

    async fn last_trade(&self, symbol: &str) -> Result<Option<LastTrade>, FetchError> {
        let url = format!("{}/v2/last/trade/{symbol}", self.base_url);
        let envelope: Option<LastTradeResponse> = self.get_json(&url, &[]).await?;
        Ok(envelope
            .and_then(|e| e.results)
            .map(|result| trade_from_result(symbol, result)))
    }

    async fn aggregates(
        &self,
        symbol: &str,
        timespan: &str,
        limit: u32,
    ) -> Result<Vec<OhlcvBar>, FetchError> {
        let end = Utc::now().date_naive();
        // Double the span buffers weekends and holidays.
        let start = end - chrono::Duration::days(i64::from(limit) * 2);
        let url = format!(
            "{}/v2/aggs/ticker/{symbol}/range/1/{timespan}/{}/{}",
            self.base_url,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d"),
        );
        let query = [
            ("adjusted", "true".to_string()),
            ("sort", "asc".to_string()),
            ("limit", limit.to_string()),
        ];

        let envelope: Option<AggsResponse> = self.get_json(&url, &query).await?;
        Ok(envelope
            .map(|e| {
                e.results
                    .into_iter()
                    .map(|result| bar_from_result(symbol, result))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn news(&self, symbol: Option<&str>, limit: u32) -> Result<Vec<NewsItem>, FetchError> {
        let url = format!("{}/v2/reference/news", self.base_url);
        let mut query = vec![("limit", limit.to_string())];
        if let Some(symbol) = symbol {
            query.push(("ticker", symbol.to_string()));
        }

        let envelope: Option<NewsResponse> = self.get_json(&url, &query).await?;
        Ok(envelope
            .map(|e| e.results.into_iter().map(news_from_result).collect())
            .unwrap_or_default())
    }
}

// =============================================================================
// Tests
// =============================================================================
