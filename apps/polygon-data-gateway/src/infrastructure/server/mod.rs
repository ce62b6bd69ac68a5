//! Gateway HTTP + WebSocket Server
//!
//! Downstream surface of the gateway:
//!
//! - `GET  /health` - Gateway health, feed state, cache hit rate
//! - `GET  /api/market-data/{symbol}` - Historical aggregate bars
//! - `GET  /api/quote/{symbol}` - Latest quote
//! - `POST /api/batch-quotes` - Quotes for many symbols
//! - `GET  /api/trade/{symbol}` - Last trade print
//! - `GET  /api/news` - Recent news
//! - `GET  /api/cache/stats` - Cache and limiter statistics
//! - `GET  /ws/{symbol}` - Streaming session (tier-gated)
//!
//! Callers identify their tier with a `tier` query parameter (canonical
//! tier name); unknown or absent tiers resolve to freemium.

mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::context::ServiceContext;
use crate::application::orchestrator::DataError;
use crate::domain::subscription::RegistryStats;
use crate::domain::tier::DataTier;
use crate::infrastructure::cache::CacheStats;
use crate::infrastructure::polygon::auth::ConnectionState;
use crate::infrastructure::polygon::stream::FeedStatus;
use crate::infrastructure::ratelimit::RateLimiterStats;

pub use ws::ChannelSink;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Query parameters common to tier-gated endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct TierParams {
    /// Canonical tier name.
    pub tier: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MarketDataParams {
    timespan: Option<String>,
    limit: Option<u32>,
    tier: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsParams {
    symbol: Option<String>,
    limit: Option<u32>,
    tier: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchQuotesRequest {
    symbols: Vec<String>,
    tier: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: HealthStatus,
    version: String,
    uptime_secs: u64,
    current_time: DateTime<Utc>,
    feed: FeedStatus,
    cache_hit_rate: f64,
    subscriptions: SubscriptionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum HealthStatus {
    /// Feed streaming and pull paths available.
    Healthy,
    /// Pull paths available while the feed reconnects.
    Degraded,
}

#[derive(Debug, Serialize)]
struct SubscriptionStatus {
    symbols: usize,
    sinks: usize,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    cache: CacheStats,
    rate_limiter: LimiterStats,
}

#[derive(Debug, Serialize)]
struct LimiterStats {
    tracked_keys: usize,
    tracked_requests: usize,
}

/// Resolve a tier from an optional query value. Unknown names fall back
/// to freemium.
fn resolve_tier(tier: Option<&str>) -> DataTier {
    tier.map(DataTier::from_name).unwrap_or_default()
}

// =============================================================================
// Error Mapping
// =============================================================================

/// HTTP-facing wrapper for pull-path errors.
#[derive(Debug)]
struct ApiError(DataError);

impl From<DataError> for ApiError {
    fn from(err: DataError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            DataError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, self.0.to_string()),
            DataError::BatchSizeExceeded { .. } => (StatusCode::BAD_REQUEST, self.0.to_string()),
            DataError::Upstream(err) => (StatusCode::BAD_GATEWAY, err.to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

// =============================================================================
// Gateway Server
// =============================================================================

/// Gateway server errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

/// HTTP + WebSocket server for the downstream API.
pub struct GatewayServer {
    port: u16,
    context: Arc<ServiceContext>,
    cancel: CancellationToken,
}

impl GatewayServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, context: Arc<ServiceContext>, cancel: CancellationToken) -> Self {
        Self {
            port,
            context,
            cancel,
        }
    }

    /// Build the router over the service context.
    pub fn router(context: Arc<ServiceContext>) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/api/market-data/{symbol}", get(market_data_handler))
            .route("/api/quote/{symbol}", get(quote_handler))
            .route("/api/batch-quotes", post(batch_quotes_handler))
            .route("/api/trade/{symbol}", get(trade_handler))
            .route("/api/news", get(news_handler))
            .route("/api/cache/stats", get(cache_stats_handler))
            .route("/ws/{symbol}", get(ws::ws_handler))
            .with_state(context)
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `GatewayServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), GatewayServerError> {
        let app = Self::router(self.context);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayServerError::BindFailed(self.port, e.to_string()))?;

        info!(port = self.port, "gateway server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| GatewayServerError::ServerFailed(e.to_string()))?;

        info!("gateway server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(ctx): State<Arc<ServiceContext>>) -> impl IntoResponse {
    let feed = ctx.feed_state.status();
    let status = if feed.state == ConnectionState::Streaming {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };
    let RegistryStats { symbols, sinks } = ctx.registry.stats();

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: ctx.uptime_seconds(),
        current_time: Utc::now(),
        feed,
        cache_hit_rate: ctx.cache.hit_rate(),
        subscriptions: SubscriptionStatus { symbols, sinks },
    })
}

async fn quote_handler(
    State(ctx): State<Arc<ServiceContext>>,
    Path(symbol): Path<String>,
    Query(params): Query<TierParams>,
) -> Result<Json<Value>, ApiError> {
    let tier = resolve_tier(params.tier.as_deref());
    let quote = ctx.orchestrator.get_quote(&symbol, tier).await?;
    Ok(Json(quote.payload()))
}

async fn market_data_handler(
    State(ctx): State<Arc<ServiceContext>>,
    Path(symbol): Path<String>,
    Query(params): Query<MarketDataParams>,
) -> Result<Json<Value>, ApiError> {
    let tier = resolve_tier(params.tier.as_deref());
    let timespan = params.timespan.unwrap_or_else(|| "day".to_string());
    let limit = params.limit.unwrap_or(100);

    let bars = ctx
        .orchestrator
        .get_historical(&symbol, &timespan, limit, tier)
        .await?;
    Ok(Json(json!({
        "symbol": symbol.to_ascii_uppercase(),
        "timespan": timespan,
        "count": bars.len(),
        "results": bars,
    })))
}

async fn batch_quotes_handler(
    State(ctx): State<Arc<ServiceContext>>,
    Json(request): Json<BatchQuotesRequest>,
) -> Result<Json<Value>, ApiError> {
    let tier = resolve_tier(request.tier.as_deref());
    if !ctx.limiter.is_allowed("batch_quotes", tier) {
        return Err(DataError::RateLimited.into());
    }

    let quotes = ctx
        .orchestrator
        .get_batch_quotes(&request.symbols, tier)
        .await?;
    let payloads: Vec<Value> = quotes.iter().map(crate::domain::market::RealTimeQuote::payload).collect();
    Ok(Json(json!({
        "count": payloads.len(),
        "quotes": payloads,
    })))
}

async fn trade_handler(
    State(ctx): State<Arc<ServiceContext>>,
    Path(symbol): Path<String>,
    Query(params): Query<TierParams>,
) -> Result<Response, ApiError> {
    let tier = resolve_tier(params.tier.as_deref());
    let trade = ctx.orchestrator.get_last_trade(&symbol, tier).await?;

    Ok(trade.map_or_else(
        || {
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("no trade data for {}", symbol.to_ascii_uppercase()) })),
            )
                .into_response()
        },
        |trade| Json(trade.payload()).into_response(),
    ))
}

async fn news_handler(
    State(ctx): State<Arc<ServiceContext>>,
    Query(params): Query<NewsParams>,
) -> Result<Json<Value>, ApiError> {
    let tier = resolve_tier(params.tier.as_deref());
    let limit = params.limit.unwrap_or(10);

    let items = ctx
        .orchestrator
        .get_news(params.symbol.as_deref(), limit, tier)
        .await?;
    Ok(Json(json!({
        "count": items.len(),
        "results": items,
    })))
}

async fn cache_stats_handler(State(ctx): State<Arc<ServiceContext>>) -> impl IntoResponse {
    let RateLimiterStats {
        tracked_keys,
        tracked_requests,
    } = ctx.limiter.stats();

    Json(StatsResponse {
        cache: ctx.cache.stats().await,
        rate_limiter: LimiterStats {
            tracked_keys,
            tracked_requests,
        },
    })
}

// =============================================================================
// Tests
// =============================================================================
