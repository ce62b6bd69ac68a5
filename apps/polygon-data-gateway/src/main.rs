//! Polygon Data Gateway Binary
//!
//! Starts the tiered market data gateway.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin polygon-data-gateway
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `POLYGON_API_KEY`: Polygon.io API key
//!
//! ## Optional
//! - `POLYGON_STREAM_URL`: WebSocket feed URL (default: wss://socket.polygon.io/stocks)
//! - `POLYGON_REST_URL`: REST base URL (default: <https://api.polygon.io>)
//! - `GATEWAY_HTTP_PORT`: API + WebSocket port (default: 8000)
//! - `GATEWAY_RECONNECT_DELAY_SECS`: Delay after upstream close (default: 5)
//! - `GATEWAY_ERROR_RETRY_DELAY_SECS`: Delay after auth/transport errors (default: 30)
//! - `GATEWAY_HEARTBEAT_INTERVAL_SECS`: Idle session heartbeat (default: 30)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: polygon-data-gateway)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use polygon_data_gateway::application::context::ServiceContext;
use polygon_data_gateway::application::orchestrator::DataAccessOrchestrator;
use polygon_data_gateway::domain::subscription::SubscriptionRegistry;
use polygon_data_gateway::infrastructure::cache::{MemoryStore, TieredCache};
use polygon_data_gateway::infrastructure::config::GatewayConfig;
use polygon_data_gateway::infrastructure::dispatch::BroadcastDispatcher;
use polygon_data_gateway::infrastructure::polygon::rest::PolygonRestClient;
use polygon_data_gateway::infrastructure::polygon::stream::{
    FeedConnector, FeedConnectorConfig, FeedState, feed_channel,
};
use polygon_data_gateway::infrastructure::ratelimit::RateLimiter;
use polygon_data_gateway::infrastructure::server::GatewayServer;
use polygon_data_gateway::infrastructure::telemetry;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Polygon Data Gateway");

    let config = GatewayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Shared core: cache, limiter, subscription registry
    let cache = Arc::new(TieredCache::new(Arc::new(MemoryStore::new())));
    let limiter = Arc::new(RateLimiter::new());
    let registry = Arc::new(SubscriptionRegistry::new());

    // Upstream feed plumbing
    let (feed_handle, command_rx) = feed_channel(config.feed.command_channel_capacity);
    let (event_tx, event_rx) = mpsc::channel(config.feed.event_channel_capacity);
    let feed_state = Arc::new(FeedState::new());

    let connector_config = FeedConnectorConfig {
        url: config.feed.stream_url.clone(),
        api_key: config.credentials.api_key().to_string(),
        reconnect_delay: config.feed.reconnect_delay,
        error_retry_delay: config.feed.error_retry_delay,
    };
    let connector = FeedConnector::new(
        connector_config,
        Arc::clone(&registry),
        Arc::clone(&feed_state),
        event_tx,
        command_rx,
        shutdown_token.clone(),
    );

    // Pull path: REST client behind the orchestrator
    let rest_client = Arc::new(PolygonRestClient::new(
        config.feed.rest_base_url.clone(),
        config.credentials.api_key().to_string(),
    )?);
    let orchestrator =
        DataAccessOrchestrator::new(Arc::clone(&cache), Arc::clone(&limiter), rest_client);

    let context = Arc::new(ServiceContext::new(
        cache,
        limiter,
        Arc::clone(&registry),
        orchestrator,
        feed_handle.clone(),
        Arc::clone(&feed_state),
        config.server.clone(),
    ));

    // Spawn the dispatcher pumping decoded events to sessions
    let dispatcher = BroadcastDispatcher::new(Arc::clone(&registry), feed_handle);
    tokio::spawn(async move {
        dispatcher.run(event_rx).await;
    });

    // Spawn the upstream feed connector
    tokio::spawn(async move {
        connector.run().await;
    });

    // Spawn the HTTP + WebSocket server
    let server = GatewayServer::new(config.server.http_port, context, shutdown_token.clone());
    tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!(error = %e, "Gateway server error");
        }
    });

    tracing::info!("Gateway ready");

    await_shutdown(shutdown_token).await;

    let dropped = registry.clear();
    if !dropped.is_empty() {
        tracing::info!(symbols = dropped.len(), "Cleared active subscriptions");
    }

    tracing::info!("Gateway stopped");
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &GatewayConfig) {
    tracing::info!(
        http_port = config.server.http_port,
        stream_url = %config.feed.stream_url,
        rest_base_url = %config.feed.rest_base_url,
        "Configuration loaded"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
