//! Infrastructure Layer - Adapters and external integrations.

/// Tiered cache and in-memory store adapter.
pub mod cache;

/// Sliding-window rate limiter.
pub mod ratelimit;

/// Polygon upstream integrations (WebSocket feed + REST API).
pub mod polygon;

/// Feed event classification and fan-out.
pub mod dispatch;

/// axum HTTP API and downstream WebSocket endpoint.
pub mod server;

/// Environment-driven configuration.
pub mod config;

/// Tracing and OTLP export.
pub mod telemetry;
