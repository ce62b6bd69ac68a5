//! Polygon Upstream Integrations
//!
//! - `messages`: Wire types for the WebSocket feed
//! - `codec`: JSON decode with discriminator dispatch
//! - `auth`: Connection state machine and auth classification
//! - `stream`: Feed connector run-loop with reconnect/backoff
//! - `rest`: REST pull client (quotes, aggregates, trades, news)

/// Wire message types for the WebSocket feed.
pub mod messages;

/// JSON codec for inbound feed frames.
pub mod codec;

/// Connection state machine and auth handling.
pub mod auth;

/// Feed connector run-loop.
pub mod stream;

/// REST pull client.
pub mod rest;
