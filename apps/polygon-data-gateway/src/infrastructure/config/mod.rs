//! Configuration Module
//!
//! Environment-driven settings for the gateway.

mod settings;

pub use settings::{ConfigError, Credentials, FeedSettings, GatewayConfig, ServerSettings};
