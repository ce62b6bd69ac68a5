//! Gateway Configuration Settings
//!
//! Configuration types for the data gateway, loaded from environment
//! variables.

use std::time::Duration;

/// Polygon API credentials.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(api_key: String) -> Self {
        Self { api_key }
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Upstream feed connection settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// WebSocket feed URL.
    pub stream_url: String,
    /// REST API base URL.
    pub rest_base_url: String,
    /// Delay before retrying after an upstream close.
    pub reconnect_delay: Duration,
    /// Delay before retrying after an auth rejection or other error.
    pub error_retry_delay: Duration,
    /// Capacity of the decoded event channel into the dispatcher.
    pub event_channel_capacity: usize,
    /// Capacity of the subscribe/unsubscribe command channel.
    pub command_channel_capacity: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            stream_url: "wss://socket.polygon.io/stocks".to_string(),
            rest_base_url: "https://api.polygon.io".to_string(),
            reconnect_delay: Duration::from_secs(5),
            error_retry_delay: Duration::from_secs(30),
            event_channel_capacity: 10_000,
            command_channel_capacity: 256,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// API + WebSocket listen port.
    pub http_port: u16,
    /// Idle interval after which streaming sessions receive a heartbeat.
    pub heartbeat_interval: Duration,
    /// Per-session outbound frame queue capacity.
    pub session_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            http_port: 8000,
            heartbeat_interval: Duration::from_secs(30),
            session_queue_capacity: 256,
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// API credentials.
    pub credentials: Credentials,
    /// Upstream feed settings.
    pub feed: FeedSettings,
    /// HTTP server settings.
    pub server: ServerSettings,
}

impl GatewayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing
    /// or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("POLYGON_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("POLYGON_API_KEY".to_string()))?;

        if api_key.is_empty() {
            return Err(ConfigError::EmptyValue("POLYGON_API_KEY".to_string()));
        }

        let feed_defaults = FeedSettings::default();
        let feed = FeedSettings {
            stream_url: parse_env_string("POLYGON_STREAM_URL", &feed_defaults.stream_url),
            rest_base_url: parse_env_string("POLYGON_REST_URL", &feed_defaults.rest_base_url),
            reconnect_delay: parse_env_duration_secs(
                "GATEWAY_RECONNECT_DELAY_SECS",
                feed_defaults.reconnect_delay,
            ),
            error_retry_delay: parse_env_duration_secs(
                "GATEWAY_ERROR_RETRY_DELAY_SECS",
                feed_defaults.error_retry_delay,
            ),
            event_channel_capacity: parse_env_usize(
                "GATEWAY_EVENT_CHANNEL_CAPACITY",
                feed_defaults.event_channel_capacity,
            ),
            command_channel_capacity: parse_env_usize(
                "GATEWAY_COMMAND_CHANNEL_CAPACITY",
                feed_defaults.command_channel_capacity,
            ),
        };

        let server_defaults = ServerSettings::default();
        let server = ServerSettings {
            http_port: parse_env_u16("GATEWAY_HTTP_PORT", server_defaults.http_port),
            heartbeat_interval: parse_env_duration_secs(
                "GATEWAY_HEARTBEAT_INTERVAL_SECS",
                server_defaults.heartbeat_interval,
            ),
            session_queue_capacity: parse_env_usize(
                "GATEWAY_SESSION_QUEUE_CAPACITY",
                server_defaults.session_queue_capacity,
            ),
        };

        Ok(Self {
            credentials: Credentials::new(api_key),
            feed,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_is_redacted() {
        let credentials = Credentials::new("super-secret".to_string());
        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn feed_defaults() {
        let feed = FeedSettings::default();
        assert_eq!(feed.stream_url, "wss://socket.polygon.io/stocks");
        assert_eq!(feed.rest_base_url, "https://api.polygon.io");
        assert_eq!(feed.reconnect_delay, Duration::from_secs(5));
        assert_eq!(feed.error_retry_delay, Duration::from_secs(30));
    }

    #[test]
    fn server_defaults() {
        let server = ServerSettings::default();
        assert_eq!(server.http_port, 8000);
        assert_eq!(server.heartbeat_interval, Duration::from_secs(30));
    }
}
