//! Feed Authentication
//!
//! Connection lifecycle states and classification of status frames
//! received during and after the auth handshake. The feed accepts a raw
//! API key inside an `auth` control frame and answers with a status
//! frame; anything other than `auth_success` before streaming begins is
//! a rejection.

use serde::Serialize;

use crate::infrastructure::polygon::messages::StatusMessage;

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle of the single upstream feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection; waiting or backing off.
    Disconnected,
    /// TCP/TLS/WebSocket handshake in progress.
    Connecting,
    /// Connected; auth frame sent, response pending.
    Authenticating,
    /// Authenticated; data frames flowing.
    Streaming,
}

impl ConnectionState {
    /// Lowercase name for logs and health output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Streaming => "streaming",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Auth Classification
// =============================================================================

/// What a status frame means for the auth handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSignal {
    /// Socket-level welcome; auth outcome still pending.
    Connected,
    /// Authentication accepted; streaming may begin.
    Success,
    /// Authentication rejected, with the feed's detail message.
    Failure(String),
}

/// Classify a status frame.
#[must_use]
pub fn classify_status(status: &StatusMessage) -> AuthSignal {
    match status.status.as_str() {
        "auth_success" => AuthSignal::Success,
        "connected" => AuthSignal::Connected,
        _ => AuthSignal::Failure(if status.message.is_empty() {
            status.status.clone()
        } else {
            status.message.clone()
        }),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: &str, message: &str) -> StatusMessage {
        StatusMessage {
            status: code.to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn classifies_handshake_frames() {
        assert_eq!(
            classify_status(&status("connected", "Connected Successfully")),
            AuthSignal::Connected
        );
        assert_eq!(
            classify_status(&status("auth_success", "authenticated")),
            AuthSignal::Success
        );
    }

    #[test]
    fn anything_else_is_a_failure() {
        assert_eq!(
            classify_status(&status("auth_failed", "invalid api key")),
            AuthSignal::Failure("invalid api key".to_string())
        );
        assert_eq!(
            classify_status(&status("error", "")),
            AuthSignal::Failure("error".to_string())
        );
    }

    #[test]
    fn state_names() {
        assert_eq!(ConnectionState::Streaming.as_str(), "streaming");
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
    }
}
