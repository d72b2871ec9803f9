//! Defaults and serializable configuration shared by every transport.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Reconnect budget used when a consumer does not set one.
pub const DEFAULT_RECONNECT_LIMIT: u32 = 20;

/// Delay between reconnect attempts when a consumer does not set one.
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 5000;

pub const DEFAULT_HEARTBEAT_MESSAGE: &str = "ping";
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 25_000;
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 60_000;

/// Keepalive configuration for a physical connection.
///
/// `message` is sent every `interval_ms`. If nothing arrives from the peer
/// during a `timeout_ms` window the connection is closed. Inbound payloads
/// equal to `return_message` count as liveness but are not delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatOptions {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_message: Option<String>,
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for HeartbeatOptions {
    fn default() -> Self {
        Self {
            message: DEFAULT_HEARTBEAT_MESSAGE.to_string(),
            return_message: None,
            interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            timeout_ms: DEFAULT_HEARTBEAT_TIMEOUT_MS,
        }
    }
}

impl HeartbeatOptions {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_heartbeat_json_falls_back_to_defaults() {
        let options: HeartbeatOptions =
            serde_json::from_str(r#"{"interval_ms": 500, "return_message": "pong"}"#).unwrap();
        assert_eq!(options.interval(), Duration::from_millis(500));
        assert_eq!(options.timeout_ms, DEFAULT_HEARTBEAT_TIMEOUT_MS);
        assert_eq!(options.message, "ping");
        assert_eq!(options.return_message.as_deref(), Some("pong"));
    }
}
