//! Demo configuration from environment variables.

use std::time::Duration;

/// Settings for the `sockshare-demo` binary.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub url: String,
    pub share: bool,
    pub consumers: usize,
    pub run_for: Duration,
}

impl DemoConfig {
    /// Parse demo settings from environment variables.
    ///
    /// Environment variables:
    /// - `SOCKSHARE_URL`: WebSocket URL to connect to (default: "wss://echo.websocket.org")
    /// - `SOCKSHARE_SHARE`: "true" | "false", share one connection (default: "true")
    /// - `SOCKSHARE_CONSUMERS`: number of consumers to start (default: 3)
    /// - `SOCKSHARE_RUN_SECS`: how long to run before closing (default: 10)
    pub fn from_env() -> anyhow::Result<Self> {
        let url = std::env::var("SOCKSHARE_URL")
            .unwrap_or_else(|_| "wss://echo.websocket.org".to_string());

        let share = std::env::var("SOCKSHARE_SHARE")
            .unwrap_or_else(|_| "true".to_string())
            .to_lowercase();
        let share = !matches!(share.as_str(), "false" | "0" | "no");

        let consumers = match std::env::var("SOCKSHARE_CONSUMERS") {
            Ok(value) => value
                .parse()
                .map_err(|e| anyhow::anyhow!("SOCKSHARE_CONSUMERS must be a number: {}", e))?,
            Err(_) => 3,
        };

        let run_secs = match std::env::var("SOCKSHARE_RUN_SECS") {
            Ok(value) => value
                .parse()
                .map_err(|e| anyhow::anyhow!("SOCKSHARE_RUN_SECS must be a number: {}", e))?,
            Err(_) => 10,
        };

        Ok(Self {
            url,
            share,
            consumers,
            run_for: Duration::from_secs(run_secs),
        })
    }
}
