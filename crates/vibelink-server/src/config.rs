//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;

use vibelink_shared::constants::{DEFAULT_PING_LIMIT, DEFAULT_TOGGLE_LIMIT, REQUEST_TIMEOUT_SECS};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP/WebSocket (axum) server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:5001`
    pub http_addr: SocketAddr,

    /// Human-readable name for this server instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Vibelink Node"`
    pub instance_name: String,

    /// Daily chat-request allowance for free accounts.
    /// Env: `PING_LIMIT`
    /// Default: `5`
    pub ping_limit: u32,

    /// Daily availability-toggle allowance for free accounts.
    /// Env: `TOGGLE_LIMIT`
    /// Default: `3`
    pub toggle_limit: u32,

    /// Seconds a chat request stays pending before the server expires it.
    /// Env: `REQUEST_TIMEOUT_SECS`
    /// Default: `15`
    pub request_timeout_secs: u64,

    /// Whether premium accounts bypass the daily caps.
    /// Env: `PREMIUM_UNLIMITED` (true/false)
    /// Default: `true`
    pub premium_unlimited: bool,

    /// Whether the premium tier is enabled at all (priority requests,
    /// quota bypass). Self-hosted admins can switch it off globally.
    /// Env: `ELITE_ENABLED` (true/false)
    /// Default: `true`
    pub elite_enabled: bool,

    /// Maximum number of concurrently registered sessions (0 = unlimited).
    /// Env: `MAX_SESSIONS`
    /// Default: `0`
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 5001).into(),
            instance_name: "Vibelink Node".to_string(),
            ping_limit: DEFAULT_PING_LIMIT,
            toggle_limit: DEFAULT_TOGGLE_LIMIT,
            request_timeout_secs: REQUEST_TIMEOUT_SECS as u64,
            premium_unlimited: true,
            elite_enabled: true,
            max_sessions: 0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(name) = std::env::var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        if let Ok(val) = std::env::var("PING_LIMIT") {
            if let Ok(n) = val.parse::<u32>() {
                config.ping_limit = n;
            }
        }

        if let Ok(val) = std::env::var("TOGGLE_LIMIT") {
            if let Ok(n) = val.parse::<u32>() {
                config.toggle_limit = n;
            }
        }

        if let Ok(val) = std::env::var("REQUEST_TIMEOUT_SECS") {
            if let Ok(n) = val.parse::<u64>() {
                config.request_timeout_secs = n;
            }
        }

        if let Ok(val) = std::env::var("PREMIUM_UNLIMITED") {
            config.premium_unlimited = val != "false" && val != "0";
        }

        if let Ok(val) = std::env::var("ELITE_ENABLED") {
            config.elite_enabled = val != "false" && val != "0";
        }

        if let Ok(val) = std::env::var("MAX_SESSIONS") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_sessions = n;
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}
