//! Server and client configuration
//!
//! The server reads its settings from `SYNC_*` environment variables:
//!
//! ```bash
//! SYNC_HOST=0.0.0.0
//! SYNC_PORT=3030
//! SYNC_JWT_SECRET=your-super-secret-key-at-least-32-chars   # optional
//! SYNC_HEARTBEAT_INTERVAL_SECS=25
//! SYNC_HEARTBEAT_TIMEOUT_SECS=60
//! ```

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Minimum length of a JWT secret
pub const MIN_SECRET_LEN: usize = 32;

/// Upper bound for heartbeat settings, in seconds
pub const MAX_HEARTBEAT_SECS: u64 = 86_400;

/// Gateway configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// When set, handshake tokens must be HS256 JWTs signed with this secret
    pub jwt_secret: Option<String>,
    /// How often the server pings each connection
    pub heartbeat_interval: Duration,
    /// Connections silent for longer than this are dropped
    pub heartbeat_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3030,
            jwt_secret: None,
            heartbeat_interval: Duration::from_secs(25),
            heartbeat_timeout: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (environment, test map)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("SYNC_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("SYNC_PORT") {
            config.port = parse_value("SYNC_PORT", &port)?;
        }
        if let Some(secs) = lookup("SYNC_HEARTBEAT_INTERVAL_SECS") {
            config.heartbeat_interval =
                Duration::from_secs(parse_value("SYNC_HEARTBEAT_INTERVAL_SECS", &secs)?);
        }
        if let Some(secs) = lookup("SYNC_HEARTBEAT_TIMEOUT_SECS") {
            config.heartbeat_timeout =
                Duration::from_secs(parse_value("SYNC_HEARTBEAT_TIMEOUT_SECS", &secs)?);
        }
        if let Some(secret) = lookup("SYNC_JWT_SECRET").filter(|s| !s.is_empty()) {
            if secret.len() < MIN_SECRET_LEN {
                return Err(ConfigError::SecretTooShort { min: MIN_SECRET_LEN });
            }
            config.jwt_secret = Some(secret);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the heartbeat settings: the interval must be non-zero and the
    /// timeout at least as long as the interval, both within a day.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, value: Duration| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.as_secs().to_string(),
        };
        let max = Duration::from_secs(MAX_HEARTBEAT_SECS);

        if self.heartbeat_interval.is_zero() || self.heartbeat_interval > max {
            return Err(invalid("SYNC_HEARTBEAT_INTERVAL_SECS", self.heartbeat_interval));
        }
        if self.heartbeat_timeout < self.heartbeat_interval || self.heartbeat_timeout > max {
            return Err(invalid("SYNC_HEARTBEAT_TIMEOUT_SECS", self.heartbeat_timeout));
        }
        Ok(())
    }

    /// Socket address string to bind
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Client sync engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Gateway endpoint, e.g. `ws://127.0.0.1:3030/ws`
    pub url: String,
    /// Quiescence window for outbound updates
    pub debounce_window: Duration,
    /// Coalescing window for inbound updates in batched mode
    pub batch_window: Duration,
    /// First reconnection delay, doubled after each failed attempt
    pub reconnect_delay: Duration,
    pub reconnect_delay_max: Duration,
    /// Reconnection attempts before giving up in `Failed`
    pub reconnect_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:3030/ws".to_string(),
            debounce_window: Duration::from_millis(300),
            batch_window: Duration::from_millis(50),
            reconnect_delay: Duration::from_secs(1),
            reconnect_delay_max: Duration::from_secs(5),
            reconnect_attempts: 5,
        }
    }
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    pub fn with_batch_window(mut self, window: Duration) -> Self {
        self.batch_window = window;
        self
    }

    pub fn with_reconnect(mut self, delay: Duration, max: Duration, attempts: u32) -> Self {
        self.reconnect_delay = delay;
        self.reconnect_delay_max = max;
        self.reconnect_attempts = attempts;
        self
    }

    /// Backoff delay before reconnection attempt `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.reconnect_delay
            .saturating_mul(factor)
            .min(self.reconnect_delay_max)
    }
}
