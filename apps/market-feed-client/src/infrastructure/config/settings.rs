//! Client Configuration Settings
//!
//! Configuration types for the feed client, loaded from environment variables.

use std::time::Duration;

/// Connection and reconnection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    /// Reconnect attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Delay before the first reconnect attempt.
    pub reconnect_interval: Duration,
    /// Cap on a single reconnect delay (`None` = uncapped).
    pub reconnect_delay_max: Option<Duration>,
    /// Jitter fraction applied to reconnect delays.
    pub reconnect_jitter: f64,
    /// Capacity of the lifecycle event broadcast channel.
    pub event_capacity: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            reconnect_interval: Duration::from_millis(1000),
            reconnect_delay_max: Some(Duration::from_secs(60)),
            reconnect_jitter: 0.0,
            event_capacity: 256,
        }
    }
}

/// Result cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Default entry time-to-live.
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
        }
    }
}

/// Rate limiter settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSettings {
    /// Calls admitted per window.
    pub max_requests: usize,
    /// Trailing window length.
    pub window: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }
}

/// Fetch retry settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    /// Retries after a failed load.
    pub max_retries: u32,
    /// Delay before the first retry; doubles per retry.
    pub retry_delay: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Streaming endpoint URI.
    pub endpoint: String,
    /// Channels the binary subscribes to at startup.
    pub channels: Vec<String>,
    /// Prometheus exporter port (0 = no listener).
    pub metrics_port: u16,
    /// Connection settings.
    pub connection: ConnectionSettings,
    /// Cache settings.
    pub cache: CacheSettings,
    /// Rate limiter settings.
    pub rate_limit: RateLimitSettings,
    /// Fetch retry settings.
    pub fetch: FetchSettings,
}

impl ClientConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `FEED_CLIENT_ENDPOINT` is missing, empty, or not a
    /// `ws://`/`wss://` URI.
    pub fn from_env() -> Result<Self, ConfigError> {
        let endpoint = std::env::var("FEED_CLIENT_ENDPOINT")
            .map_err(|_| ConfigError::MissingEnvVar("FEED_CLIENT_ENDPOINT".to_string()))?;

        let endpoint = endpoint.trim().to_string();
        if endpoint.is_empty() {
            return Err(ConfigError::EmptyValue("FEED_CLIENT_ENDPOINT".to_string()));
        }

        if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue {
                key: "FEED_CLIENT_ENDPOINT".to_string(),
                reason: "expected a ws:// or wss:// URI".to_string(),
            });
        }

        let channels = std::env::var("FEED_CLIENT_CHANNELS")
            .map(|s| parse_channels(&s))
            .unwrap_or_default();

        let connection_defaults = ConnectionSettings::default();
        let connection = ConnectionSettings {
            max_reconnect_attempts: parse_env_u32(
                "FEED_CLIENT_MAX_RECONNECT_ATTEMPTS",
                connection_defaults.max_reconnect_attempts,
            ),
            reconnect_interval: parse_env_duration_millis(
                "FEED_CLIENT_RECONNECT_INTERVAL_MS",
                connection_defaults.reconnect_interval,
            ),
            reconnect_delay_max: parse_env_optional_secs(
                "FEED_CLIENT_RECONNECT_DELAY_MAX_SECS",
                connection_defaults.reconnect_delay_max,
            ),
            reconnect_jitter: parse_env_f64(
                "FEED_CLIENT_RECONNECT_JITTER",
                connection_defaults.reconnect_jitter,
            )
            .clamp(0.0, 1.0),
            event_capacity: parse_env_usize(
                "FEED_CLIENT_EVENT_CAPACITY",
                connection_defaults.event_capacity,
            )
            .max(1),
        };

        let cache = CacheSettings {
            ttl: parse_env_duration_secs("FEED_CLIENT_CACHE_TTL_SECS", CacheSettings::default().ttl),
        };

        let rate_limit = RateLimitSettings {
            max_requests: parse_env_usize(
                "FEED_CLIENT_RATE_LIMIT_MAX_REQUESTS",
                RateLimitSettings::default().max_requests,
            ),
            window: parse_env_duration_secs(
                "FEED_CLIENT_RATE_LIMIT_WINDOW_SECS",
                RateLimitSettings::default().window,
            ),
        };

        let fetch = FetchSettings {
            max_retries: parse_env_u32(
                "FEED_CLIENT_FETCH_MAX_RETRIES",
                FetchSettings::default().max_retries,
            ),
            retry_delay: parse_env_duration_millis(
                "FEED_CLIENT_FETCH_RETRY_DELAY_MS",
                FetchSettings::default().retry_delay,
            ),
        };

        Ok(Self {
            endpoint,
            channels,
            metrics_port: parse_env_u16("FEED_CLIENT_METRICS_PORT", 0),
            connection,
            cache,
            rate_limit,
            fetch,
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
    /// Environment variable has an unusable value.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

fn parse_channels(raw: &str) -> Vec<String> {
    let mut channels: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(ToString::to_string)
        .collect();
    channels.dedup();
    channels
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
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

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|v: &f64| v.is_finite())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

/// `0` means no limit.
fn parse_env_optional_secs(key: &str, default: Option<Duration>) -> Option<Duration> {
    match std::env::var(key).ok().and_then(|v| v.parse::<u64>().ok()) {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => default,
    }
}
