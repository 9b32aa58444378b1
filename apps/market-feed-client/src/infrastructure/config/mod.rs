//! Configuration Module
//!
//! Environment-driven configuration for the feed client.

mod settings;

pub use settings::{
    CacheSettings, ClientConfig, ConfigError, ConnectionSettings, FetchSettings,
    RateLimitSettings,
};
