#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Market Feed Client - Resilient Data-Access Layer
//!
//! Keeps one streaming connection alive across drops, lets many consumers
//! share it by channel name, and guards request/response traffic with a TTL
//! cache and a per-key rate limiter.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Wire frames, connection states and events, channel registry
//! - **Application**: Ports for transports and connection observers
//! - **Infrastructure**: Connection manager, multiplexer, cache, rate
//!   limiter, fetcher, WebSocket transport, config, metrics, telemetry
//!
//! # Data Flow
//!
//! ```text
//!                  ┌───────────────────┐   frames   ┌────────────────────┐
//!  WebSocket ◄────►│ ConnectionManager │───────────►│ ChannelMultiplexer │──► handlers
//!                  └───────────────────┘   events   └────────────────────┘
//!                           │
//!                           └──► broadcast::Receiver<ConnectionEvent>
//!
//!  CachedFetcher ──► ResultCache (hit) ──► value
//!                └─► RateLimiter ──► loader (retry with backoff)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no I/O.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and runtime components.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::{ConnectionError, ConnectionEvent, ConnectionState};
pub use domain::frame::{Channel, Frame, FrameKind};

// Ports
pub use application::ports::{
    ConnectionObserver, Inbound, Transport, TransportError, TransportSession,
};

// Components
pub use infrastructure::cache::{CacheConfig, ResultCache};
pub use infrastructure::connection::{ConnectionConfig, ConnectionManager, ReconnectConfig};
pub use infrastructure::fetch::{CachedFetcher, FetchConfig, FetchError};
pub use infrastructure::multiplexer::{ChannelMultiplexer, MessageHandler, SubscriptionHandle};
pub use infrastructure::ratelimit::{RateLimitConfig, RateLimiter};
pub use infrastructure::websocket::WebSocketTransport;

// Infrastructure config
pub use infrastructure::config::{
    CacheSettings, ClientConfig, ConfigError, ConnectionSettings, FetchSettings,
    RateLimitSettings,
};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{
    TelemetryConfig, TelemetryError, TelemetryGuard, init as init_telemetry,
};
