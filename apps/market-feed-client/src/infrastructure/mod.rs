//! Infrastructure Layer - Adapters and runtime components.
//!
//! Concrete implementations of the application ports plus the stateful
//! components callers drive directly.

/// JSON codec for wire frames.
pub mod codec;

/// Reconnecting connection manager.
pub mod connection;

/// Channel multiplexing over one connection.
pub mod multiplexer;

/// TTL result cache with single-flight loading.
pub mod cache;

/// Per-key sliding-window rate limiter.
pub mod ratelimit;

/// Cache-first fetch with rate limiting and retries.
pub mod fetch;

/// WebSocket transport adapter.
pub mod websocket;

/// Configuration loaded from the environment.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing subscriber and OpenTelemetry integration.
pub mod telemetry;
