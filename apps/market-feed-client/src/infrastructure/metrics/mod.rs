//! Prometheus Metrics Module
//!
//! Records client-side metrics through the `metrics` facade. Recording is a
//! no-op until a recorder is installed with [`init_metrics`], so library
//! users and tests pay nothing.
//!
//! # Metrics Categories
//!
//! - **Frames**: inbound, malformed, and outbound frame counts
//! - **Connection**: lifecycle state, reconnect attempts, terminal failures
//! - **Cache**: hits and misses
//! - **Fetch**: rate-limited calls and loader failures

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::domain::connection::ConnectionState;

/// Install the Prometheus recorder.
///
/// With `listen` set, an HTTP listener serves `/metrics` on that address.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the listener
/// cannot be bound.
pub fn init_metrics(listen: Option<SocketAddr>) -> Result<(), BuildError> {
    let builder = PrometheusBuilder::new();

    match listen {
        Some(addr) => builder.with_http_listener(addr).install()?,
        None => {
            builder.install_recorder()?;
        }
    }

    register_metrics();
    Ok(())
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "feed_client_frames_received_total",
        "Total text frames received from the feed"
    );
    describe_counter!(
        "feed_client_frames_malformed_total",
        "Total inbound frames dropped because they could not be decoded"
    );
    describe_counter!(
        "feed_client_frames_sent_total",
        "Total frames queued to the feed by type"
    );

    describe_gauge!(
        "feed_client_connection_state",
        "Current connection state (0=idle 1=connecting 2=open 3=reconnecting 4=closing 5=closed)"
    );
    describe_counter!(
        "feed_client_reconnects_total",
        "Total reconnection attempts scheduled"
    );
    describe_counter!(
        "feed_client_connection_failures_total",
        "Total terminal connection failures (reconnect attempts exhausted)"
    );

    describe_counter!(
        "feed_client_cache_lookups_total",
        "Result cache lookups by outcome"
    );
    describe_counter!(
        "feed_client_rate_limited_total",
        "Outbound calls rejected by the rate limiter"
    );
    describe_counter!(
        "feed_client_loader_failures_total",
        "Loader calls that returned an error"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

const fn state_code(state: ConnectionState) -> f64 {
    match state {
        ConnectionState::Idle => 0.0,
        ConnectionState::Connecting => 1.0,
        ConnectionState::Open => 2.0,
        ConnectionState::Reconnecting => 3.0,
        ConnectionState::Closing => 4.0,
        ConnectionState::Closed => 5.0,
    }
}

/// Record an inbound text frame.
pub fn record_frame_received() {
    counter!("feed_client_frames_received_total").increment(1);
}

/// Record an inbound frame dropped as malformed.
pub fn record_malformed_frame() {
    counter!("feed_client_frames_malformed_total").increment(1);
}

/// Record an outbound frame.
pub fn record_frame_sent(frame_type: &'static str) {
    counter!("feed_client_frames_sent_total", "frame_type" => frame_type).increment(1);
}

/// Update the connection state gauge.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("feed_client_connection_state").set(state_code(state));
}

/// Record a scheduled reconnection attempt.
pub fn record_reconnect() {
    counter!("feed_client_reconnects_total").increment(1);
}

/// Record a terminal connection failure.
pub fn record_connection_failure() {
    counter!("feed_client_connection_failures_total").increment(1);
}

/// Record a cache lookup.
pub fn record_cache_lookup(hit: bool) {
    let outcome = if hit { "hit" } else { "miss" };
    counter!("feed_client_cache_lookups_total", "outcome" => outcome).increment(1);
}

/// Record a call rejected by the rate limiter.
pub fn record_rate_limited() {
    counter!("feed_client_rate_limited_total").increment(1);
}

/// Record a failed loader call.
pub fn record_loader_failure() {
    counter!("feed_client_loader_failures_total").increment(1);
}

// =============================================================================
// Tests
// =============================================================================
