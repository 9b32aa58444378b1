//! Market Feed Client Binary
//!
//! Connects to a streaming endpoint, subscribes to the configured channels,
//! and logs messages and lifecycle events until shutdown.
//!
//! # Usage
//!
//! ```bash
//! FEED_CLIENT_ENDPOINT=wss://feed.example.com/stream \
//! FEED_CLIENT_CHANNELS=quotes:AAPL,news \
//! cargo run --bin market-feed-client
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `FEED_CLIENT_ENDPOINT`: `ws://` or `wss://` URI of the feed
//!
//! ## Optional
//! - `FEED_CLIENT_CHANNELS`: Comma-separated channels to subscribe to
//! - `FEED_CLIENT_MAX_RECONNECT_ATTEMPTS`: Attempts before giving up (default: 5, 0 = unlimited)
//! - `FEED_CLIENT_RECONNECT_INTERVAL_MS`: First reconnect delay (default: 1000)
//! - `FEED_CLIENT_RECONNECT_DELAY_MAX_SECS`: Reconnect delay cap (default: 60, 0 = uncapped)
//! - `FEED_CLIENT_RECONNECT_JITTER`: Jitter fraction (default: 0.0)
//! - `FEED_CLIENT_METRICS_PORT`: Prometheus exporter port (default: 0 = disabled)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;

use market_feed_client::{
    ChannelMultiplexer, ClientConfig, ConnectionConfig, ConnectionEvent, ConnectionManager,
    SubscriptionHandle, WebSocketTransport, init_metrics, init_telemetry,
};
use tokio::signal;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = init_telemetry()?;

    tracing::info!("Starting market feed client");

    let config = ClientConfig::from_env()?;
    log_config(&config);

    let metrics_addr = (config.metrics_port != 0)
        .then(|| SocketAddr::from(([0, 0, 0, 0], config.metrics_port)));
    init_metrics(metrics_addr)?;

    let shutdown_token = CancellationToken::new();

    let manager = ConnectionManager::new(
        ConnectionConfig::from_settings(config.endpoint.clone(), &config.connection),
        Arc::new(WebSocketTransport::new()),
    );
    let mux = ChannelMultiplexer::new(manager.clone());

    let events = manager.subscribe_events();
    tokio::spawn(log_events(events, shutdown_token.clone()));

    let mut handles: Vec<SubscriptionHandle> = config
        .channels
        .iter()
        .map(|channel| {
            mux.subscribe(channel.as_str(), |frame| {
                tracing::info!(channel = %frame.channel, payload = ?frame.payload, "Message");
                Ok(())
            })
        })
        .collect();

    manager.connect();
    tracing::info!(channels = handles.len(), "Feed client ready");

    tokio::select! {
        () = await_shutdown() => {}
        () = shutdown_token.cancelled() => {}
    }
    shutdown_token.cancel();

    for handle in &mut handles {
        handle.unsubscribe();
    }
    manager.disconnect();

    tracing::info!("Feed client stopped");
    Ok(())
}

/// Log lifecycle events; cancel `shutdown` when reconnection gives up.
async fn log_events(mut events: broadcast::Receiver<ConnectionEvent>, shutdown: CancellationToken) {
    loop {
        let event = tokio::select! {
            () = shutdown.cancelled() => return,
            event = events.recv() => event,
        };

        match event {
            Ok(ConnectionEvent::Connected) => tracing::info!("Feed connected"),
            Ok(ConnectionEvent::Disconnected) => tracing::warn!("Feed disconnected"),
            Ok(ConnectionEvent::Reconnecting { attempt, delay }) => {
                tracing::info!(attempt, delay_ms = delay.as_millis(), "Feed reconnecting");
            }
            Ok(ConnectionEvent::Error(e)) => {
                tracing::error!(error = %e, "Feed connection failed permanently");
                shutdown.cancel();
                return;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Lifecycle event listener lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &ClientConfig) {
    tracing::info!(
        endpoint = %config.endpoint,
        channels = ?config.channels,
        max_reconnect_attempts = config.connection.max_reconnect_attempts,
        reconnect_interval_ms = config.connection.reconnect_interval.as_millis(),
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
}

/// Wait for Ctrl+C or SIGTERM.
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
