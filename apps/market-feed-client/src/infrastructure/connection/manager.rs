//! Connection Manager
//!
//! Owns one streaming connection and recovers it transparently.
//!
//! `connect()` spawns a driver task for the connection's lifetime. The task
//! opens the transport, pumps outbound frames and inbound text, and on loss
//! waits out the backoff delay before opening again. Every state change is a
//! [`Lifecycle`] transition taken under one lock; `disconnect()` takes the
//! same lock to cancel the driver, so a backoff timer that fires afterwards
//! finds the token cancelled and does nothing. The state gauge is written
//! under that lock too, so it always matches the last transition.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use super::lifecycle::{Lifecycle, Lost, RetryDecision};
use super::reconnect::ReconnectConfig;
use crate::application::ports::{ConnectionObserver, Inbound, Transport, TransportSession};
use crate::domain::connection::{ConnectionError, ConnectionEvent, ConnectionState};
use crate::domain::frame::Frame;
use crate::infrastructure::codec::FrameCodec;
use crate::infrastructure::metrics;

/// Default capacity of the lifecycle event broadcast channel.
const DEFAULT_EVENT_CAPACITY: usize = 256;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the connection manager.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Endpoint URI handed to the transport.
    pub endpoint: String,
    /// Reconnection behavior.
    pub reconnect: ReconnectConfig,
    /// Capacity of the lifecycle event broadcast channel.
    pub event_capacity: usize,
}

impl ConnectionConfig {
    /// Create a configuration with default reconnection settings.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            reconnect: ReconnectConfig::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Replace the reconnection settings.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Create configuration from `ConnectionSettings`.
    #[must_use]
    pub fn from_settings(endpoint: impl Into<String>, settings: &crate::ConnectionSettings) -> Self {
        Self {
            endpoint: endpoint.into(),
            reconnect: ReconnectConfig::from_settings(settings),
            event_capacity: settings.event_capacity.max(1),
        }
    }
}

// =============================================================================
// Connection Manager
// =============================================================================

/// Handle to a managed streaming connection. Cheap to clone.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use market_feed_client::domain::frame::Frame;
/// use market_feed_client::infrastructure::connection::{ConnectionConfig, ConnectionManager};
/// use market_feed_client::infrastructure::websocket::WebSocketTransport;
///
/// # async fn run() {
/// let manager = ConnectionManager::new(
///     ConnectionConfig::new("wss://feed.example.com/stream"),
///     Arc::new(WebSocketTransport::new()),
/// );
/// let mut events = manager.subscribe_events();
///
/// manager.connect();
/// while let Ok(event) = events.recv().await {
///     println!("{event:?}");
/// }
/// # }
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.shared.config.endpoint)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a manager in the `Idle` state. Nothing is opened until
    /// [`connect`](Self::connect).
    #[must_use]
    pub fn new(config: ConnectionConfig, transport: Arc<dyn Transport>) -> Self {
        let (events_tx, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    lifecycle: Lifecycle::new(config.reconnect.clone()),
                    outbound: None,
                    driver: None,
                }),
                config,
                transport,
                codec: FrameCodec::new(),
                events_tx,
                observers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Start connecting. No-op while `Connecting` or `Open`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self) {
        let cancel = {
            let mut inner = self.shared.inner.lock();
            if !inner.lifecycle.start() {
                tracing::debug!(state = %inner.lifecycle.state(), "connect ignored: already active");
                return;
            }

            if let Some(previous) = inner.driver.take() {
                previous.cancel();
            }

            let cancel = CancellationToken::new();
            inner.driver = Some(cancel.clone());
            metrics::set_connection_state(ConnectionState::Connecting);
            cancel
        };

        tokio::spawn(drive(Arc::clone(&self.shared), cancel));
    }

    /// Close the transport and stop reconnecting. The state becomes `Closed`.
    pub fn disconnect(&self) {
        let previous = {
            let mut inner = self.shared.inner.lock();
            let previous = inner.lifecycle.begin_close();

            if let Some(driver) = inner.driver.take() {
                driver.cancel();
            }
            inner.outbound = None;
            inner.lifecycle.finish_close();
            metrics::set_connection_state(ConnectionState::Closed);
            previous
        };

        tracing::info!(previous = %previous, "Feed connection closed by client");

        if previous == ConnectionState::Open {
            self.shared.emit(&ConnectionEvent::Disconnected);
        }
    }

    /// Queue a frame for sending.
    ///
    /// Frames are never buffered across disconnects: anything sent while the
    /// connection is not open is rejected, and frames still queued when the
    /// transport drops are lost.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::NotConnected`] unless the state is `Open`,
    /// or [`ConnectionError::Encode`] if the frame cannot be serialized.
    pub fn send(&self, frame: &Frame) -> Result<(), ConnectionError> {
        let text = self
            .shared
            .codec
            .encode(frame)
            .map_err(|e| ConnectionError::Encode(e.to_string()))?;

        {
            let inner = self.shared.inner.lock();
            if !inner.lifecycle.state().is_open() {
                return Err(ConnectionError::NotConnected);
            }
            let Some(outbound) = inner.outbound.as_ref() else {
                return Err(ConnectionError::NotConnected);
            };
            outbound
                .send(text)
                .map_err(|_| ConnectionError::NotConnected)?;
        }

        metrics::record_frame_sent(frame.kind.as_str());
        tracing::trace!(frame_type = frame.kind.as_str(), channel = %frame.channel, "Frame queued");
        Ok(())
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().lifecycle.state()
    }

    /// Reconnect attempts since the last successful open.
    #[must_use]
    pub fn reconnect_attempt(&self) -> u32 {
        self.shared.inner.lock().lifecycle.reconnect_attempt()
    }

    /// Whether frames can currently be sent.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Endpoint this manager connects to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.shared.config.endpoint
    }

    /// Receive lifecycle events. Slow receivers may observe
    /// `RecvError::Lagged`; use an observer when every event matters.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Register an observer for lifecycle events and inbound frames.
    ///
    /// Only a weak reference is kept; dropped observers are pruned.
    pub fn add_observer(&self, observer: Weak<dyn ConnectionObserver>) {
        self.shared.observers.write().push(observer);
    }
}

// =============================================================================
// Shared State
// =============================================================================

struct Shared {
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    codec: FrameCodec,
    inner: Mutex<Inner>,
    events_tx: broadcast::Sender<ConnectionEvent>,
    observers: RwLock<Vec<Weak<dyn ConnectionObserver>>>,
}

struct Inner {
    lifecycle: Lifecycle,
    /// Present only while `Open`.
    outbound: Option<mpsc::UnboundedSender<String>>,
    /// Cancels the current driver task.
    driver: Option<CancellationToken>,
}

/// Why a session's pump loop returned.
enum SessionEnd {
    Cancelled,
    Lost(String),
}

impl Shared {
    /// `Connecting` → `Open`. Returns the outbound queue, or `None` if the
    /// driver was cancelled while the transport was opening.
    fn mark_open(&self, cancel: &CancellationToken) -> Option<mpsc::UnboundedReceiver<String>> {
        let mut inner = self.inner.lock();
        if cancel.is_cancelled() || !inner.lifecycle.opened() {
            return None;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        inner.outbound = Some(tx);
        metrics::set_connection_state(ConnectionState::Open);
        Some(rx)
    }

    /// `Connecting`/`Open` → `Reconnecting` or `Closed`.
    fn mark_lost(&self, cancel: &CancellationToken) -> Option<Lost> {
        let mut inner = self.inner.lock();
        if cancel.is_cancelled() {
            return None;
        }

        inner.outbound = None;
        let lost = inner.lifecycle.lost()?;
        metrics::set_connection_state(inner.lifecycle.state());
        Some(lost)
    }

    /// `Reconnecting` → `Connecting` once the backoff elapsed.
    fn mark_retry_due(&self, cancel: &CancellationToken) -> bool {
        let mut inner = self.inner.lock();
        if cancel.is_cancelled() || !inner.lifecycle.retry_due() {
            return false;
        }
        metrics::set_connection_state(ConnectionState::Connecting);
        true
    }

    fn emit(&self, event: &ConnectionEvent) {
        let _ = self.events_tx.send(event.clone());

        for observer in self.live_observers() {
            observer.on_event(event);
        }
    }

    fn on_message(&self, text: &str) {
        metrics::record_frame_received();

        match self.codec.decode(text) {
            Ok(frame) => {
                for observer in self.live_observers() {
                    observer.on_frame(&frame);
                }
            }
            Err(e) => {
                metrics::record_malformed_frame();
                tracing::warn!(error = %e, "Dropping malformed frame");
            }
        }
    }

    fn live_observers(&self) -> Vec<Arc<dyn ConnectionObserver>> {
        let mut observers = self.observers.write();
        observers.retain(|observer| observer.strong_count() > 0);
        observers.iter().filter_map(Weak::upgrade).collect()
    }

    /// Pump one open session until it ends.
    async fn pump(
        &self,
        session: &mut dyn TransportSession,
        mut outbound: mpsc::UnboundedReceiver<String>,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        loop {
            tokio::select! {
                () = cancel.cancelled() => return SessionEnd::Cancelled,
                Some(text) = outbound.recv() => {
                    if let Err(e) = session.send(text).await {
                        return SessionEnd::Lost(e.to_string());
                    }
                }
                inbound = session.recv() => match inbound {
                    Ok(Inbound::Text(text)) => self.on_message(&text),
                    Ok(Inbound::Closed { code, reason }) => {
                        tracing::info!(?code, reason = %reason, "Feed closed by remote");
                        return SessionEnd::Lost(format!("closed by remote ({reason})"));
                    }
                    Err(e) => return SessionEnd::Lost(e.to_string()),
                },
            }
        }
    }
}

// =============================================================================
// Driver Task
// =============================================================================

/// Run one connection lifetime: open, pump, back off, repeat.
async fn drive(shared: Arc<Shared>, cancel: CancellationToken) {
    loop {
        tracing::info!(endpoint = %shared.config.endpoint, "Connecting to feed");

        let opened = tokio::select! {
            () = cancel.cancelled() => return,
            result = shared.transport.open(&shared.config.endpoint) => result,
        };

        let lost = match opened {
            Ok(mut session) => {
                let Some(outbound) = shared.mark_open(&cancel) else {
                    session.close().await;
                    return;
                };

                tracing::info!("Feed connection open");
                shared.emit(&ConnectionEvent::Connected);

                match shared.pump(session.as_mut(), outbound, &cancel).await {
                    SessionEnd::Cancelled => {
                        session.close().await;
                        return;
                    }
                    SessionEnd::Lost(reason) => {
                        tracing::warn!(reason = %reason, "Feed connection lost");
                        session.close().await;
                    }
                }

                shared.mark_lost(&cancel)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Feed connection attempt failed");
                shared.mark_lost(&cancel)
            }
        };

        let Some(lost) = lost else {
            return;
        };

        if lost.was_open {
            shared.emit(&ConnectionEvent::Disconnected);
        }

        match lost.decision {
            RetryDecision::Retry { attempt, delay } => {
                tracing::info!(
                    attempt,
                    delay_ms = duration_millis(delay),
                    "Reconnecting to feed"
                );
                metrics::record_reconnect();
                shared.emit(&ConnectionEvent::Reconnecting { attempt, delay });

                tokio::select! {
                    () = cancel.cancelled() => {
                        tracing::debug!("Reconnect cancelled during backoff");
                        return;
                    }
                    () = tokio::time::sleep(delay) => {}
                }

                if !shared.mark_retry_due(&cancel) {
                    return;
                }
            }
            RetryDecision::GiveUp { attempts } => {
                tracing::error!(attempts, "Feed reconnection attempts exhausted");
                metrics::record_connection_failure();
                shared.emit(&ConnectionEvent::Error(
                    ConnectionError::MaxReconnectAttemptsExceeded(attempts),
                ));
                return;
            }
        }
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
