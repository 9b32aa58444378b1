//! Channel Multiplexer
//!
//! Lets many consumers share one [`ConnectionManager`] by channel name.
//!
//! The first handler on a channel puts one `subscribe` frame on the wire and
//! the last handler to leave puts one `unsubscribe` frame on it. While the
//! connection is down, registrations only change local state; every
//! `Connected` event replays a `subscribe` for each channel that still has
//! handlers, since a new socket carries no server-side subscriptions.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use market_feed_client::infrastructure::connection::{ConnectionConfig, ConnectionManager};
//! use market_feed_client::infrastructure::multiplexer::ChannelMultiplexer;
//! use market_feed_client::infrastructure::websocket::WebSocketTransport;
//!
//! # async fn run() {
//! let manager = ConnectionManager::new(
//!     ConnectionConfig::new("wss://feed.example.com/stream"),
//!     Arc::new(WebSocketTransport::new()),
//! );
//! let mux = ChannelMultiplexer::new(manager.clone());
//!
//! let mut quotes = mux.subscribe("quotes:AAPL", |frame| {
//!     println!("{:?}", frame.payload);
//!     Ok(())
//! });
//! manager.connect();
//!
//! // later
//! quotes.unsubscribe();
//! # }
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::application::ports::ConnectionObserver;
use crate::domain::connection::{ConnectionError, ConnectionEvent};
use crate::domain::frame::{Channel, Frame};
use crate::domain::subscription::{ChannelRegistry, HandlerId, Removal};
use crate::infrastructure::connection::ConnectionManager;

pub use crate::domain::subscription::RegistryStats;

/// Callback invoked for every message on a subscribed channel.
///
/// Errors and panics are logged and isolated from other handlers.
pub type MessageHandler = Arc<dyn Fn(&Frame) -> anyhow::Result<()> + Send + Sync>;

// =============================================================================
// Multiplexer
// =============================================================================

/// Routes inbound messages to per-channel handlers. Cheap to clone.
#[derive(Clone)]
pub struct ChannelMultiplexer {
    shared: Arc<MuxShared>,
}

impl std::fmt::Debug for ChannelMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelMultiplexer")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

struct MuxShared {
    manager: ConnectionManager,
    state: Mutex<MuxState>,
}

struct MuxState {
    registry: ChannelRegistry<MessageHandler>,
    /// Whether subscribe frames sent now reach the current connection.
    /// Tracks `Connected` and loss events rather than polling the manager.
    online: bool,
}

impl ChannelMultiplexer {
    /// Attach a multiplexer to `manager`.
    #[must_use]
    pub fn new(manager: ConnectionManager) -> Self {
        let shared = Arc::new(MuxShared {
            manager,
            state: Mutex::new(MuxState {
                registry: ChannelRegistry::new(),
                online: false,
            }),
        });

        let observer: Arc<dyn ConnectionObserver> = shared.clone();
        shared.manager.add_observer(Arc::downgrade(&observer));

        // Read after registering: a Connected emitted from here on reaches
        // the observer, and one emitted before it is reflected in the state.
        {
            let mut state = shared.state.lock();
            state.online = shared.manager.is_open();
        }

        Self { shared }
    }

    /// Register `handler` for `channel`.
    ///
    /// Sends a `subscribe` frame if this is the channel's first handler and
    /// the connection is open; otherwise the subscribe is deferred to the
    /// next `Connected` event.
    pub fn subscribe<F>(&self, channel: impl Into<Channel>, handler: F) -> SubscriptionHandle
    where
        F: Fn(&Frame) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let channel = channel.into();

        let (registration, send_now) = {
            let mut state = self.shared.state.lock();
            let registration = state.registry.add(&channel, Arc::new(handler));
            let send_now = registration.first_for_channel && state.online;
            (registration, send_now)
        };

        tracing::debug!(
            channel = %channel,
            handler_id = registration.id,
            first = registration.first_for_channel,
            "Handler subscribed"
        );

        if send_now {
            self.shared.send_control(&Frame::subscribe(channel.clone()));
        }

        SubscriptionHandle {
            mux: Arc::downgrade(&self.shared),
            channel,
            id: registration.id,
            active: true,
        }
    }

    /// Channels with at least one handler, sorted.
    #[must_use]
    pub fn active_channels(&self) -> Vec<Channel> {
        self.shared.state.lock().registry.active_channels()
    }

    /// Number of handlers registered for `channel`.
    #[must_use]
    pub fn handler_count(&self, channel: &str) -> usize {
        self.shared.state.lock().registry.handler_count(channel)
    }

    /// Channel and handler counts.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        self.shared.state.lock().registry.stats()
    }

    /// The connection this multiplexer is attached to.
    #[must_use]
    pub fn manager(&self) -> &ConnectionManager {
        &self.shared.manager
    }
}

impl MuxShared {
    fn unsubscribe(&self, channel: &str, id: HandlerId) {
        let (removal, send_now) = {
            let mut state = self.state.lock();
            let removal = state.registry.remove(channel, id);
            let send_now = removal == Removal::LastRemoved && state.online;
            (removal, send_now)
        };

        tracing::debug!(channel = %channel, handler_id = id, ?removal, "Handler unsubscribed");

        if send_now {
            self.send_control(&Frame::unsubscribe(channel));
        }
    }

    fn send_control(&self, frame: &Frame) {
        match self.manager.send(frame) {
            Ok(()) => {}
            // Lost the race with a disconnect; the next Connected replays.
            Err(ConnectionError::NotConnected) => {
                tracing::debug!(
                    frame_type = frame.kind.as_str(),
                    channel = %frame.channel,
                    "Control frame skipped: not connected"
                );
            }
            Err(e) => {
                tracing::warn!(
                    frame_type = frame.kind.as_str(),
                    channel = %frame.channel,
                    error = %e,
                    "Failed to send control frame"
                );
            }
        }
    }

    fn resubscribe_all(&self) {
        let channels = {
            let mut state = self.state.lock();
            state.online = true;
            state.registry.active_channels()
        };

        if !channels.is_empty() {
            tracing::info!(count = channels.len(), "Replaying channel subscriptions");
        }

        for channel in channels {
            self.send_control(&Frame::subscribe(channel));
        }
    }

    fn dispatch(&self, frame: &Frame) {
        let handlers = self.state.lock().registry.handlers(&frame.channel);

        if handlers.is_empty() {
            tracing::trace!(channel = %frame.channel, "No handlers for message");
            return;
        }

        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(frame))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(channel = %frame.channel, error = %e, "Message handler failed");
                }
                Err(_) => {
                    tracing::error!(channel = %frame.channel, "Message handler panicked");
                }
            }
        }
    }
}

impl ConnectionObserver for MuxShared {
    fn on_event(&self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => self.resubscribe_all(),
            ConnectionEvent::Disconnected
            | ConnectionEvent::Reconnecting { .. }
            | ConnectionEvent::Error(_) => self.state.lock().online = false,
        }
    }

    fn on_frame(&self, frame: &Frame) {
        if frame.is_message() {
            self.dispatch(frame);
        } else {
            tracing::trace!(
                frame_type = frame.kind.as_str(),
                channel = %frame.channel,
                "Ignoring non-message frame"
            );
        }
    }
}

// =============================================================================
// Subscription Handle
// =============================================================================

/// Capability to remove one handler.
///
/// Dropping the handle keeps the handler registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[derive(Debug)]
#[must_use = "dropping the handle leaves no way to unsubscribe"]
pub struct SubscriptionHandle {
    mux: Weak<MuxShared>,
    channel: Channel,
    id: HandlerId,
    active: bool,
}

impl SubscriptionHandle {
    /// Remove this handler. Later calls are no-ops.
    ///
    /// Sends an `unsubscribe` frame when this was the channel's last handler
    /// and the connection is open.
    pub fn unsubscribe(&mut self) {
        if !std::mem::take(&mut self.active) {
            return;
        }

        if let Some(mux) = self.mux.upgrade() {
            mux.unsubscribe(&self.channel, self.id);
        }
    }

    /// Channel this handle subscribes to.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Whether the handler is still registered through this handle.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }
}
