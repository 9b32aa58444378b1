//! Port Interfaces
//!
//! Defines the interfaces (ports) the connection manager drives, following
//! the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`Transport`]: opens a bidirectional text stream to an endpoint
//! - [`TransportSession`]: one open stream (send, receive, close)
//!
//! ## Driver Ports (Inbound)
//!
//! - [`ConnectionObserver`]: receives lifecycle events and parsed frames,
//!   in delivery order, on the connection's driver task

use async_trait::async_trait;

use crate::domain::connection::ConnectionEvent;
use crate::domain::frame::Frame;

// =============================================================================
// Transport
// =============================================================================

/// Errors raised by a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The endpoint could not be reached or refused the handshake.
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// Read or write failed on an open stream.
    #[error("transport I/O error: {0}")]
    Io(String),

    /// The stream is already closed.
    #[error("transport closed")]
    Closed,
}

/// Something read from an open session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A text payload.
    Text(String),
    /// The remote side closed the stream.
    Closed {
        /// Close code, when the remote sent one.
        code: Option<u16>,
        /// Close reason, possibly empty.
        reason: String,
    },
}

/// Opens streaming sessions.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a new session to `endpoint`.
    async fn open(&self, endpoint: &str) -> Result<Box<dyn TransportSession>, TransportError>;
}

/// One open bidirectional stream.
///
/// `recv` must be cancel-safe: the connection manager polls it inside
/// `tokio::select!` alongside outbound frames and cancellation.
#[async_trait]
pub trait TransportSession: Send {
    /// Write one text payload.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Wait for the next inbound item.
    async fn recv(&mut self) -> Result<Inbound, TransportError>;

    /// Close the stream. Errors are ignored.
    async fn close(&mut self);
}

// =============================================================================
// Observers
// =============================================================================

/// Receives connection lifecycle events and inbound frames.
///
/// Callbacks run synchronously on the connection's driver task, in the order
/// the transport delivered them. Implementations must not block.
pub trait ConnectionObserver: Send + Sync {
    /// A lifecycle event occurred.
    fn on_event(&self, event: &ConnectionEvent) {
        let _ = event;
    }

    /// A well-formed frame arrived.
    fn on_frame(&self, frame: &Frame) {
        let _ = frame;
    }
}
