//! Connection Lifecycle Types
//!
//! States, events and errors shared by the connection manager and
//! everything observing it.

use std::time::Duration;

// =============================================================================
// State
// =============================================================================

/// Lifecycle state of the streaming connection.
///
/// ```text
/// Idle ──► Connecting ──► Open ──► Closing ──► Closed
///              ▲    │        │
///              │    ▼        ▼
///              └── Reconnecting ──(attempts exhausted)──► Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Never connected.
    #[default]
    Idle,
    /// Opening the transport.
    Connecting,
    /// Transport open; frames may be sent.
    Open,
    /// Waiting out a backoff delay before the next attempt.
    Reconnecting,
    /// Explicit disconnect in progress.
    Closing,
    /// Terminal until the next explicit `connect()`.
    Closed,
}

impl ConnectionState {
    /// Whether `connect()` should be a no-op in this state.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }

    /// Whether frames may be written.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Short lowercase name, used in logs and metrics labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Reconnecting => "reconnecting",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Events
// =============================================================================

/// Lifecycle events emitted by the connection manager.
///
/// `Reconnecting` means a retry is already scheduled; `Error` is terminal and
/// nothing further happens until the caller invokes `connect()` again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Transport opened. Reconnect attempts have been reset.
    Connected,
    /// An open transport went away (remote close, error, or explicit disconnect).
    Disconnected,
    /// A reconnect attempt has been scheduled.
    Reconnecting {
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// Terminal failure.
    Error(ConnectionError),
}

impl ConnectionEvent {
    /// Whether this event ends the connection lifecycle.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Errors surfaced by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// A frame was sent while the connection was not open.
    #[error("connection is not open")]
    NotConnected,

    /// Reconnection gave up.
    #[error("maximum reconnection attempts ({0}) exceeded")]
    MaxReconnectAttemptsExceeded(u32),

    /// A frame could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(String),
}
