//! Connection Management
//!
//! A single streaming connection that reconnects with exponential backoff.
//!
//! - [`ReconnectPolicy`]: backoff delays and the attempt budget
//! - [`Lifecycle`]: pure state machine over [`ConnectionState`](crate::domain::connection::ConnectionState)
//! - [`ConnectionManager`]: drives a [`Transport`](crate::application::ports::Transport)
//!   through the lifecycle and fans events out to observers

mod lifecycle;
mod manager;
mod reconnect;

pub use lifecycle::{Lifecycle, Lost, RetryDecision};
pub use manager::{ConnectionConfig, ConnectionManager};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
