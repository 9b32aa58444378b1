//! Application Layer - Port definitions.
//!
//! The contracts that concrete transports and connection observers
//! implement. The connection manager depends only on these.

/// Port interfaces for the streaming transport and lifecycle observers.
pub mod ports;
