//! Domain Layer - Core types with no I/O.
//!
//! Wire frames, connection lifecycle vocabulary, and channel subscription
//! bookkeeping. Nothing here touches sockets, clocks or the runtime.

/// Connection states, lifecycle events and errors.
pub mod connection;

/// Wire frame types.
pub mod frame;

/// Channel → handler-set tracking.
pub mod subscription;
