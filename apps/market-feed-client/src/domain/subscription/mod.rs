//! Channel Subscription Tracking
//!
//! Tracks which handlers are interested in which channels so that many
//! consumers can share one upstream subscription per channel.
//!
//! # Design
//!
//! The registry keeps, per channel, an ordered set of handlers keyed by a
//! monotonically increasing [`HandlerId`]. Iteration order is therefore
//! registration order. A channel entry exists only while it has at least one
//! handler: adding the first handler reports that an upstream subscribe is
//! needed, removing the last one reports that an upstream unsubscribe is
//! needed and deletes the entry.

use std::collections::{BTreeMap, HashMap};

use crate::domain::frame::Channel;

// =============================================================================
// Types
// =============================================================================

/// Identifier of a single registered handler.
pub type HandlerId = u64;

/// Outcome of adding a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    /// Identifier of the new handler.
    pub id: HandlerId,
    /// True when the channel had no handlers before (upstream subscribe needed).
    pub first_for_channel: bool,
}

/// Outcome of removing a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The handler was not registered (already removed, or wrong channel).
    NotFound,
    /// The handler was removed; other handlers remain on the channel.
    Remaining(usize),
    /// The last handler was removed and the channel entry deleted
    /// (upstream unsubscribe needed).
    LastRemoved,
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Channels with at least one handler.
    pub channel_count: usize,
    /// Handlers across all channels.
    pub handler_count: usize,
}

// =============================================================================
// Channel Registry
// =============================================================================

/// Channel → handler-set mapping.
///
/// # Example
///
/// ```rust
/// use market_feed_client::domain::subscription::{ChannelRegistry, Removal};
///
/// let mut registry = ChannelRegistry::new();
///
/// let first = registry.add("quotes:AAPL", "ticker");
/// assert!(first.first_for_channel);
///
/// // A second consumer shares the upstream subscription
/// let second = registry.add("quotes:AAPL", "chart");
/// assert!(!second.first_for_channel);
///
/// assert_eq!(registry.remove("quotes:AAPL", first.id), Removal::Remaining(1));
/// assert_eq!(registry.remove("quotes:AAPL", second.id), Removal::LastRemoved);
/// assert!(registry.active_channels().is_empty());
/// ```
#[derive(Debug)]
pub struct ChannelRegistry<H> {
    channels: HashMap<Channel, BTreeMap<HandlerId, H>>,
    next_id: HandlerId,
}

impl<H> Default for ChannelRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> ChannelRegistry<H> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
            next_id: 0,
        }
    }

    /// Register a handler on a channel.
    pub fn add(&mut self, channel: &str, handler: H) -> Registration {
        self.next_id += 1;
        let id = self.next_id;

        let handlers = self.channels.entry(channel.to_string()).or_default();
        let first_for_channel = handlers.is_empty();
        handlers.insert(id, handler);

        Registration {
            id,
            first_for_channel,
        }
    }

    /// Remove exactly one handler from a channel.
    pub fn remove(&mut self, channel: &str, id: HandlerId) -> Removal {
        let Some(handlers) = self.channels.get_mut(channel) else {
            return Removal::NotFound;
        };

        if handlers.remove(&id).is_none() {
            return Removal::NotFound;
        }

        if handlers.is_empty() {
            self.channels.remove(channel);
            Removal::LastRemoved
        } else {
            Removal::Remaining(handlers.len())
        }
    }

    /// Channels that currently have at least one handler, sorted by name.
    #[must_use]
    pub fn active_channels(&self) -> Vec<Channel> {
        let mut channels: Vec<_> = self.channels.keys().cloned().collect();
        channels.sort_unstable();
        channels
    }

    /// Whether a channel has any handlers.
    #[must_use]
    pub fn contains(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    /// Number of handlers registered on a channel.
    #[must_use]
    pub fn handler_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, BTreeMap::len)
    }

    /// Registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            channel_count: self.channels.len(),
            handler_count: self.channels.values().map(BTreeMap::len).sum(),
        }
    }
}

impl<H: Clone> ChannelRegistry<H> {
    /// Handlers for a channel in registration order.
    #[must_use]
    pub fn handlers(&self, channel: &str) -> Vec<H> {
        self.channels
            .get(channel)
            .map(|handlers| handlers.values().cloned().collect())
            .unwrap_or_default()
    }
}

// =============================================================================
// Tests
// =============================================================================
