//! Wire Frame Types
//!
//! Every frame exchanged with the feed server is a JSON object of the shape
//! `{"type": "subscribe" | "unsubscribe" | "message", "channel": "...", "payload": ...}`.
//! The payload is optional and opaque to this crate.

use serde::{Deserialize, Serialize};

/// A channel name (e.g. `quotes:AAPL`, `depth:BTC-USD`).
pub type Channel = String;

/// Frame type discriminator carried in the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    /// Control frame: start streaming a channel.
    Subscribe,
    /// Control frame: stop streaming a channel.
    Unsubscribe,
    /// Data frame delivered on a channel.
    Message,
}

impl FrameKind {
    /// Wire name of the frame type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Message => "message",
        }
    }
}

/// A single wire frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Frame type.
    #[serde(rename = "type")]
    pub kind: FrameKind,
    /// Channel the frame belongs to.
    pub channel: Channel,
    /// Optional opaque payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Frame {
    /// Build a `subscribe` control frame.
    #[must_use]
    pub fn subscribe(channel: impl Into<Channel>) -> Self {
        Self {
            kind: FrameKind::Subscribe,
            channel: channel.into(),
            payload: None,
        }
    }

    /// Build an `unsubscribe` control frame.
    #[must_use]
    pub fn unsubscribe(channel: impl Into<Channel>) -> Self {
        Self {
            kind: FrameKind::Unsubscribe,
            channel: channel.into(),
            payload: None,
        }
    }

    /// Build a data frame.
    #[must_use]
    pub fn message(channel: impl Into<Channel>, payload: serde_json::Value) -> Self {
        Self {
            kind: FrameKind::Message,
            channel: channel.into(),
            payload: Some(payload),
        }
    }

    /// Whether this is a data frame.
    #[must_use]
    pub fn is_message(&self) -> bool {
        self.kind == FrameKind::Message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_frame_omits_payload() {
        let json = serde_json::to_string(&Frame::subscribe("quotes:AAPL")).unwrap();
        assert_eq!(json, r#"{"type":"subscribe","channel":"quotes:AAPL"}"#);
    }

    #[test]
    fn message_frame_keeps_payload() {
        let frame = Frame::message("quotes:AAPL", serde_json::json!({"bid": 150.25}));
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["payload"]["bid"], 150.25);
    }

    #[test]
    fn missing_payload_deserializes_as_none() {
        let frame: Frame =
            serde_json::from_str(r#"{"type":"unsubscribe","channel":"depth"}"#).unwrap();
        assert_eq!(frame.kind, FrameKind::Unsubscribe);
        assert!(frame.payload.is_none());
        assert!(!frame.is_message());
    }

    #[test]
    fn kind_wire_names() {
        assert_eq!(FrameKind::Subscribe.as_str(), "subscribe");
        assert_eq!(FrameKind::Unsubscribe.as_str(), "unsubscribe");
        assert_eq!(FrameKind::Message.as_str(), "message");
    }
}
