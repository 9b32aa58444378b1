//! Frame Codec
//!
//! JSON encoding and decoding of wire frames. Inbound text that does not
//! decode into a [`Frame`] is a malformed frame: callers log and drop it.

use crate::domain::frame::Frame;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload is not a JSON object.
    #[error("invalid frame format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for wire frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one inbound text payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object with a known `type`
    /// and a string `channel`.
    pub fn decode(&self, text: &str) -> Result<Frame, CodecError> {
        let trimmed = text.trim();

        if !trimmed.starts_with('{') {
            let preview: String = trimmed.chars().take(50).collect();
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {preview}..."
            )));
        }

        Ok(serde_json::from_str(trimmed)?)
    }

    /// Encode a frame to JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(&self, frame: &Frame) -> Result<String, CodecError> {
        Ok(serde_json::to_string(frame)?)
    }
}
