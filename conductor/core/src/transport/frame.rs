//! Frame Protocol
//!
//! Wire format for Conductor-surface messages over WebSocket: one JSON object
//! per text frame, with the variant named by its `type` field.
//!
//! ```text
//! surface  ──  {"type":"transcript","text":"What's the weather?"}  ──►  Conductor
//! surface  ◄──  {"type":"tts_ready","text":"It is sunny.","timestamp":...}  ──  Conductor
//! ```
//!
//! Inbound frames are bounded by the configured message limit, checked both
//! by the WebSocket layer and again on decode. Outbound messages carry whole
//! replies and are never size-limited here.

use thiserror::Error;

use crate::events::SurfaceEvent;
use crate::messages::ConductorMessage;

/// Errors from encoding or decoding a frame
#[derive(Debug, Error)]
pub enum FrameError {
    /// Inbound text is not a valid surface event
    #[error("Invalid message format: {0}")]
    Malformed(#[source] serde_json::Error),

    /// Outbound message could not be serialized
    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// Inbound frame exceeds the message limit
    #[error("Frame too large: {size} bytes (max: {max})")]
    TooLarge {
        /// Frame size in bytes
        size: usize,
        /// Configured limit
        max: usize,
    },
}

/// JSON text-frame codec
#[derive(Debug, Clone, Copy)]
pub struct TextFrameCodec {
    max_frame_size: usize,
}

impl TextFrameCodec {
    /// Create a codec with the given inbound frame limit in bytes
    #[must_use]
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Inbound frame limit in bytes
    #[must_use]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Encode an outbound message as frame text
    ///
    /// # Errors
    ///
    /// Returns `FrameError::Encode` if serialization fails.
    pub fn encode(&self, msg: &ConductorMessage) -> Result<String, FrameError> {
        serde_json::to_string(msg).map_err(FrameError::Encode)
    }

    /// Decode inbound frame text
    ///
    /// Unknown `type` values decode to [`SurfaceEvent::Unknown`].
    ///
    /// # Errors
    ///
    /// Returns `FrameError::TooLarge` if the text exceeds the limit, or
    /// `FrameError::Malformed` if it is not JSON or has no `type` field.
    pub fn decode(&self, text: &str) -> Result<SurfaceEvent, FrameError> {
        if text.len() > self.max_frame_size {
            return Err(FrameError::TooLarge {
                size: text.len(),
                max: self.max_frame_size,
            });
        }
        serde_json::from_str(text).map_err(FrameError::Malformed)
    }
}

impl Default for TextFrameCodec {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_MESSAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_uses_type_tag() {
        let codec = TextFrameCodec::default();
        let text = codec.encode(&ConductorMessage::pong()).unwrap();
        assert!(text.starts_with(r#"{"type":"pong""#));
    }

    #[test]
    fn test_decode_transcript() {
        let codec = TextFrameCodec::default();
        let event = codec
            .decode(r#"{"type":"transcript","text":"hello"}"#)
            .unwrap();
        assert_eq!(
            event,
            SurfaceEvent::Transcript {
                text: "hello".to_string()
            }
        );
    }

    #[test]
    fn test_decode_rejects_non_json() {
        let codec = TextFrameCodec::default();
        let err = codec.decode("not json at all").unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
        assert!(err.to_string().starts_with("Invalid message format"));
    }

    #[test]
    fn test_decode_enforces_limit() {
        let codec = TextFrameCodec::new(16);
        let err = codec
            .decode(r#"{"type":"transcript","text":"a fairly long utterance"}"#)
            .unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { max: 16, .. }));
    }

    #[test]
    fn test_long_reply_encodes_past_inbound_limit() {
        let codec = TextFrameCodec::default();
        let reply = "This is a sentence. ".repeat(4000);
        let text = codec
            .encode(&ConductorMessage::agent_complete(reply, Some(10)))
            .unwrap();
        assert!(text.len() > codec.max_frame_size());
    }
}
