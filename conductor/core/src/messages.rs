//! Conductor Messages
//!
//! Messages sent from the Conductor to a connected voice surface. Each one is
//! serialized as a JSON object whose `type` field names the variant.
//!
//! # Design Philosophy
//!
//! The surface is a renderer and a speaker: it displays `agent_chunk` text as
//! it streams and synthesizes speech for every `tts_ready` sentence. It never
//! decides when a sentence is complete; the Conductor does.

use serde::{Deserialize, Serialize};

use crate::session::SessionId;

/// Messages from Conductor to a voice surface
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConductorMessage {
    /// Greeting sent once when the connection is accepted
    Connected {
        /// Human-readable status line
        message: String,
        /// Session created for this connection
        session_id: SessionId,
        /// Model serving the session
        model: String,
        /// Delivery mode advertised to the surface
        optimization: String,
        /// Unix timestamp ms
        timestamp: u64,
    },

    /// The transcript was accepted and generation is starting
    TranscriptReceived {
        /// The transcript as received
        text: String,
        /// Unix timestamp ms
        timestamp: u64,
    },

    /// A raw text delta, for display only
    AgentChunk {
        /// The delta text
        text: String,
        /// Unix timestamp ms
        timestamp: u64,
    },

    /// A complete sentence, ready for speech synthesis
    #[serde(alias = "sentence_complete")]
    TtsReady {
        /// Sentence text (trimmed)
        text: String,
        /// Unix timestamp ms
        timestamp: u64,
    },

    /// The response is finished
    AgentComplete {
        /// Full response text (or the fallback phrase)
        text: String,
        /// Unix timestamp ms
        timestamp: u64,
        /// Request start to stream end, in ms; absent on the fallback path
        #[serde(default, skip_serializing_if = "Option::is_none")]
        latency: Option<u64>,
    },

    /// Something the surface sent could not be handled
    Error {
        /// Error description
        message: String,
        /// Unix timestamp ms
        timestamp: u64,
    },

    /// Heartbeat reply
    Pong {
        /// Unix timestamp ms
        timestamp: u64,
    },
}

impl ConductorMessage {
    /// Build a `transcript_received` acknowledgment stamped now
    pub fn transcript_received(text: impl Into<String>) -> Self {
        Self::TranscriptReceived {
            text: text.into(),
            timestamp: now_ms(),
        }
    }

    /// Build an `agent_chunk` stamped now
    pub fn agent_chunk(text: impl Into<String>) -> Self {
        Self::AgentChunk {
            text: text.into(),
            timestamp: now_ms(),
        }
    }

    /// Build a `tts_ready` stamped now
    pub fn tts_ready(text: impl Into<String>) -> Self {
        Self::TtsReady {
            text: text.into(),
            timestamp: now_ms(),
        }
    }

    /// Build an `agent_complete` stamped now
    pub fn agent_complete(text: impl Into<String>, latency: Option<u64>) -> Self {
        Self::AgentComplete {
            text: text.into(),
            timestamp: now_ms(),
            latency,
        }
    }

    /// Build an `error` stamped now
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            timestamp: now_ms(),
        }
    }

    /// Build a `pong` stamped now
    #[must_use]
    pub fn pong() -> Self {
        Self::Pong {
            timestamp: now_ms(),
        }
    }

    /// Wire name of this message's `type`
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::TranscriptReceived { .. } => "transcript_received",
            Self::AgentChunk { .. } => "agent_chunk",
            Self::TtsReady { .. } => "tts_ready",
            Self::AgentComplete { .. } => "agent_complete",
            Self::Error { .. } => "error",
            Self::Pong { .. } => "pong",
        }
    }
}

/// Current Unix time in milliseconds
#[must_use]
pub fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}
