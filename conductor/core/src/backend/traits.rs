//! Completion Backend Traits
//!
//! Trait definitions for streaming completion backends. The Conductor drives
//! any provider that can turn a chat history into an ordered sequence of text
//! deltas, without knowing the wire protocol behind it.
//!
//! # Design Philosophy
//!
//! A backend never returns an error from `send_streaming`. Every failure
//! (bad status, dropped connection, deadline) arrives on the channel as a
//! terminal [`StreamingToken::Failed`], so the session reaches its fallback
//! path through ordinary matching instead of error propagation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Token stream events from completion backends
///
/// Every stream ends with exactly one `Done` or `Failed`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamingToken {
    /// A text delta from the response
    Token(String),
    /// The terminator was reached (or the body ended cleanly)
    Done,
    /// The stream could not be completed
    Failed(CompletionError),
}

impl StreamingToken {
    /// Whether this token ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }
}

/// Why a completion stream failed
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// The endpoint answered with a non-2xx status
    #[error("completion endpoint returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Drained response body
        body: String,
    },

    /// The request could not be sent or the body could not be read
    #[error("completion transport failed: {0}")]
    Network(String),

    /// No terminator arrived before the deadline
    #[error("completion timed out after {0:?}")]
    Timeout(Duration),
}

/// Speaker of a chat message sent upstream
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Fixed system instruction
    System,
    /// End user
    User,
    /// Model reply
    Assistant,
}

/// One entry of the upstream `messages` array
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who said it
    pub role: ChatRole,
    /// What was said
    pub content: String,
}

impl ChatMessage {
    /// Create a message
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }
}

/// A streaming completion request
///
/// `messages` already has the system instruction prepended. Sampling
/// parameters live on the backend, which owns the provider configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompletionRequest {
    /// Ordered conversation, oldest first
    pub messages: Vec<ChatMessage>,
}

impl CompletionRequest {
    /// Create a request from an ordered message list
    #[must_use]
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }
}

/// Completion backend trait
///
/// Implement this trait to stream completions from a different provider.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Get the backend name (e.g., "Fireworks")
    fn name(&self) -> &str;

    /// Model identifier reported to connecting surfaces
    fn model(&self) -> &str;

    /// Start a streaming completion
    ///
    /// Returns a receiver that yields deltas in order and always finishes with
    /// `Done` or `Failed`. Dropping the receiver abandons the request.
    async fn send_streaming(&self, request: &CompletionRequest) -> mpsc::Receiver<StreamingToken>;
}
