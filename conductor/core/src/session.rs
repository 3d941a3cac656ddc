//! Session Management
//!
//! Conversation state for one connected caller: an append-only history of
//! user and assistant turns plus the fixed system instruction.
//!
//! # Design Philosophy
//!
//! History entries are immutable once appended and are never reordered. The
//! only ways history shrinks are [`Session::clear_history`] on teardown and
//! the context window applied when building an upstream request, which
//! selects entries without removing them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backend::{ChatMessage, ChatRole, CompletionRequest};
use crate::messages::now_ms;

/// Unique identifier for a session
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new unique session ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("session_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who produced a history entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The caller
    User,
    /// The model
    Assistant,
}

impl From<MessageRole> for ChatRole {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::User => ChatRole::User,
            MessageRole::Assistant => ChatRole::Assistant,
        }
    }
}

/// One turn of the conversation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Who said it
    pub role: MessageRole,
    /// What was said
    pub text: String,
    /// When it was appended (Unix timestamp ms)
    pub timestamp: u64,
}

impl HistoryEntry {
    fn new(role: MessageRole, text: String) -> Self {
        Self {
            role,
            text,
            timestamp: now_ms(),
        }
    }
}

/// Generation state of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Ready to accept a transcript
    Idle,
    /// A generation is in flight
    Processing,
}

/// A conversation session
#[derive(Clone, Debug)]
pub struct Session {
    /// Unique session ID
    pub id: SessionId,
    /// System instruction prepended to every request
    system_prompt: String,
    /// Conversation history, oldest first
    history: Vec<HistoryEntry>,
    /// When the session was created (Unix timestamp ms)
    created_at: u64,
}

impl Session {
    /// Create a session with an empty history
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self::with_id(SessionId::new(), system_prompt)
    }

    /// Create a session with a specific ID
    pub fn with_id(id: SessionId, system_prompt: impl Into<String>) -> Self {
        Self {
            id,
            system_prompt: system_prompt.into(),
            history: Vec::new(),
            created_at: now_ms(),
        }
    }

    /// The fixed system instruction
    #[must_use]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Append a user turn
    pub fn add_user_message(&mut self, text: impl Into<String>) {
        self.history
            .push(HistoryEntry::new(MessageRole::User, text.into()));
    }

    /// Append an assistant turn
    pub fn add_assistant_message(&mut self, text: impl Into<String>) {
        self.history
            .push(HistoryEntry::new(MessageRole::Assistant, text.into()));
    }

    /// All history entries, oldest first
    #[must_use]
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Get the last N entries (all of them when `count` is 0)
    #[must_use]
    pub fn recent_messages(&self, count: usize) -> &[HistoryEntry] {
        if count == 0 {
            return &self.history;
        }
        let start = self.history.len().saturating_sub(count);
        &self.history[start..]
    }

    /// Build the upstream request: system instruction, then recent history
    #[must_use]
    pub fn build_request(&self, max_context_messages: usize) -> CompletionRequest {
        let recent = self.recent_messages(max_context_messages);
        let mut messages = Vec::with_capacity(recent.len() + 1);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend(
            recent
                .iter()
                .map(|entry| ChatMessage::new(entry.role.into(), entry.text.clone())),
        );
        CompletionRequest::new(messages)
    }

    /// Number of history entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Whether history is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// When the session was created (Unix timestamp ms)
    #[must_use]
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Clear message history (teardown)
    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}
