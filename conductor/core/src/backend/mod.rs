//! Completion Backend Integration
//!
//! Streaming access to text-generation endpoints through a common trait.
//!
//! # Available Backends
//!
//! - **ChatCompletions**: any OpenAI-compatible `/chat/completions` endpoint
//!   (Fireworks by default)
//!
//! # Usage
//!
//! ```ignore
//! use voice_conductor::backend::{ChatCompletionsBackend, ChatMessage, CompletionBackend, CompletionRequest};
//!
//! let backend = ChatCompletionsBackend::new(settings, api_key);
//! let request = CompletionRequest::new(vec![ChatMessage::user("Hello!")]);
//! let mut rx = backend.send_streaming(&request).await;
//! while let Some(token) = rx.recv().await { /* ... */ }
//! ```

mod chat_completions;
pub mod sse;
mod traits;

pub use chat_completions::ChatCompletionsBackend;
pub use traits::{
    ChatMessage, ChatRole, CompletionBackend, CompletionError, CompletionRequest, StreamingToken,
};
