//! Voice Conductor Core - Sentence-Streamed Voice Conversations
//!
//! This crate turns a streaming chat-completion endpoint into a low-latency
//! voice pipeline. It splits the model's token stream into sentences as they
//! complete, so a voice surface can start speaking the first sentence while
//! the rest of the answer is still being generated.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Voice Surfaces                            │
//! │   speech-to-text ─► {"type":"transcript"}                        │
//! │   text-to-speech ◄─ {"type":"tts_ready"}                         │
//! └───────────────────────────┬─────────────────────────────────────┘
//!                             │  WebSocket, JSON text frames
//! ┌───────────────────────────┼─────────────────────────────────────┐
//! │                    CONDUCTOR CORE                                │
//! │  ┌────────────────────────┴──────────────────────────────────┐  │
//! │  │ transport::WebSocketServer ─► SessionRegistry             │  │
//! │  └────────────────────────┬──────────────────────────────────┘  │
//! │                           │ one per connection                   │
//! │  ┌────────────────────────▼──────────────────────────────────┐  │
//! │  │ Conductor                                                  │  │
//! │  │  ┌─────────┐  ┌────────────────┐  ┌──────────────────────┐ │  │
//! │  │  │ Session │  │ ResponseStream │  │ SentenceSegmenter    │ │  │
//! │  │  │ history │  │ (pull events)  │  │ (boundary by offset) │ │  │
//! │  │  └─────────┘  └───────┬────────┘  └──────────────────────┘ │  │
//! │  └───────────────────────┼───────────────────────────────────┘  │
//! │                          │ StreamingToken (mpsc)                 │
//! │  ┌───────────────────────▼───────────────────────────────────┐  │
//! │  │ ChatCompletionsBackend (SSE over HTTP)                    │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Conductor`]: per-session pipeline with single-flight generation
//! - [`SessionRegistry`]: connection-to-session map
//! - [`SentenceSegmenter`]: incremental sentence boundary detection
//! - [`ChatCompletionsBackend`]: streaming chat-completions client
//! - [`ConductorMessage`]: messages sent from Conductor to surfaces
//! - [`SurfaceEvent`]: events sent from surfaces to Conductor
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use voice_conductor::{
//!     config::load_config, transport::WebSocketServer, ChatCompletionsBackend, SessionRegistry,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     config.validate()?;
//!
//!     let backend = ChatCompletionsBackend::new(
//!         config.completion.clone(),
//!         config.api_key.clone().unwrap_or_default(),
//!     );
//!     let registry = SessionRegistry::new(Arc::new(backend), config.conductor.clone());
//!
//!     let server = WebSocketServer::bind(config.server.clone(), registry).await?;
//!     server.run(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: completion backend abstraction and the chat-completions client
//! - [`segmenter`]: sentence segmentation
//! - [`streaming`]: token stream to sentence/delta events
//! - [`session`]: conversation history
//! - [`conductor`]: per-session pipeline
//! - [`registry`]: session registry
//! - [`transport`]: WebSocket server and frame codec
//! - [`config`]: layered configuration
//! - [`events`]: events from surfaces to Conductor
//! - [`messages`]: messages from Conductor to surfaces

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod conductor;
pub mod config;
pub mod events;
pub mod messages;
pub mod registry;
pub mod segmenter;
pub mod session;
pub mod streaming;
pub mod transport;

// Re-exports for convenience
pub use backend::{
    ChatCompletionsBackend, ChatMessage, ChatRole, CompletionBackend, CompletionError,
    CompletionRequest, StreamingToken,
};
pub use conductor::{Conductor, ProcessingGuard, TranscriptOutcome};
pub use config::{
    CompletionSettings, ConductorConfig, ConductorConfigFile, ConfigError, ConfigOverrides,
    ServerSettings,
};
pub use events::SurfaceEvent;
pub use messages::ConductorMessage;
pub use registry::{ConnectionId, RegistrySummary, RouteOutcome, SessionRegistry};
pub use segmenter::SentenceSegmenter;
pub use session::{HistoryEntry, MessageRole, Session, SessionId, SessionState};
pub use streaming::{ResponseStream, StreamEvent};
pub use transport::{TransportError, WebSocketServer};
