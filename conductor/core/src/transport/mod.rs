//! Transport Layer for Conductor-Surface IPC
//!
//! Voice surfaces connect over WebSocket and exchange JSON text frames with
//! the Conductor:
//!
//! - [`frame`]: JSON text-frame codec
//! - [`websocket`]: accept loop and per-connection handler
//!
//! The transport only moves frames. Each connection is mapped to a session by
//! the [`SessionRegistry`](crate::registry::SessionRegistry), which owns all
//! conversation state.

pub mod frame;
pub mod websocket;

use thiserror::Error;

pub use frame::{FrameError, TextFrameCodec};
pub use websocket::WebSocketServer;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// The listener could not be bound
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// Requested address
        address: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Socket I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Frame could not be encoded or decoded
    #[error(transparent)]
    Frame(#[from] FrameError),
}
