//! Daemon Server Implementation
//!
//! Wires the loaded configuration into a running server:
//! - Builds the completion backend shared by every session
//! - Creates the session registry
//! - Binds the WebSocket listener and serves until shutdown
//!
//! ```text
//!                     DaemonServer
//!                          │
//!                   WebSocketServer
//!                          │
//!          ┌───────────────┼───────────────┐
//!          │               │               │
//!      Surface A       Surface B       Surface C
//!      (conn-1)        (conn-2)        (conn-3)
//!          │               │               │
//!      Conductor       Conductor       Conductor
//!          └───────────────┴───────────────┘
//!                          │
//!               ChatCompletionsBackend
//! ```

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use voice_conductor::{ChatCompletionsBackend, ConductorConfigFile, SessionRegistry, WebSocketServer};

/// The main daemon server
pub struct DaemonServer {
    /// Validated configuration
    config: ConductorConfigFile,
}

impl DaemonServer {
    /// Create a daemon server from validated configuration
    pub fn new(config: ConductorConfigFile) -> Self {
        Self { config }
    }

    /// Build the registry backing every connection
    fn build_registry(&self) -> SessionRegistry<ChatCompletionsBackend> {
        let backend = ChatCompletionsBackend::new(
            self.config.completion.clone(),
            self.config.api_key.clone().unwrap_or_default(),
        );
        SessionRegistry::new(Arc::new(backend), self.config.conductor.clone())
    }

    /// Run until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let registry = self.build_registry();
        let server = WebSocketServer::bind(self.config.server.clone(), registry)
            .await
            .with_context(|| format!("Failed to listen on {}", self.config.server.bind_address))?;

        info!(
            address = %server.local_addr()?,
            model = %self.config.completion.model,
            "Ready to accept connections"
        );

        let registry = server.registry().clone();
        let result = server.run(shutdown).await;

        let summary = registry.summary();
        info!(
            sessions = summary.sessions,
            processing = summary.processing,
            "Server stopped"
        );
        result.context("Server error")
    }
}
