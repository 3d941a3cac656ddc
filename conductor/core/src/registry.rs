//! Session Registry - Per-Connection Session Management
//!
//! Maps each live connection to its own [`Conductor`]. The registry holds no
//! conversation logic: it creates a session on connect, routes inbound
//! [`SurfaceEvent`]s to the right session, and tears the session down on
//! disconnect.
//!
//! # Architecture
//!
//! ```text
//!                      SessionRegistry
//!                     ┌───────────────────────────────────────┐
//!                     │ HashMap<ConnectionId, SessionEntry>   │
//!                     │   - wrapped in Arc<RwLock<>>          │
//!                     └───────────────┬───────────────────────┘
//!                                     │
//!              ┌──────────────────────┼──────────────────────┐
//!              │                      │                      │
//!       ┌──────▼──────┐       ┌───────▼──────┐       ┌───────▼──────┐
//!       │  Conductor  │       │  Conductor   │       │  Conductor   │
//!       │   conn-1    │       │   conn-2     │       │   conn-3     │
//!       └─────────────┘       └──────────────┘       └──────────────┘
//! ```
//!
//! Sessions share only the completion backend handle. Transcripts run on a
//! task owned by their session entry so heartbeats are answered while a
//! generation is in flight; closing the entry aborts those tasks.
//!
//! The lock is never held across an await.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::backend::CompletionBackend;
use crate::conductor::{Conductor, TranscriptOutcome};
use crate::config::ConductorConfig;
use crate::events::SurfaceEvent;
use crate::messages::ConductorMessage;
use crate::session::SessionState;

/// Unique identifier for a client connection
///
/// Assigned when the connection is opened and stable for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next connection ID
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw numeric value
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// How an inbound event was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A transcript was handed to its session's pipeline
    Dispatched,
    /// A heartbeat was answered
    Ponged,
    /// The event needs no action (unknown type, empty or dropped transcript)
    Ignored,
    /// No session exists for the connection
    UnknownSession,
}

/// Point-in-time view of the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistrySummary {
    /// Open sessions
    pub sessions: usize,
    /// Sessions with a generation in flight
    pub processing: usize,
}

/// One open connection's session and its in-flight work
struct SessionEntry<B: CompletionBackend> {
    conductor: Arc<Conductor<B>>,
    tasks: JoinSet<TranscriptOutcome>,
    connected_at: Instant,
}

impl<B: CompletionBackend> SessionEntry<B> {
    /// Collect finished transcript tasks, logging any that panicked
    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            match result {
                Ok(outcome) => tracing::trace!(outcome = ?outcome, "Transcript task finished"),
                Err(e) if e.is_panic() => tracing::error!(error = %e, "Transcript task panicked"),
                Err(_) => {}
            }
        }
    }
}

/// Registry of live sessions, one per connection
pub struct SessionRegistry<B: CompletionBackend + 'static> {
    /// Completion backend shared by every session
    backend: Arc<B>,
    /// Settings applied to each new session
    config: ConductorConfig,
    /// Connection ID to session entry
    inner: Arc<RwLock<HashMap<ConnectionId, SessionEntry<B>>>>,
}

impl<B: CompletionBackend + 'static> Clone for SessionRegistry<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            config: self.config.clone(),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: CompletionBackend + 'static> SessionRegistry<B> {
    /// Create an empty registry
    #[must_use]
    pub fn new(backend: Arc<B>, config: ConductorConfig) -> Self {
        Self {
            backend,
            config,
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Open a session for a new connection and greet it
    ///
    /// `sink` is the channel the connection writes to its client.
    pub async fn open(&self, sink: mpsc::Sender<ConductorMessage>) -> ConnectionId {
        let id = ConnectionId::new();
        self.open_with_id(id, sink).await;
        id
    }

    /// Open a session under an already-allocated connection ID
    pub async fn open_with_id(&self, id: ConnectionId, sink: mpsc::Sender<ConductorMessage>) {
        let conductor = Arc::new(Conductor::new(
            Arc::clone(&self.backend),
            self.config.clone(),
            sink,
        ));

        self.inner.write().insert(
            id,
            SessionEntry {
                conductor: Arc::clone(&conductor),
                tasks: JoinSet::new(),
                connected_at: Instant::now(),
            },
        );
        tracing::info!(
            connection_id = %id,
            session_id = %conductor.session_id(),
            "Session opened"
        );

        conductor.greet().await;
    }

    /// Route one inbound event to the connection's session
    pub async fn route(&self, id: ConnectionId, event: SurfaceEvent) -> RouteOutcome {
        match event {
            SurfaceEvent::Transcript { text } => self.dispatch_transcript(id, text),
            SurfaceEvent::Ping => {
                let Some(conductor) = self.conductor(id) else {
                    return RouteOutcome::UnknownSession;
                };
                conductor.pong().await;
                RouteOutcome::Ponged
            }
            SurfaceEvent::Unknown => {
                tracing::debug!(connection_id = %id, "Ignoring unknown event type");
                if self.contains(id) {
                    RouteOutcome::Ignored
                } else {
                    RouteOutcome::UnknownSession
                }
            }
        }
    }

    fn dispatch_transcript(&self, id: ConnectionId, text: String) -> RouteOutcome {
        let mut inner = self.inner.write();
        let Some(entry) = inner.get_mut(&id) else {
            return RouteOutcome::UnknownSession;
        };
        entry.reap();

        if text.trim().is_empty() {
            tracing::debug!(connection_id = %id, "Empty transcript, ignoring");
            return RouteOutcome::Ignored;
        }
        // Claimed here rather than in the task so arrival order decides
        let Some(guard) = entry.conductor.try_begin() else {
            tracing::info!(
                connection_id = %id,
                transcript = %text,
                "Already processing, dropping transcript"
            );
            return RouteOutcome::Ignored;
        };

        let conductor = Arc::clone(&entry.conductor);
        entry
            .tasks
            .spawn(async move { conductor.respond(&text, guard).await });
        RouteOutcome::Dispatched
    }

    /// Tear down a connection's session
    ///
    /// Clears history, discards any later events, and aborts in-flight
    /// generation. Returns false if the connection was unknown.
    pub fn close(&self, id: ConnectionId) -> bool {
        let Some(mut entry) = self.inner.write().remove(&id) else {
            return false;
        };

        entry.conductor.close();
        entry.tasks.abort_all();
        tracing::info!(
            connection_id = %id,
            uptime_secs = entry.connected_at.elapsed().as_secs(),
            "Session closed"
        );
        true
    }

    /// Get the session serving a connection
    #[must_use]
    pub fn conductor(&self, id: ConnectionId) -> Option<Arc<Conductor<B>>> {
        self.inner.read().get(&id).map(|e| Arc::clone(&e.conductor))
    }

    /// Check if a connection has a session
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.inner.read().contains_key(&id)
    }

    /// Number of open sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether no sessions are open
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Open and processing session counts
    #[must_use]
    pub fn summary(&self) -> RegistrySummary {
        let inner = self.inner.read();
        RegistrySummary {
            sessions: inner.len(),
            processing: inner
                .values()
                .filter(|e| e.conductor.state() == SessionState::Processing)
                .count(),
        }
    }

    /// Close every session
    pub fn close_all(&self) {
        let ids: Vec<ConnectionId> = self.inner.read().keys().copied().collect();
        for id in ids {
            self.close(id);
        }
    }
}
