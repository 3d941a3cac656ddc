//! Conductor - The Per-Session Pipeline
//!
//! One `Conductor` serves one connected caller. It owns that caller's
//! [`Session`], drives the completion backend, runs the response through the
//! sentence segmenter, and pushes [`ConductorMessage`]s to the caller's sink.
//!
//! # State machine
//!
//! ```text
//!            handle_transcript (idle, non-empty)
//!   Idle ─────────────────────────────────────────► Processing
//!    ▲                                                  │
//!    └──────────── Complete / Failed / dropped ─────────┘
//! ```
//!
//! At most one generation runs per session. A transcript that arrives while
//! one is in flight is dropped, not queued: a caller who speaks again should
//! be answered about what they said last, not about a backlog.
//!
//! # Ordering
//!
//! For each accepted transcript the sink receives, in order:
//! `transcript_received`, then `tts_ready` / `agent_chunk` in production
//! order, then exactly one `agent_complete`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::backend::CompletionBackend;
use crate::config::ConductorConfig;
use crate::messages::{now_ms, ConductorMessage};
use crate::session::{HistoryEntry, Session, SessionId, SessionState};
use crate::streaming::{ResponseStream, StreamEvent};

/// What happened to a transcript
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TranscriptOutcome {
    /// The model answered
    Completed,
    /// The request failed and the apology was delivered instead
    Failed,
    /// The transcript was empty or whitespace
    IgnoredEmpty,
    /// A generation was already in flight
    IgnoredBusy,
    /// The session has been torn down
    Closed,
}

/// Claim on a session's single generation slot
///
/// Obtained from [`Conductor::try_begin`] and released when dropped. That
/// covers normal return, early return, and the future being dropped when the
/// connection's task is aborted. Owning the flag lets the claim be taken
/// before the generation task is spawned.
#[derive(Debug)]
pub struct ProcessingGuard {
    flag: Arc<AtomicBool>,
}

impl ProcessingGuard {
    /// Claim the flag, or `None` if it is already held
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// The per-session conversation pipeline
pub struct Conductor<B: CompletionBackend> {
    /// Session settings
    config: ConductorConfig,
    /// Completion backend, shared with other sessions
    backend: Arc<B>,
    /// Conversation state
    session: Mutex<Session>,
    /// Set while a generation is in flight
    processing: Arc<AtomicBool>,
    /// Set once the session is torn down
    closed: AtomicBool,
    /// Channel to the caller's connection
    tx: mpsc::Sender<ConductorMessage>,
}

impl<B: CompletionBackend> Conductor<B> {
    /// Create a Conductor with a fresh, empty session
    pub fn new(backend: Arc<B>, config: ConductorConfig, tx: mpsc::Sender<ConductorMessage>) -> Self {
        let session = Session::new(config.system_prompt.clone());
        Self {
            config,
            backend,
            session: Mutex::new(session),
            processing: Arc::new(AtomicBool::new(false)),
            closed: AtomicBool::new(false),
            tx,
        }
    }

    /// Get the session ID
    pub fn session_id(&self) -> SessionId {
        self.session.lock().id.clone()
    }

    /// Current generation state
    pub fn state(&self) -> SessionState {
        if self.processing.load(Ordering::Acquire) {
            SessionState::Processing
        } else {
            SessionState::Idle
        }
    }

    /// Whether the session has been torn down
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Snapshot of the conversation history
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.session.lock().history().to_vec()
    }

    /// Model serving this session
    pub fn model(&self) -> &str {
        self.backend.model()
    }

    /// Send the `connected` greeting
    pub async fn greet(&self) {
        let msg = ConductorMessage::Connected {
            message: "Voice pipeline ready".to_string(),
            session_id: self.session_id(),
            model: self.backend.model().to_string(),
            optimization: "sentence-level-streaming".to_string(),
            timestamp: now_ms(),
        };
        self.send(msg).await;
    }

    /// Answer a heartbeat, regardless of processing state
    pub async fn pong(&self) {
        self.send(ConductorMessage::pong()).await;
    }

    /// Claim the generation slot without waiting
    ///
    /// Returns `None` while another generation holds it. The claim is taken
    /// synchronously, so a caller that dispatches work onto another task
    /// decides acceptance in arrival order.
    #[must_use]
    pub fn try_begin(&self) -> Option<ProcessingGuard> {
        ProcessingGuard::acquire(&self.processing)
    }

    /// Handle one finished utterance from the caller
    ///
    /// Returns once the response has been fully delivered (or the transcript
    /// was dropped). The session is idle again when this returns.
    pub async fn handle_transcript(&self, text: &str) -> TranscriptOutcome {
        if self.is_closed() {
            return TranscriptOutcome::Closed;
        }
        if text.trim().is_empty() {
            tracing::debug!("Empty transcript, ignoring");
            return TranscriptOutcome::IgnoredEmpty;
        }
        let Some(guard) = self.try_begin() else {
            tracing::info!(transcript = %text, "Already processing, dropping transcript");
            return TranscriptOutcome::IgnoredBusy;
        };
        self.respond(text, guard).await
    }

    /// Generate and deliver the reply to a transcript already admitted
    ///
    /// The slot stays claimed until the reply has been delivered.
    pub async fn respond(&self, text: &str, _guard: ProcessingGuard) -> TranscriptOutcome {
        if self.is_closed() {
            return TranscriptOutcome::Closed;
        }

        tracing::info!(transcript = %text, "User said");

        let request = {
            let mut session = self.session.lock();
            session.add_user_message(text);
            session.build_request(self.config.max_context_messages)
        };
        self.send(ConductorMessage::transcript_received(text)).await;

        let started = Instant::now();
        let rx = self.backend.send_streaming(&request).await;
        let mut stream = ResponseStream::new(rx, started);
        let mut chunk_count = 0usize;

        while let Some(event) = stream.next_event().await {
            match event {
                StreamEvent::SentenceReady(sentence) => {
                    let sentence = sentence.trim();
                    if !sentence.is_empty() {
                        tracing::debug!(sentence = %sentence, "Sentence ready for TTS");
                        self.send(ConductorMessage::tts_ready(sentence)).await;
                    }
                }
                StreamEvent::Delta(delta) => {
                    chunk_count += 1;
                    self.send(ConductorMessage::agent_chunk(delta)).await;
                }
                StreamEvent::Complete { text, latency_ms } => {
                    let reply = if text.trim().is_empty() {
                        self.config.fallback_reply.clone()
                    } else {
                        text
                    };
                    tracing::info!(
                        chunks = chunk_count,
                        latency_ms = latency_ms,
                        response = %reply,
                        "Response complete"
                    );
                    self.record_reply(&reply);
                    self.send(ConductorMessage::agent_complete(reply, Some(latency_ms)))
                        .await;
                    return TranscriptOutcome::Completed;
                }
                StreamEvent::Failed(error) => {
                    tracing::warn!(error = %error, "Generation failed, sending apology");
                    let apology = self.config.apology_reply.clone();
                    self.record_reply(&apology);
                    self.send(ConductorMessage::tts_ready(apology.clone())).await;
                    self.send(ConductorMessage::agent_complete(apology, None)).await;
                    return TranscriptOutcome::Failed;
                }
            }
        }

        // ResponseStream always yields a terminal event before ending
        TranscriptOutcome::Failed
    }

    /// Tear down: clear history and discard every later event
    pub fn close(&self) {
        let mut session = self.session.lock();
        self.closed.store(true, Ordering::Release);
        session.clear_history();
    }

    /// Append the assistant turn unless the session was torn down meanwhile
    fn record_reply(&self, reply: &str) {
        let mut session = self.session.lock();
        if !self.is_closed() {
            session.add_assistant_message(reply);
        }
    }

    /// Deliver a message to the caller's sink
    ///
    /// Failures are logged; a broken sink never stops the pipeline. The
    /// closed check and the hand-off both happen under the session lock, so
    /// nothing reaches the sink once `close` has returned.
    async fn send(&self, msg: ConductorMessage) {
        let kind = msg.kind();
        if self.is_closed() {
            tracing::trace!(kind = kind, "Session closed, discarding message");
            return;
        }
        let Ok(permit) = self.tx.reserve().await else {
            tracing::warn!(kind = kind, "Failed to deliver message, sink closed");
            return;
        };

        let _session = self.session.lock();
        if self.is_closed() {
            tracing::trace!(kind = kind, "Session closed, discarding message");
            return;
        }
        permit.send(msg);
    }
}
