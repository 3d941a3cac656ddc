//! Response Streaming
//!
//! Combines one completion stream with one [`SentenceSegmenter`] and exposes
//! the result as a pull-based sequence of [`StreamEvent`]s.
//!
//! # Event order
//!
//! ```text
//! token "Hi. How"   ->  SentenceReady("Hi. "), Delta("Hi. How")
//! token " are you?" ->  Delta(" are you?")
//! Done              ->  SentenceReady("How are you?"), Complete("Hi. How are you?", ms)
//! ```
//!
//! Sentences completed by a token come before that token's `Delta`, so speech
//! synthesis is triggered as early as possible. After `Complete` or `Failed`
//! the stream is exhausted.

use std::collections::VecDeque;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::backend::{CompletionError, StreamingToken};
use crate::segmenter::SentenceSegmenter;

/// One step of a streamed response
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// A raw text delta, for display
    Delta(String),
    /// A completed sentence, for synthesis
    SentenceReady(String),
    /// The response finished normally
    Complete {
        /// Concatenation of every delta
        text: String,
        /// Milliseconds from stream start to stream end
        latency_ms: u64,
    },
    /// The response could not be completed
    Failed(CompletionError),
}

impl StreamEvent {
    /// Whether this event ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Failed(_))
    }
}

/// Pull-based event stream for one generation
pub struct ResponseStream {
    /// Tokens from the completion backend
    rx: mpsc::Receiver<StreamingToken>,
    /// Sentence splitter scoped to this generation
    segmenter: SentenceSegmenter,
    /// Events produced but not yet returned
    queued: VecDeque<StreamEvent>,
    /// Full response text so far
    full_text: String,
    /// When the request was issued
    started: Instant,
    /// Set once a terminal event has been queued
    finished: bool,
}

impl ResponseStream {
    /// Wrap a token receiver; latency is measured from `started`
    #[must_use]
    pub fn new(rx: mpsc::Receiver<StreamingToken>, started: Instant) -> Self {
        Self {
            rx,
            segmenter: SentenceSegmenter::new(),
            queued: VecDeque::new(),
            full_text: String::new(),
            started,
            finished: false,
        }
    }

    /// Next event, or `None` after the terminal event has been returned
    ///
    /// Suspends only while waiting on the backend channel.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                return Some(event);
            }
            if self.finished {
                return None;
            }

            let token = self.rx.recv().await.unwrap_or_else(|| {
                // Backend task vanished without a terminal token
                StreamingToken::Failed(CompletionError::Network(
                    "completion stream closed unexpectedly".to_string(),
                ))
            });
            self.apply(token);
        }
    }

    fn apply(&mut self, token: StreamingToken) {
        match token {
            StreamingToken::Token(text) => {
                for sentence in self.segmenter.feed(&text) {
                    self.queued.push_back(StreamEvent::SentenceReady(sentence));
                }
                self.full_text.push_str(&text);
                self.queued.push_back(StreamEvent::Delta(text));
            }
            StreamingToken::Done => {
                if let Some(rest) = self.segmenter.flush() {
                    self.queued.push_back(StreamEvent::SentenceReady(rest));
                }
                let latency_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
                self.queued.push_back(StreamEvent::Complete {
                    text: std::mem::take(&mut self.full_text),
                    latency_ms,
                });
                self.finished = true;
            }
            StreamingToken::Failed(error) => {
                self.segmenter.reset();
                self.queued.push_back(StreamEvent::Failed(error));
                self.finished = true;
            }
        }
    }
}
