//! Chat Completions Backend Implementation
//!
//! Streaming client for OpenAI-compatible `/chat/completions` endpoints
//! (Fireworks by default).
//!
//! # Wire format
//!
//! The request is a single POST with `stream: true`. The response body is a
//! server-sent event stream:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//! data: {"choices":[{"delta":{"content":"lo."}}]}
//! data: [DONE]
//! ```
//!
//! The whole exchange, from sending the request to reading the terminator,
//! runs under one deadline. When it elapses the response is dropped, which
//! closes the connection.

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::sse::{parse_data, SsePayload};
use super::traits::{
    ChatMessage, CompletionBackend, CompletionError, CompletionRequest, StreamingToken,
};
use crate::config::CompletionSettings;

/// Channel depth between the reader task and the session
const TOKEN_CHANNEL_CAPACITY: usize = 100;

/// Streaming client for an OpenAI-compatible chat completions endpoint
#[derive(Clone)]
pub struct ChatCompletionsBackend {
    /// Provider settings (endpoint, model, sampling, deadline)
    settings: CompletionSettings,
    /// Bearer token
    api_key: String,
    /// HTTP client
    http_client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
    presence_penalty: f32,
    frequency_penalty: f32,
}

impl ChatCompletionsBackend {
    /// Create a backend from provider settings and an API key
    pub fn new(settings: CompletionSettings, api_key: impl Into<String>) -> Self {
        Self {
            settings,
            api_key: api_key.into(),
            http_client: reqwest::Client::new(),
        }
    }

    /// Provider settings in use
    #[must_use]
    pub fn settings(&self) -> &CompletionSettings {
        &self.settings
    }

    /// Get the chat completions endpoint URL
    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'))
    }

    /// Deadline for one request
    fn request_timeout(&self) -> Duration {
        self.settings.request_timeout
    }

    /// Build the JSON request body
    fn build_body<'a>(&'a self, request: &'a CompletionRequest) -> ChatCompletionBody<'a> {
        ChatCompletionBody {
            model: &self.settings.model,
            messages: &request.messages,
            stream: true,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            top_p: self.settings.top_p,
            top_k: self.settings.top_k,
            presence_penalty: self.settings.presence_penalty,
            frequency_penalty: self.settings.frequency_penalty,
        }
    }
}

#[async_trait]
impl CompletionBackend for ChatCompletionsBackend {
    fn name(&self) -> &str {
        "ChatCompletions"
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    async fn send_streaming(&self, request: &CompletionRequest) -> mpsc::Receiver<StreamingToken> {
        let (tx, rx) = mpsc::channel(TOKEN_CHANNEL_CAPACITY);

        let timeout = self.request_timeout();
        let deadline = Instant::now() + timeout;
        let pending = self
            .http_client
            .post(self.completions_url())
            .header(reqwest::header::ACCEPT, "application/json")
            .bearer_auth(&self.api_key)
            .json(&self.build_body(request))
            .send();

        tracing::debug!(
            model = %self.settings.model,
            messages = request.messages.len(),
            "Starting completion stream"
        );

        tokio::spawn(async move {
            let terminal = match tokio::time::timeout_at(deadline, async {
                let response = pending
                    .await
                    .map_err(|e| CompletionError::Network(e.to_string()))?;
                read_stream(response, &tx).await
            })
            .await
            {
                Ok(Ok(true)) => StreamingToken::Done,
                // Receiver dropped, nobody is listening for a terminal token
                Ok(Ok(false)) => return,
                Ok(Err(e)) => StreamingToken::Failed(e),
                Err(_) => StreamingToken::Failed(CompletionError::Timeout(timeout)),
            };

            if let StreamingToken::Failed(ref e) = terminal {
                tracing::warn!(error = %e, "Completion stream failed");
            }
            let _ = tx.send(terminal).await;
        });

        rx
    }
}

/// Forward deltas from a response body until the terminator
///
/// Returns `Ok(true)` when the stream ended normally and `Ok(false)` when the
/// receiver went away mid-stream.
async fn read_stream(
    response: reqwest::Response,
    tx: &mpsc::Sender<StreamingToken>,
) -> Result<bool, CompletionError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CompletionError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let mut events = response.bytes_stream().eventsource();

    while let Some(event) = events.next().await {
        let event = event.map_err(|e| CompletionError::Network(e.to_string()))?;
        match parse_data(&event.data) {
            SsePayload::Delta(text) => {
                if tx.send(StreamingToken::Token(text)).await.is_err() {
                    return Ok(false);
                }
            }
            SsePayload::Done => return Ok(true),
            SsePayload::Skip => {}
        }
    }

    tracing::debug!("Completion body ended without terminator");
    Ok(true)
}
