//! Event payload interpretation for chat completion streams
//!
//! Framing (line splitting, `data:` fields, comments, CRLF, UTF-8 split across
//! network chunks) is handled by `eventsource-stream`; this module only
//! decides what one event's `data` means.

use serde::Deserialize;

/// Sentinel payload that ends the stream
const DONE_SENTINEL: &str = "[DONE]";

/// One interpreted event payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SsePayload {
    /// A text delta
    Delta(String),
    /// The `[DONE]` terminator
    Done,
    /// Nothing to yield (keep-alive, role-only chunk, or bad payload)
    Skip,
}

#[derive(Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Interpret the `data` of one event
///
/// Payloads that fail to parse are reported as `Skip`; one bad event never
/// ends the stream.
#[must_use]
pub fn parse_data(data: &str) -> SsePayload {
    let data = data.trim();
    if data == DONE_SENTINEL {
        return SsePayload::Done;
    }

    match serde_json::from_str::<ChunkPayload>(data) {
        Ok(payload) => payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|content| !content.is_empty())
            .map_or(SsePayload::Skip, SsePayload::Delta),
        Err(e) => {
            tracing::debug!(error = %e, data = %data, "Skipping unparseable stream event");
            SsePayload::Skip
        }
    }
}
