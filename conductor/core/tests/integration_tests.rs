//! Integration tests for the voice pipeline
//!
//! These tests drive the session registry and Conductor together with a
//! scripted backend. Tests cover:
//! - Single-flight generation per session
//! - Failures still producing a spoken reply and a completion
//! - Isolation between concurrent sessions
//! - Teardown while a generation is in flight
//! - Layered configuration (file, environment, CLI)

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::NamedTempFile;
use tokio::sync::{mpsc, Semaphore};

use voice_conductor::config::{
    load_config_from_path, load_config_with_env, ConfigOverrides, ConfigSource,
    DEFAULT_APOLOGY_REPLY,
};
use voice_conductor::{
    CompletionBackend, CompletionError, CompletionRequest, ConductorConfig, ConductorMessage,
    ConnectionId, MessageRole, RouteOutcome, SessionRegistry, SessionState, StreamingToken,
    SurfaceEvent, TranscriptOutcome,
};

// =============================================================================
// Scripted Backend
// =============================================================================

/// Backend whose reply depends on the last user message
///
/// - Contains "wait": holds the stream until a permit is released
/// - Contains "fail": fails mid-stream
/// - Otherwise: answers in two sentences
struct ScriptedBackend {
    gate: Arc<Semaphore>,
}

impl ScriptedBackend {
    fn new() -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (
            Arc::new(Self {
                gate: Arc::clone(&gate),
            }),
            gate,
        )
    }
}

#[async_trait::async_trait]
impl CompletionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "Scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn send_streaming(&self, request: &CompletionRequest) -> mpsc::Receiver<StreamingToken> {
        let (tx, rx) = mpsc::channel(16);
        let prompt = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let gate = Arc::clone(&self.gate);

        tokio::spawn(async move {
            if prompt.contains("wait") {
                let Ok(permit) = gate.acquire().await else {
                    return;
                };
                permit.forget();
            }
            if prompt.contains("fail") {
                let _ = tx.send(StreamingToken::Token("I think".to_string())).await;
                let _ = tx
                    .send(StreamingToken::Failed(CompletionError::Network(
                        "connection reset".to_string(),
                    )))
                    .await;
                return;
            }
            let _ = tx
                .send(StreamingToken::Token(format!("You said {prompt}. Anything")))
                .await;
            let _ = tx.send(StreamingToken::Token(" else?".to_string())).await;
            let _ = tx.send(StreamingToken::Done).await;
        });

        rx
    }
}

fn registry() -> (SessionRegistry<ScriptedBackend>, Arc<Semaphore>) {
    let (backend, gate) = ScriptedBackend::new();
    (SessionRegistry::new(backend, ConductorConfig::default()), gate)
}

/// Open a session and consume its greeting
async fn open(
    registry: &SessionRegistry<ScriptedBackend>,
) -> (ConnectionId, mpsc::Receiver<ConductorMessage>) {
    let (tx, mut rx) = mpsc::channel(64);
    let id = registry.open(tx).await;
    let greeting = rx.recv().await.unwrap();
    assert_eq!(greeting.kind(), "connected");
    (id, rx)
}

/// Collect messages up to and including `agent_complete`
async fn until_complete(rx: &mut mpsc::Receiver<ConductorMessage>) -> Vec<ConductorMessage> {
    let mut messages = Vec::new();
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for agent_complete")
            .expect("sink closed before agent_complete");
        let done = msg.kind() == "agent_complete";
        messages.push(msg);
        if done {
            return messages;
        }
    }
}

async fn wait_for_state(registry: &SessionRegistry<ScriptedBackend>, id: ConnectionId, state: SessionState) {
    let conductor = registry.conductor(id).unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while conductor.state() != state {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("session never reached expected state");
}

fn kinds(messages: &[ConductorMessage]) -> Vec<&'static str> {
    messages.iter().map(ConductorMessage::kind).collect()
}

fn transcript(text: &str) -> SurfaceEvent {
    SurfaceEvent::Transcript {
        text: text.to_string(),
    }
}

// =============================================================================
// Test 1: Event Ordering
// =============================================================================

#[tokio::test]
async fn test_transcript_produces_ordered_events() {
    let (registry, _gate) = registry();
    let (id, mut rx) = open(&registry).await;

    assert_eq!(registry.route(id, transcript("hello")).await, RouteOutcome::Dispatched);
    let messages = until_complete(&mut rx).await;

    assert_eq!(
        kinds(&messages),
        vec![
            "transcript_received",
            "tts_ready",
            "agent_chunk",
            "agent_chunk",
            "tts_ready",
            "agent_complete",
        ]
    );

    let sentences: Vec<&str> = messages
        .iter()
        .filter_map(|m| match m {
            ConductorMessage::TtsReady { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(sentences, vec!["You said hello.", "Anything else?"]);

    match messages.last().unwrap() {
        ConductorMessage::AgentComplete { text, latency, .. } => {
            assert_eq!(text, "You said hello. Anything else?");
            assert!(latency.is_some());
        }
        other => panic!("expected AgentComplete, got {other:?}"),
    }
}

// =============================================================================
// Test 2: Single-Flight
// =============================================================================

#[tokio::test]
async fn test_second_transcript_while_busy_is_dropped() {
    let (registry, gate) = registry();
    let (id, mut rx) = open(&registry).await;

    assert_eq!(registry.route(id, transcript("please wait")).await, RouteOutcome::Dispatched);
    wait_for_state(&registry, id, SessionState::Processing).await;

    assert_eq!(registry.route(id, transcript("second")).await, RouteOutcome::Ignored);

    gate.add_permits(1);
    let messages = until_complete(&mut rx).await;
    wait_for_state(&registry, id, SessionState::Idle).await;

    let acks = messages
        .iter()
        .filter(|m| m.kind() == "transcript_received")
        .count();
    assert_eq!(acks, 1);

    let history = registry.conductor(id).unwrap().history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].text, "please wait");
    assert!(rx.try_recv().is_err(), "dropped transcript must produce no events");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_back_to_back_transcripts_answer_the_first() {
    let (registry, _gate) = registry();
    let (id, mut rx) = open(&registry).await;

    // No await point lets the first generation start before the second route
    let outcomes = tokio::spawn({
        let registry = registry.clone();
        async move {
            let first = registry.route(id, transcript("first")).await;
            let second = registry.route(id, transcript("second")).await;
            (first, second)
        }
    })
    .await
    .unwrap();
    assert_eq!(outcomes, (RouteOutcome::Dispatched, RouteOutcome::Ignored));

    let messages = until_complete(&mut rx).await;
    let acks: Vec<&str> = messages
        .iter()
        .filter_map(|m| match m {
            ConductorMessage::TranscriptReceived { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(acks, vec!["first"]);

    match messages.last().unwrap() {
        ConductorMessage::AgentComplete { text, .. } => {
            assert_eq!(text, "You said first. Anything else?");
        }
        other => panic!("expected AgentComplete, got {other:?}"),
    }

    wait_for_state(&registry, id, SessionState::Idle).await;
    let history = registry.conductor(id).unwrap().history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].text, "first");
}

#[tokio::test]
async fn test_concurrent_calls_on_one_conductor_are_single_flight() {
    let (registry, gate) = registry();
    let (id, mut rx) = open(&registry).await;
    let conductor = registry.conductor(id).unwrap();

    let (first, second, ()) = tokio::join!(
        conductor.handle_transcript("please wait"),
        conductor.handle_transcript("me too"),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            gate.add_permits(1);
        }
    );

    assert_eq!(first, TranscriptOutcome::Completed);
    assert_eq!(second, TranscriptOutcome::IgnoredBusy);
    assert_eq!(conductor.state(), SessionState::Idle);
    assert_eq!(kinds(&until_complete(&mut rx).await)[0], "transcript_received");

    // Idle again, so the next transcript is accepted
    assert_eq!(conductor.handle_transcript("again").await, TranscriptOutcome::Completed);
}

#[tokio::test]
async fn test_ping_is_answered_while_processing() {
    let (registry, gate) = registry();
    let (id, mut rx) = open(&registry).await;

    registry.route(id, transcript("please wait")).await;
    wait_for_state(&registry, id, SessionState::Processing).await;

    assert_eq!(registry.route(id, SurfaceEvent::Ping).await, RouteOutcome::Ponged);

    // Only the ack can precede the pong; generation is still gated
    let mut before_pong = Vec::new();
    loop {
        let msg = rx.recv().await.unwrap();
        if msg.kind() == "pong" {
            break;
        }
        before_pong.push(msg.kind());
    }
    assert_eq!(before_pong, vec!["transcript_received"]);
    assert_eq!(registry.summary().processing, 1);

    gate.add_permits(1);
    until_complete(&mut rx).await;
}

// =============================================================================
// Test 3: Failure Still Completes
// =============================================================================

#[tokio::test]
async fn test_failure_still_completes() {
    let (registry, _gate) = registry();
    let (id, mut rx) = open(&registry).await;

    registry.route(id, transcript("please fail")).await;
    let messages = until_complete(&mut rx).await;

    let tts: Vec<&str> = messages
        .iter()
        .filter_map(|m| match m {
            ConductorMessage::TtsReady { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(tts, vec![DEFAULT_APOLOGY_REPLY]);

    assert!(matches!(
        messages.last().unwrap(),
        ConductorMessage::AgentComplete { text, latency: None, .. } if text == DEFAULT_APOLOGY_REPLY
    ));

    wait_for_state(&registry, id, SessionState::Idle).await;
    let history = registry.conductor(id).unwrap().history();
    assert_eq!(history[1].role, MessageRole::Assistant);
    assert_eq!(history[1].text, DEFAULT_APOLOGY_REPLY);
}

// =============================================================================
// Test 4: Isolation
// =============================================================================

#[tokio::test]
async fn test_sessions_are_isolated() {
    let (registry, gate) = registry();
    let (slow, mut slow_rx) = open(&registry).await;
    let (fast, mut fast_rx) = open(&registry).await;

    registry.route(slow, transcript("please wait")).await;
    wait_for_state(&registry, slow, SessionState::Processing).await;

    // The fast session completes while the slow one is still held
    registry.route(fast, transcript("quick")).await;
    until_complete(&mut fast_rx).await;
    assert_eq!(
        registry.conductor(slow).unwrap().state(),
        SessionState::Processing
    );

    gate.add_permits(1);
    until_complete(&mut slow_rx).await;

    let slow_history = registry.conductor(slow).unwrap().history();
    let fast_history = registry.conductor(fast).unwrap().history();
    assert_eq!(slow_history[0].text, "please wait");
    assert_eq!(fast_history[0].text, "quick");
    assert!(fast_history.iter().all(|e| !e.text.contains("wait")));
}

// =============================================================================
// Test 5: Teardown
// =============================================================================

#[tokio::test]
async fn test_close_mid_generation_discards_events() {
    let (registry, gate) = registry();
    let (id, mut rx) = open(&registry).await;
    let conductor = registry.conductor(id).unwrap();

    registry.route(id, transcript("please wait")).await;
    wait_for_state(&registry, id, SessionState::Processing).await;
    assert_eq!(rx.recv().await.unwrap().kind(), "transcript_received");

    assert!(registry.close(id));
    gate.add_permits(1);

    assert!(conductor.is_closed());
    assert!(conductor.history().is_empty());
    assert!(!registry.contains(id));
    assert_eq!(registry.route(id, SurfaceEvent::Ping).await, RouteOutcome::UnknownSession);

    // Nothing further reaches the sink
    let late = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(!matches!(late, Ok(Some(_))), "unexpected event after close: {late:?}");
}

// =============================================================================
// Test 6: Configuration Layers
// =============================================================================

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

fn config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_config_file_values_apply() {
    let file = config_file(
        r#"
[server]
bind_address = "0.0.0.0:9100"
max_connections = 10

[completion]
model = "file-model"
temperature = 0.2
request_timeout_secs = 12

[session]
system_prompt = "Answer in one sentence."
max_context_messages = 6
"#,
    );

    let config = load_config_with_env(Some(file.path().to_path_buf()), env_from(&[])).unwrap();

    assert_eq!(config.server.bind_address, "0.0.0.0:9100");
    assert_eq!(config.server.max_connections, 10);
    assert_eq!(config.completion.model, "file-model");
    assert!((config.completion.temperature - 0.2).abs() < f32::EPSILON);
    assert_eq!(config.completion.request_timeout, Duration::from_secs(12));
    assert_eq!(config.conductor.system_prompt, "Answer in one sentence.");
    assert_eq!(config.conductor.max_context_messages, 6);
    assert_eq!(config.source(), ConfigSource::File);
}

#[test]
fn test_config_override_priority() {
    let file = config_file(
        r#"
[server]
bind_address = "0.0.0.0:9100"

[completion]
model = "file-model"
"#,
    );

    let env = env_from(&[
        ("VOICE_CONDUCTOR_MODEL", "env-model"),
        ("VOICE_CONDUCTOR_BIND", "127.0.0.1:9200"),
        ("FIREWORKS_API_KEY", "env-key"),
    ]);
    let mut config = load_config_with_env(Some(file.path().to_path_buf()), env).unwrap();

    // Environment beats file
    assert_eq!(config.completion.model, "env-model");
    assert_eq!(config.server.bind_address, "127.0.0.1:9200");
    assert_eq!(config.source(), ConfigSource::Env);

    // CLI beats environment
    config.apply_overrides(&ConfigOverrides {
        model: Some("cli-model".to_string()),
        ..ConfigOverrides::default()
    });
    assert_eq!(config.completion.model, "cli-model");
    assert_eq!(config.server.bind_address, "127.0.0.1:9200");
    assert_eq!(config.source(), ConfigSource::Cli);

    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_api_key_fails_validation() {
    let config = load_config_with_env(None, env_from(&[])).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("FIREWORKS_API_KEY"));
}

#[test]
fn test_missing_config_file_uses_defaults() {
    let nonexistent_path = std::path::PathBuf::from("/nonexistent/path/conductor.toml");
    let config = load_config_from_path(Some(nonexistent_path)).unwrap();

    assert_eq!(config.server.max_connections, 100);
    assert_eq!(config.server.max_message_size, 64 * 1024);
    assert!(config.config_file_path.is_none());
}

#[test]
fn test_invalid_toml_is_an_error() {
    let file = config_file("[server\nbind_address = ");
    assert!(load_config_with_env(Some(file.path().to_path_buf()), env_from(&[])).is_err());
}
