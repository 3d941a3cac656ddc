//! TOML Configuration File Support
//!
//! Centralized configuration loading for the voice conductor, supporting a
//! TOML file at `~/.config/voice-conductor/conductor.toml`.
//!
//! # Configuration Priority
//!
//! Values are applied with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0:8080"
//! max_connections = 100
//! max_message_size = 65536
//!
//! [completion]
//! base_url = "https://api.fireworks.ai/inference/v1"
//! model = "accounts/fireworks/models/kimi-k2-instruct-0905"
//! temperature = 0.6
//! request_timeout_secs = 30
//!
//! [session]
//! max_context_messages = 0
//! ```
//!
//! # Environment Variables
//!
//! - `FIREWORKS_API_KEY`: bearer token for the completion endpoint (required)
//! - `VOICE_CONDUCTOR_BIND`: listen address
//! - `VOICE_CONDUCTOR_MODEL`: model identifier
//! - `VOICE_CONDUCTOR_BASE_URL`: completion endpoint base URL
//! - `VOICE_CONDUCTOR_TIMEOUT_SECS`: per-request deadline
//! - `VOICE_CONDUCTOR_SYSTEM_PROMPT`: system instruction
//! - `VOICE_CONDUCTOR_MAX_CONTEXT`: history entries sent upstream (0 = all)

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API key environment variable
pub const API_KEY_ENV: &str = "FIREWORKS_API_KEY";

/// Placeholder value shipped in sample environments
const API_KEY_PLACEHOLDER: &str = "your-fireworks-api-key-here";

/// Default system instruction for spoken replies
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful voice assistant.

CRITICAL RULES FOR VOICE:
- Keep responses EXTREMELY SHORT (1-2 sentences maximum)
- Be conversational and natural
- No markdown, emojis, or special formatting
- Your output will be spoken aloud
- Get straight to the point
- Sound like a real person talking";

/// Reply used when the model produced no text
pub const DEFAULT_FALLBACK_REPLY: &str = "I'm here to help. What would you like to know?";

/// Reply used when the completion request failed
pub const DEFAULT_APOLOGY_REPLY: &str = "Sorry, I had a technical issue. Could you repeat that?";

/// Default limit for one inbound WebSocket message (64 KiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Runtime Settings
// =============================================================================

/// Socket server settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerSettings {
    /// Address to listen on
    pub bind_address: String,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Largest inbound WebSocket message, in bytes
    pub max_message_size: usize,
    /// Per-connection outbound channel capacity
    pub channel_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            max_connections: 100,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            channel_capacity: 256,
        }
    }
}

/// Completion endpoint settings
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionSettings {
    /// Endpoint base URL (`/chat/completions` is appended)
    pub base_url: String,
    /// Model identifier
    pub model: String,
    /// Maximum tokens in a response
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling
    pub top_p: f32,
    /// Top-k sampling
    pub top_k: u32,
    /// Presence penalty
    pub presence_penalty: f32,
    /// Frequency penalty
    pub frequency_penalty: f32,
    /// Deadline for one streamed response
    pub request_timeout: Duration,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.fireworks.ai/inference/v1".to_string(),
            model: "accounts/fireworks/models/kimi-k2-instruct-0905".to_string(),
            max_tokens: 32768,
            temperature: 0.6,
            top_p: 1.0,
            top_k: 40,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Per-session conversation settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConductorConfig {
    /// System instruction prepended to every request
    pub system_prompt: String,
    /// History entries sent upstream (0 = all)
    pub max_context_messages: usize,
    /// Reply recorded when the model returns nothing
    pub fallback_reply: String,
    /// Reply spoken when the request fails
    pub apology_reply: String,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_context_messages: 0,
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
            apology_reply: DEFAULT_APOLOGY_REPLY.to_string(),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Server section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Address to listen on
    pub bind_address: Option<String>,
    /// Maximum number of concurrent connections
    pub max_connections: Option<usize>,
    /// Largest inbound message in bytes
    pub max_message_size: Option<usize>,
    /// Per-connection outbound channel capacity
    pub channel_capacity: Option<usize>,
}

/// Completion section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionToml {
    /// Endpoint base URL
    pub base_url: Option<String>,
    /// Model identifier
    pub model: Option<String>,
    /// Maximum tokens in a response
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Nucleus sampling
    pub top_p: Option<f32>,
    /// Top-k sampling
    pub top_k: Option<u32>,
    /// Presence penalty
    pub presence_penalty: Option<f32>,
    /// Frequency penalty
    pub frequency_penalty: Option<f32>,
    /// Deadline for one streamed response, in seconds
    pub request_timeout_secs: Option<u64>,
}

/// Session section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToml {
    /// System instruction
    pub system_prompt: Option<String>,
    /// History entries sent upstream (0 = all)
    pub max_context_messages: Option<usize>,
    /// Reply recorded when the model returns nothing
    pub fallback_reply: Option<String>,
    /// Reply spoken when the request fails
    pub apology_reply: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorToml {
    /// Server configuration section
    pub server: ServerToml,
    /// Completion configuration section
    pub completion: CompletionToml,
    /// Session configuration section
    pub session: SessionToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Complete configuration for the daemon
#[derive(Clone, Debug)]
pub struct ConductorConfigFile {
    /// Socket server settings
    pub server: ServerSettings,
    /// Completion endpoint settings
    pub completion: CompletionSettings,
    /// Per-session settings
    pub conductor: ConductorConfig,
    /// Bearer token for the completion endpoint
    pub api_key: Option<String>,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    /// Highest-priority source that contributed a value
    source: ConfigSource,
}

impl Default for ConductorConfigFile {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            completion: CompletionSettings::default(),
            conductor: ConductorConfig::default(),
            api_key: None,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ConductorConfigFile {
    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Apply command-line overrides (highest priority)
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        let mut applied = false;
        if let Some(ref bind) = overrides.bind_address {
            self.server.bind_address = bind.clone();
            applied = true;
        }
        if let Some(ref model) = overrides.model {
            self.completion.model = model.clone();
            applied = true;
        }
        if let Some(ref base_url) = overrides.base_url {
            self.completion.base_url = base_url.clone();
            applied = true;
        }
        if applied {
            self.source = ConfigSource::Cli;
        }
    }

    /// Check that the configuration can run a server
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` naming the first offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.api_key.as_deref().map(str::trim) {
            None | Some("") | Some(API_KEY_PLACEHOLDER) => {
                return Err(ConfigError::ValidationError(format!(
                    "{API_KEY_ENV} is not set"
                )));
            }
            Some(_) => {}
        }
        if self.server.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "server.max_connections must be at least 1".to_string(),
            ));
        }
        if self.server.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "server.channel_capacity must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.completion.temperature) {
            return Err(ConfigError::ValidationError(format!(
                "completion.temperature {} is outside 0.0..=2.0",
                self.completion.temperature
            )));
        }
        if self.completion.request_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "completion.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Values supplied on the command line
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Listen address
    pub bind_address: Option<String>,
    /// Model identifier
    pub model: Option<String>,
    /// Completion endpoint base URL
    pub base_url: Option<String>,
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/voice-conductor/conductor.toml` or
/// `~/.config/voice-conductor/conductor.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("voice-conductor").join("conductor.toml"))
}

/// Load configuration from the default path and the process environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<ConductorConfigFile, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ConductorConfigFile, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with an explicit environment lookup
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<ConductorConfigFile, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ConductorConfigFile::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ConductorToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ConductorConfigFile, toml: &ConductorToml) {
    let server = &toml.server;
    if let Some(ref bind) = server.bind_address {
        config.server.bind_address = bind.clone();
    }
    if let Some(max) = server.max_connections {
        config.server.max_connections = max;
    }
    if let Some(size) = server.max_message_size {
        config.server.max_message_size = size;
    }
    if let Some(capacity) = server.channel_capacity {
        config.server.channel_capacity = capacity;
    }

    let completion = &toml.completion;
    if let Some(ref url) = completion.base_url {
        config.completion.base_url = url.clone();
    }
    if let Some(ref model) = completion.model {
        config.completion.model = model.clone();
    }
    if let Some(max_tokens) = completion.max_tokens {
        config.completion.max_tokens = max_tokens;
    }
    if let Some(temperature) = completion.temperature {
        config.completion.temperature = temperature;
    }
    if let Some(top_p) = completion.top_p {
        config.completion.top_p = top_p;
    }
    if let Some(top_k) = completion.top_k {
        config.completion.top_k = top_k;
    }
    if let Some(penalty) = completion.presence_penalty {
        config.completion.presence_penalty = penalty;
    }
    if let Some(penalty) = completion.frequency_penalty {
        config.completion.frequency_penalty = penalty;
    }
    if let Some(secs) = completion.request_timeout_secs {
        config.completion.request_timeout = Duration::from_secs(secs);
    }

    let session = &toml.session;
    if let Some(ref prompt) = session.system_prompt {
        config.conductor.system_prompt = prompt.clone();
    }
    if let Some(max) = session.max_context_messages {
        config.conductor.max_context_messages = max;
    }
    if let Some(ref reply) = session.fallback_reply {
        config.conductor.fallback_reply = reply.clone();
    }
    if let Some(ref reply) = session.apology_reply {
        config.conductor.apology_reply = reply.clone();
    }
}

/// Apply environment variable overrides
fn apply_env_config<F>(config: &mut ConductorConfigFile, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let mut applied = false;

    if let Some(key) = env(API_KEY_ENV) {
        config.api_key = Some(key);
    }
    if let Some(bind) = env("VOICE_CONDUCTOR_BIND") {
        config.server.bind_address = bind;
        applied = true;
    }
    if let Some(model) = env("VOICE_CONDUCTOR_MODEL") {
        config.completion.model = model;
        applied = true;
    }
    if let Some(url) = env("VOICE_CONDUCTOR_BASE_URL") {
        config.completion.base_url = url;
        applied = true;
    }
    if let Some(secs) = env("VOICE_CONDUCTOR_TIMEOUT_SECS") {
        match secs.parse::<u64>() {
            Ok(secs) => {
                config.completion.request_timeout = Duration::from_secs(secs);
                applied = true;
            }
            Err(e) => tracing::warn!(value = %secs, error = %e, "Ignoring invalid VOICE_CONDUCTOR_TIMEOUT_SECS"),
        }
    }
    if let Some(prompt) = env("VOICE_CONDUCTOR_SYSTEM_PROMPT") {
        config.conductor.system_prompt = prompt;
        applied = true;
    }
    if let Some(max) = env("VOICE_CONDUCTOR_MAX_CONTEXT") {
        match max.parse::<usize>() {
            Ok(max) => {
                config.conductor.max_context_messages = max;
                applied = true;
            }
            Err(e) => tracing::warn!(value = %max, error = %e, "Ignoring invalid VOICE_CONDUCTOR_MAX_CONTEXT"),
        }
    }

    if applied {
        config.source = ConfigSource::Env;
    }
}
