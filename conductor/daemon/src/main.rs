//! Voice Conductor Daemon - Sentence-Streamed Voice Server
//!
//! Entry point for the voice conductor. Voice surfaces (browser pages, phone
//! bridges, kiosks) connect over WebSocket, send finished transcripts, and
//! receive the model's answer one speakable sentence at a time.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (127.0.0.1:8080)
//! FIREWORKS_API_KEY=... voice-conductor
//!
//! # Custom listen address and model
//! voice-conductor --bind 0.0.0.0:9000 --model accounts/fireworks/models/llama-v3p1-8b-instruct
//!
//! # With config file
//! voice-conductor --config /etc/voice-conductor/conductor.toml
//!
//! # Verbose logging
//! RUST_LOG=debug voice-conductor
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown

mod server;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use server::DaemonServer;
use voice_conductor::config::{default_config_path, load_config_from_path, ConfigOverrides};

/// Voice Conductor - sentence-streamed voice conversation server
#[derive(Parser, Debug)]
#[command(name = "voice-conductor")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "VOICE_CONDUCTOR_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config)
    #[arg(short = 'b', long, value_name = "ADDR")]
    bind: Option<String>,

    /// Model identifier (overrides config)
    #[arg(short = 'm', long, value_name = "MODEL")]
    model: Option<String>,

    /// Completion endpoint base URL (overrides config)
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "VOICE_CONDUCTOR_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            bind_address: self.bind.clone(),
            model: self.model.clone(),
            base_url: self.base_url.clone(),
        }
    }
}

/// Initialize logging with the specified level
///
/// `RUST_LOG` takes precedence when set.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "voice_conductor_daemon={level},voice_conductor={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, initiating shutdown"),
        () = terminate => info!("Received SIGTERM, initiating shutdown"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!("Voice Conductor starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(config_path)
        .context("Failed to load configuration")?;
    config.apply_overrides(&args.overrides());
    config.validate().context("Invalid configuration")?;

    info!(
        source = ?config.source(),
        config_path = ?config.config_file_path,
        bind_address = %config.server.bind_address,
        model = %config.completion.model,
        "Configuration loaded"
    );

    let server = DaemonServer::new(config);
    let result = server.run(shutdown_signal()).await;

    match result {
        Ok(()) => {
            info!("Voice conductor stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Voice conductor stopped with error");
            Err(e)
        }
    }
}
