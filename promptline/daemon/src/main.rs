//! Promptline Daemon
//!
//! Hosting process for the promptline core. Desktop surfaces connect over a
//! Unix socket and exchange framed `BridgeRequest` / `BridgeMessage` JSON.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults ($XDG_RUNTIME_DIR/promptline/promptline.sock)
//! promptline-daemon
//!
//! # Custom socket path
//! promptline-daemon --socket-path /tmp/promptline.sock
//!
//! # With config file
//! promptline-daemon --config ~/.config/promptline/config.toml
//!
//! # Verbose logging
//! RUST_LOG=debug promptline-daemon
//! ```
//!
//! # Environment Variables
//!
//! - `PROMPTLINE_SOCKET`: Unix socket path
//! - `PROMPTLINE_CONFIG`: configuration file
//! - `OPENAI_API_KEY`, `OPENAI_MODEL`, `OPENAI_BASE_URL`: remote provider defaults
//! - `OLLAMA_BASE`, `OLLAMA_MODEL`: local provider defaults
//! - `RUST_LOG`: log filter
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: stop accepting, cancel running tasks, remove the socket

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use promptline_core::{
    load_config, load_config_from_path, ConfigOverrides, DefaultBackends, PromptlineConfig,
    TaskConductor, TaskNotification, TaskRegistry, UnixSocketServer,
};

/// Promptline daemon - streams LLM output to desktop surfaces
#[derive(Parser, Debug)]
#[command(name = "promptline-daemon")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Unix socket path for surface connections
    #[arg(short = 's', long, env = "PROMPTLINE_SOCKET", value_name = "PATH")]
    socket_path: Option<PathBuf>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "PROMPTLINE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Default Ollama base URL
    #[arg(long, value_name = "URL")]
    ollama_base: Option<String>,

    /// Default Ollama model
    #[arg(long, value_name = "MODEL")]
    ollama_model: Option<String>,

    /// Default OpenAI model
    #[arg(long, value_name = "MODEL")]
    openai_model: Option<String>,

    /// Log level used when `RUST_LOG` is not set
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref path) = self.socket_path {
            overrides = overrides.with_socket_path(path.clone());
        }
        if let Some(ref base) = self.ollama_base {
            overrides = overrides.with_ollama_base(base.clone());
        }
        if let Some(ref model) = self.ollama_model {
            overrides = overrides.with_ollama_model(model.clone());
        }
        if let Some(ref model) = self.openai_model {
            overrides = overrides.with_openai_model(model.clone());
        }
        overrides
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => tracing_subscriber::EnvFilter::new("warn")
            .add_directive(format!("promptline_core={level}").parse()?)
            .add_directive(format!("promptline_daemon={level}").parse()?),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
    Ok(())
}

fn load(args: &Args) -> Result<PromptlineConfig> {
    let mut config = match args.config {
        Some(ref path) => load_config_from_path(Some(path.clone())),
        None => load_config(),
    }
    .context("Failed to load configuration")?;

    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Conductor the socket server clones for each connection
///
/// Connections install their own sinks. The returned receiver is the base
/// sink and must be held for as long as the conductor is in use.
fn base_conductor(
    config: &PromptlineConfig,
    registry: Arc<TaskRegistry>,
) -> (TaskConductor, mpsc::Receiver<TaskNotification>) {
    let (tx, rx) = mpsc::channel(config.notification_capacity);
    let conductor = TaskConductor::new(
        registry,
        Arc::new(DefaultBackends::new(config.provider_defaults.clone())),
        tx,
    );
    (conductor, rx)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    info!(pid = std::process::id(), "Starting promptline daemon");

    let config = load(&args)?;
    let defaults = &config.provider_defaults;
    info!(
        source = %config.source(),
        socket = %config.socket_path.display(),
        ollama_base = %defaults.ollama_base,
        ollama_model = %defaults.ollama_model,
        openai_model = %defaults.openai_model,
        openai_key = defaults.openai_api_key.is_some(),
        "Configuration loaded"
    );

    let registry = TaskRegistry::shared();
    let (conductor, _base_notifications) = base_conductor(&config, Arc::clone(&registry));

    let server = UnixSocketServer::bind(config.socket_path.clone()).with_context(|| {
        format!(
            "Failed to bind socket {}. Check directory permissions.",
            config.socket_path.display()
        )
    })?;

    let shutdown = CancellationToken::new();
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating shutdown"),
        }
        signal_shutdown.cancel();
    });

    let result = server
        .serve(&conductor, config.notification_capacity, shutdown)
        .await;

    let cancelled = registry.cancel_all();
    info!(cancelled, "Cancelled running tasks");
    drop(server);
    info!("Daemon stopped");

    result.context("Socket server failed")
}
