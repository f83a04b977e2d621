//! Promptline Core - Streaming Prompt Tasks over Local and Remote LLMs
//!
//! This crate turns a prompt into a cancellable task whose model output is
//! streamed back chunk by chunk. It knows nothing about windows or forms: a
//! surface talks to it through a bridge and renders what it is sent.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            Surfaces                              │
//! │        desktop shell │ CLI │ tests (in-process or socket)        │
//! │                                │                                 │
//! │               BridgeRequest (up) / BridgeMessage (down)          │
//! └────────────────────────────────┼─────────────────────────────────┘
//!                                  │
//! ┌────────────────────────────────┼─────────────────────────────────┐
//! │                          PROMPTLINE CORE                         │
//! │  ┌─────────────────────────────┴──────────────────────────────┐  │
//! │  │ transport: frame codec, serve_connection, socket, channels │  │
//! │  └─────────────────────────────┬──────────────────────────────┘  │
//! │  ┌─────────────────────────────┴──────────────────────────────┐  │
//! │  │ TaskConductor: start / cancel, TaskRegistry, drive loops   │  │
//! │  └─────────────────────────────┬──────────────────────────────┘  │
//! │  ┌─────────────────────────────┴──────────────────────────────┐  │
//! │  │ backend: StreamProducer (OpenAI, Ollama)                   │  │
//! │  │          framing (UTF-8, lines, event-stream) + decoders   │  │
//! │  └────────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`TaskConductor`]: starts and cancels tasks, emits [`TaskNotification`]s
//! - [`StreamProducer`]: one back-end's prompt-to-chunks stream
//! - [`StreamChunk`]: the normalized unit every back-end produces
//! - [`ProviderOptions`]: per-request provider, model, base and credential
//! - [`BridgeRequest`] / [`BridgeMessage`]: the surface wire protocol
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use promptline_core::{
//!     DefaultBackends, ProviderDefaults, ProviderOptions, TaskConductor, TaskRegistry,
//! };
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (tx, mut rx) = mpsc::channel(100);
//!     let conductor = TaskConductor::new(
//!         TaskRegistry::shared(),
//!         Arc::new(DefaultBackends::new(ProviderDefaults::default())),
//!         tx,
//!     );
//!
//!     let _task_id = conductor.start("Why is the sky blue?", &ProviderOptions::new()).unwrap();
//!     while let Some(notification) = rx.recv().await {
//!         if notification.is_terminal() {
//!             break;
//!         }
//!         print!("{}", notification.chunk.as_text().unwrap_or_default());
//!     }
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: chunk decoders, stream framing and the HTTP producers
//! - [`options`]: provider options and their resolution against defaults
//! - [`tasks`]: task identifiers, states and the cancellation registry
//! - [`conductor`]: the task lifecycle manager
//! - [`messages`]: notifications and replies sent to surfaces
//! - [`events`]: requests received from surfaces
//! - [`transport`]: bridges (in-process, Unix socket) and the frame codec
//! - [`config`]: TOML / environment configuration for hosting processes

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod conductor;
pub mod config;
pub mod events;
pub mod messages;
pub mod options;
pub mod tasks;
pub mod transport;

// Re-exports for convenience
pub use backend::{
    BackendError, BackendSelector, ChunkStream, DefaultBackends, OllamaBackend, OpenAiBackend,
    StreamChunk, StreamProducer,
};
pub use conductor::TaskConductor;
pub use events::BridgeRequest;
pub use messages::{BridgeMessage, CancelResult, NotificationChunk, TaskNotification};
pub use options::{Provider, ProviderDefaults, ProviderOptions, ResolvedProvider};
pub use tasks::{TaskError, TaskId, TaskOutcome, TaskRegistry, TaskStatus};
pub use transport::{serve_connection, InProcessBridge, TransportError};

#[cfg(unix)]
pub use transport::{UnixSocketClient, UnixSocketServer};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, PromptlineConfig,
};
