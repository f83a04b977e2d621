//! LLM Backend Integration
//!
//! Chunk decoders, framing and the streaming producers for each back-end.
//!
//! # Available Backends
//!
//! - **Ollama**: local server, newline-delimited JSON (default)
//! - **OpenAI**: remote chat completions, event-stream
//!
//! # Usage
//!
//! ```ignore
//! use futures::StreamExt;
//! use promptline_core::backend::{OllamaBackend, StreamProducer};
//! use tokio_util::sync::CancellationToken;
//!
//! let backend = OllamaBackend::default();
//! let mut chunks = backend.stream("Hello!", CancellationToken::new());
//! while let Some(chunk) = chunks.next().await {
//!     print!("{}", chunk?.text);
//! }
//! ```

mod decode;
mod framing;
mod http;
mod ollama;
mod openai;
mod selector;
mod sse;
mod traits;

pub use decode::{ChunkDecoder, EventStreamDecoder, LineDecoder};
pub use framing::{LineBuffer, Utf8Decoder};
pub use ollama::{line_chunks, OllamaBackend, DEFAULT_OLLAMA_BASE, DEFAULT_OLLAMA_MODEL};
pub use openai::{event_chunks, OpenAiBackend, DEFAULT_OPENAI_ENDPOINT, DEFAULT_OPENAI_MODEL};
pub use selector::{BackendSelector, DefaultBackends};
pub use sse::{SseEvent, SseFramer};
pub use traits::{BackendError, ChunkStream, StreamChunk, StreamProducer, DONE_EVENT};
