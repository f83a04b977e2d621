//! LLM Backend Traits
//!
//! Trait definitions shared by every back-end. A back-end turns a prompt into a
//! lazy sequence of [`StreamChunk`]s; the task layer drives that sequence and
//! never needs to know which wire format produced it.
//!
//! # Design Philosophy
//!
//! The [`StreamProducer`] trait is pull-based: `stream()` returns a `Stream`
//! that issues its network call on the first poll and suspends between chunks.
//! Cancellation travels as a [`CancellationToken`], separate from the error
//! channel.

use std::pin::Pin;

use futures::Stream;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Event tag attached to the final chunk of a successful event-stream response
pub const DONE_EVENT: &str = "done";

/// Normalized unit exchanged between parsers, producers and the task layer
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StreamChunk {
    /// Incremental text (may be empty)
    pub text: String,
    /// True only on the final chunk of a successful stream
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub done: bool,
    /// Back-end specific tag, opaque to the core
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Decoded source record, kept for diagnostics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl StreamChunk {
    /// Create a content chunk
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// The chunk produced for an event-stream completion marker
    #[must_use]
    pub fn finished() -> Self {
        Self {
            text: String::new(),
            done: true,
            event: Some(DONE_EVENT.to_string()),
            raw: None,
        }
    }

    /// Set the done flag
    #[must_use]
    pub fn with_done(mut self, done: bool) -> Self {
        self.done = done;
        self
    }

    /// Attach the decoded source record
    #[must_use]
    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = Some(raw);
        self
    }
}

/// Errors raised by back-ends after a task exists
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Upstream answered with a non-success status
    #[error("{provider} request failed: {status} {body}")]
    UpstreamRequestFailed {
        /// Display name of the provider
        provider: &'static str,
        /// HTTP status code
        status: u16,
        /// Best-effort response body
        body: String,
    },

    /// A wire record could not be decoded
    #[error("malformed {format} payload: {source}")]
    MalformedPayload {
        /// Wire format that failed ("event-stream" or "ndjson")
        format: &'static str,
        /// The JSON error
        source: serde_json::Error,
    },

    /// The configured endpoint is not a usable URL
    #[error("invalid endpoint {url}: {reason}")]
    InvalidEndpoint {
        /// The offending URL
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// Network failure while sending the request or reading the body
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Lazy, cancellable, non-restartable sequence of chunks
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, BackendError>> + Send>>;

/// A back-end capable of streaming a generation
///
/// Implement this trait to add a back-end. The task layer only ever sees
/// `dyn StreamProducer`.
pub trait StreamProducer: Send + Sync {
    /// Backend display name (e.g. "OpenAI", "Ollama")
    fn name(&self) -> &'static str;

    /// Start streaming a response to `prompt`
    ///
    /// Nothing happens until the returned stream is polled. If `cancel` is
    /// already triggered at that point, no request is issued and the stream
    /// ends empty. Cancellation mid-stream ends the stream without an error.
    fn stream(&self, prompt: &str, cancel: CancellationToken) -> ChunkStream;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finished_chunk() {
        let chunk = StreamChunk::finished();
        assert_eq!(chunk.text, "");
        assert!(chunk.done);
        assert_eq!(chunk.event.as_deref(), Some("done"));
        assert!(chunk.raw.is_none());
    }

    #[test]
    fn test_chunk_serialization_skips_defaults() {
        let json = serde_json::to_value(StreamChunk::text("hi")).unwrap();
        assert_eq!(json, serde_json::json!({ "text": "hi" }));
    }

    #[test]
    fn test_upstream_error_display() {
        let err = BackendError::UpstreamRequestFailed {
            provider: "OpenAI",
            status: 401,
            body: "bad key".to_string(),
        };
        assert_eq!(err.to_string(), "OpenAI request failed: 401 bad key");
    }
}
