//! OpenAI Backend Implementation
//!
//! Remote back-end speaking the chat completions API with `stream: true`.
//!
//! # Wire format
//!
//! ```text
//! POST {endpoint}/v1/chat/completions
//! Authorization: Bearer <key>
//!
//! data: {"choices":[{"delta":{"content":"Hi"}}]}
//!
//! data: [DONE]
//! ```

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::decode::{ChunkDecoder, EventStreamDecoder};
use super::framing::Utf8Decoder;
use super::http::open_stream;
use super::sse::SseFramer;
use super::traits::{BackendError, ChunkStream, StreamChunk, StreamProducer};

/// Default API host
pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com";

/// Default chat model
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

const PROVIDER: &str = "OpenAI";

/// OpenAI chat completions client
#[derive(Clone)]
pub struct OpenAiBackend {
    /// Scheme and host, without the `/v1/...` path
    endpoint: String,
    /// Bearer credential
    api_key: String,
    /// Model identifier
    model: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiBackend {
    /// Create a backend against the public API
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_key, model)
    }

    /// Create a backend sharing an existing HTTP client
    pub fn with_client(
        http_client: reqwest::Client,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: DEFAULT_OPENAI_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            http_client,
        }
    }

    /// Point at a different API host (compatible servers, tests)
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Model this backend requests
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.endpoint.trim_end_matches('/')
        )
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "stream": true,
            "messages": [{ "role": "user", "content": prompt }],
        })
    }
}

impl StreamProducer for OpenAiBackend {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn stream(&self, prompt: &str, cancel: CancellationToken) -> ChunkStream {
        let request = self
            .http_client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt));

        Box::pin(async_stream::stream! {
            let response = match open_stream(request, PROVIDER, &cancel).await {
                Ok(Some(response)) => response,
                Ok(None) => return,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut chunks = std::pin::pin!(event_chunks(response.bytes_stream(), cancel));
            while let Some(item) = chunks.next().await {
                yield item;
            }
        })
    }
}

/// Turn an event-stream body into chunks
///
/// Stops after the `[DONE]` chunk, after the first error, or as soon as
/// `cancel` fires.
pub fn event_chunks<S>(
    body: S,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<StreamChunk, BackendError>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    async_stream::stream! {
        let mut body = std::pin::pin!(body);
        let mut text = Utf8Decoder::new();
        let mut framer = SseFramer::new();

        loop {
            let fragment = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                fragment = body.next() => fragment,
            };

            let bytes = match fragment {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    yield Err(BackendError::Transport(e));
                    return;
                }
                None => break,
            };

            framer.feed(&text.decode(&bytes));
            while let Some(event) = framer.next_event() {
                tracing::trace!(event = ?event.event, len = event.data.len(), "event-stream record");
                match EventStreamDecoder.decode(&event.data) {
                    Ok(Some(chunk)) => {
                        let done = chunk.done;
                        yield Ok(chunk);
                        if done {
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }
    }
}
