//! Ollama Backend Implementation
//!
//! LLM backend for Ollama (local LLM server).
//!
//! # Ollama API
//!
//! Uses the `/api/generate` endpoint with `stream: true`. The response body is
//! newline-delimited JSON:
//!
//! ```text
//! {"response":"Hel","done":false}
//! {"response":"lo","done":false}
//! {"response":"","done":true,"eval_count":2}
//! ```

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Url;
use tokio_util::sync::CancellationToken;

use super::decode::{ChunkDecoder, LineDecoder};
use super::framing::{LineBuffer, Utf8Decoder};
use super::http::open_stream;
use super::traits::{BackendError, ChunkStream, StreamChunk, StreamProducer};

/// Default Ollama server address
pub const DEFAULT_OLLAMA_BASE: &str = "http://127.0.0.1:11434";

/// Default local model
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.1";

const PROVIDER: &str = "Ollama";

/// Ollama backend client
#[derive(Clone, Debug)]
pub struct OllamaBackend {
    /// Base URL of the server
    base: String,
    /// Model identifier
    model: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(base: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base, model)
    }

    /// Create a backend sharing an existing HTTP client
    pub fn with_client(
        http_client: reqwest::Client,
        base: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base: base.into(),
            model: model.into(),
            http_client,
        }
    }

    /// Model this backend requests
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get generate endpoint URL
    ///
    /// `/api/generate` is absolute, so any path on the base URL is replaced.
    fn generate_url(&self) -> Result<Url, BackendError> {
        let invalid = |reason: String| BackendError::InvalidEndpoint {
            url: self.base.clone(),
            reason,
        };
        Url::parse(&self.base)
            .and_then(|base| base.join("/api/generate"))
            .map_err(|e| invalid(e.to_string()))
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": true,
        })
    }
}

impl Default for OllamaBackend {
    fn default() -> Self {
        Self::new(DEFAULT_OLLAMA_BASE, DEFAULT_OLLAMA_MODEL)
    }
}

impl StreamProducer for OllamaBackend {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn stream(&self, prompt: &str, cancel: CancellationToken) -> ChunkStream {
        let request = self
            .generate_url()
            .map(|url| self.http_client.post(url).json(&self.request_body(prompt)));

        Box::pin(async_stream::stream! {
            let request = match request {
                Ok(request) => request,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let response = match open_stream(request, PROVIDER, &cancel).await {
                Ok(Some(response)) => response,
                Ok(None) => return,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut chunks = std::pin::pin!(line_chunks(response.bytes_stream(), cancel));
            while let Some(item) = chunks.next().await {
                yield item;
            }
        })
    }
}

/// Turn a newline-delimited JSON body into chunks
///
/// Stops right after a chunk with `done` set, after the first error, or as
/// soon as `cancel` fires.
pub fn line_chunks<S>(
    body: S,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<StreamChunk, BackendError>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    async_stream::stream! {
        let mut body = std::pin::pin!(body);
        let mut text = Utf8Decoder::new();
        let mut lines = LineBuffer::new();

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

            lines.push(&text.decode(&bytes));
            while let Some(line) = lines.next_line() {
                match LineDecoder.decode(line.trim()) {
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

        // Known leniency: an unterminated last record is parsed as a final
        // chunk even though no `done` marker arrived. A truncated body can
        // therefore surface as a short, successful chunk.
        lines.push(&text.finish());
        let remainder = lines.take_remainder();
        match LineDecoder.decode(remainder.trim()) {
            Ok(Some(chunk)) => {
                tracing::debug!(done = chunk.done, "Flushed trailing NDJSON record");
                yield Ok(chunk);
            }
            Ok(None) => {}
            Err(e) => yield Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fragments(body: &[u8], size: usize) -> Vec<Result<Bytes, reqwest::Error>> {
        body.chunks(size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect()
    }

    async fn collect(body: &str, size: usize) -> Vec<StreamChunk> {
        line_chunks(
            futures::stream::iter(fragments(body.as_bytes(), size)),
            CancellationToken::new(),
        )
        .map(|item| item.unwrap())
        .collect()
        .await
    }

    const THREE_LINES: &str = "{\"response\":\"Hel\",\"done\":false}\n\
                               {\"response\":\"lo\",\"done\":false}\n\
                               {\"response\":\"\",\"done\":true}\n";

    #[test]
    fn test_ollama_backend_creation() {
        let backend = OllamaBackend::default();
        assert_eq!(backend.base, "http://127.0.0.1:11434");
        assert_eq!(backend.model(), "llama3.1");
        assert_eq!(
            backend.generate_url().unwrap().as_str(),
            "http://127.0.0.1:11434/api/generate"
        );
    }

    #[test]
    fn test_generate_url_replaces_base_path() {
        let backend = OllamaBackend::new("http://gpu-box:8080/some/prefix/", "m");
        assert_eq!(
            backend.generate_url().unwrap().as_str(),
            "http://gpu-box:8080/api/generate"
        );
    }

    #[test]
    fn test_generate_url_invalid_base() {
        let backend = OllamaBackend::new("not a url", "m");
        assert!(matches!(
            backend.generate_url(),
            Err(BackendError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_request_body() {
        let backend = OllamaBackend::new(DEFAULT_OLLAMA_BASE, "qwen3:8b");
        assert_eq!(
            backend.request_body("hi"),
            serde_json::json!({ "model": "qwen3:8b", "prompt": "hi", "stream": true })
        );
    }

    #[tokio::test]
    async fn test_three_lines() {
        let chunks = collect(THREE_LINES, THREE_LINES.len()).await;
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["Hel", "lo", ""]);
        assert_eq!(
            chunks.iter().map(|c| c.done).collect::<Vec<_>>(),
            vec![false, false, true]
        );
    }

    #[tokio::test]
    async fn test_stops_at_done_without_consuming_more() {
        let consumed = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = consumed.clone();
        let body = futures::stream::iter(vec![
            "{\"response\":\"a\",\"done\":true}\n",
            "{\"response\":\"never\",\"done\":false}\n",
        ])
        .map(move |s| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok::<_, reqwest::Error>(Bytes::from(s))
        });

        let chunks: Vec<_> = line_chunks(body, CancellationToken::new()).collect().await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(consumed.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fragmentation_invariance() {
        let body = "{\"response\":\"caf\u{e9} \u{1f375}\",\"done\":false}\r\n\n  \n\
                    {\"response\":\"!\",\"done\":false}\n\
                    {\"response\":\"\",\"done\":true}\n";
        let whole = collect(body, body.len()).await;
        assert_eq!(whole.len(), 3);
        assert_eq!(whole[0].text, "caf\u{e9} \u{1f375}");

        for size in [1, 2, 5, 16] {
            assert_eq!(collect(body, size).await, whole, "fragment size {size}");
        }
    }

    #[tokio::test]
    async fn test_flushes_unterminated_record() {
        let body = "{\"response\":\"a\",\"done\":false}\n{\"response\":\"b\"}";
        let chunks = collect(body, 3).await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text, "b");
        assert!(!chunks[1].done);
    }

    #[tokio::test]
    async fn test_ends_without_done_marker() {
        let body = "{\"response\":\"a\",\"done\":false}\n";
        let chunks = collect(body, body.len()).await;
        assert_eq!(chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_while_body_pending() {
        let cancel = CancellationToken::new();
        let body = futures::stream::iter(fragments(b"{\"response\":\"a\"}\n", 64))
            .chain(futures::stream::pending());
        let mut chunks = std::pin::pin!(line_chunks(body, cancel.clone()));

        let first = chunks.next().await.unwrap().unwrap();
        assert_eq!(first.text, "a");

        cancel.cancel();
        assert!(chunks.next().await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_line_is_fatal() {
        let body = "{\"response\":\"a\"}\nnot-json\n{\"response\":\"b\"}\n";
        let items: Vec<_> = line_chunks(
            futures::stream::iter(fragments(body.as_bytes(), body.len())),
            CancellationToken::new(),
        )
        .collect()
        .await;
        assert_eq!(items.len(), 2);
        assert!(matches!(
            items[1],
            Err(BackendError::MalformedPayload { .. })
        ));
    }
}
