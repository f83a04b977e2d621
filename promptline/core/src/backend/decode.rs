//! Chunk Decoders
//!
//! Stateless decoders that turn one framed wire record into a [`StreamChunk`].
//!
//! - [`EventStreamDecoder`]: one event-stream `data` payload from a chat
//!   completions response (`{"choices":[{"delta":{...}}]}` or `[DONE]`)
//! - [`LineDecoder`]: one NDJSON line from a generate response
//!   (`{"response":"...","done":false}`)
//!
//! Both are pure: no I/O, same input gives the same output.

use serde_json::Value;

use super::traits::{BackendError, StreamChunk};

/// Event-stream completion sentinel
const DONE_SENTINEL: &str = "[DONE]";

/// Decode one unit of raw text into zero or one chunk
pub trait ChunkDecoder {
    /// Decode `payload`
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::MalformedPayload`] when the payload is not the
    /// JSON the wire format promises.
    fn decode(&self, payload: &str) -> Result<Option<StreamChunk>, BackendError>;
}

/// Decoder for event-stream chat completion deltas
#[derive(Clone, Copy, Debug, Default)]
pub struct EventStreamDecoder;

impl ChunkDecoder for EventStreamDecoder {
    fn decode(&self, payload: &str) -> Result<Option<StreamChunk>, BackendError> {
        if payload.is_empty() {
            return Ok(None);
        }

        if payload.trim() == DONE_SENTINEL {
            return Ok(Some(StreamChunk::finished()));
        }

        let json: Value =
            serde_json::from_str(payload).map_err(|source| BackendError::MalformedPayload {
                format: "event-stream",
                source,
            })?;

        let text = delta_text(&json["choices"][0]["delta"]["content"]);
        Ok(Some(StreamChunk::text(text).with_raw(json)))
    }
}

/// Text of a delta `content` field
///
/// A string is taken as-is; an array of parts is concatenated by each part's
/// `text` (missing or non-string counts as empty); anything else is empty.
fn delta_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .map(|part| part["text"].as_str().unwrap_or(""))
            .collect(),
        _ => String::new(),
    }
}

/// Decoder for newline-delimited JSON generate records
#[derive(Clone, Copy, Debug, Default)]
pub struct LineDecoder;

impl ChunkDecoder for LineDecoder {
    fn decode(&self, line: &str) -> Result<Option<StreamChunk>, BackendError> {
        if line.trim().is_empty() {
            return Ok(None);
        }

        let json: Value =
            serde_json::from_str(line).map_err(|source| BackendError::MalformedPayload {
                format: "ndjson",
                source,
            })?;

        let text = json["response"].as_str().unwrap_or("").to_string();
        let done = is_truthy(&json["done"]);
        Ok(Some(StreamChunk::text(text).with_done(done).with_raw(json)))
    }
}

/// JSON truthiness: `null`, `false`, `0`, `NaN` and `""` are false
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
