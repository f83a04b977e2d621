//! HTTP plumbing shared by the streaming back-ends.

use tokio_util::sync::CancellationToken;

use super::traits::BackendError;

/// Send a streaming request and check its status
///
/// Returns `Ok(None)` without sending anything when `cancel` is already
/// triggered, and drops the in-flight request if it fires while waiting for
/// response headers.
///
/// # Errors
///
/// [`BackendError::UpstreamRequestFailed`] for a non-success status (with the
/// response text, or the canonical reason if the body cannot be read), or
/// [`BackendError::Transport`] if the request could not be sent.
pub(crate) async fn open_stream(
    request: reqwest::RequestBuilder,
    provider: &'static str,
    cancel: &CancellationToken,
) -> Result<Option<reqwest::Response>, BackendError> {
    if cancel.is_cancelled() {
        tracing::debug!(provider, "Cancelled before request was issued");
        return Ok(None);
    }

    let response = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(None),
        response = request.send() => response?,
    };

    let status = response.status();
    if status.is_success() {
        return Ok(Some(response));
    }

    let fallback = status.canonical_reason().unwrap_or_default().to_string();
    let body = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(None),
        body = response.text() => body.unwrap_or(fallback),
    };

    tracing::warn!(provider, status = status.as_u16(), "Upstream rejected request");
    Err(BackendError::UpstreamRequestFailed {
        provider,
        status: status.as_u16(),
        body,
    })
}
