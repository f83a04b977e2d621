//! Unix Socket Server Transport
//!
//! Daemon-side listener. Every accepted connection is served concurrently by
//! its own [`serve_connection`] loop with its own notification sink.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::conductor::TaskConductor;
use crate::events::BridgeRequest;
use crate::messages::BridgeMessage;
use crate::transport::bridge::serve_connection;
use crate::transport::frame::{encode, FrameDecoder};
use crate::transport::TransportError;

use super::READ_BUFFER_SIZE;

/// Listening Unix socket
///
/// The socket file is removed when the server is dropped.
#[derive(Debug)]
pub struct UnixSocketServer {
    /// Path to the socket file
    socket_path: PathBuf,
    listener: UnixListener,
}

impl UnixSocketServer {
    /// Bind a socket at `socket_path`
    ///
    /// Creates missing parent directories, removes a stale socket file and
    /// restricts the new socket to its owner. Must be called from within a
    /// tokio runtime.
    ///
    /// # Errors
    ///
    /// [`TransportError::Io`] if any filesystem step or the bind fails.
    pub fn bind(socket_path: impl Into<PathBuf>) -> Result<Self, TransportError> {
        let socket_path = socket_path.into();

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TransportError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create directory {}: {e}", parent.display()),
                ))
            })?;
        }

        if socket_path.exists() {
            std::fs::remove_file(&socket_path).map_err(|e| {
                TransportError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to remove old socket {}: {e}", socket_path.display()),
                ))
            })?;
            tracing::debug!(path = %socket_path.display(), "Removed stale socket");
        }

        let listener = UnixListener::bind(&socket_path)?;
        std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o600))?;

        tracing::info!(path = %socket_path.display(), "Listening on Unix socket");
        Ok(Self {
            socket_path,
            listener,
        })
    }

    /// Get the socket path
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accept connections until `shutdown` fires
    ///
    /// Each connection gets a conductor from [`TaskConductor::with_sink`] and a
    /// reply channel of `capacity`. A connection whose peer fails validation
    /// is dropped without affecting the others.
    ///
    /// # Errors
    ///
    /// [`TransportError::Io`] if accepting fails.
    pub async fn serve(
        &self,
        conductor: &TaskConductor,
        capacity: usize,
        shutdown: CancellationToken,
    ) -> Result<(), TransportError> {
        loop {
            let (stream, _addr) = tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!("Socket server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted?,
            };

            if let Err(e) = validate_peer(&stream) {
                tracing::warn!(error = %e, "Rejected connection");
                continue;
            }

            tokio::spawn(serve_stream(stream, conductor.clone(), capacity));
        }
    }
}

impl Drop for UnixSocketServer {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            tracing::debug!(path = %self.socket_path.display(), error = %e, "Socket cleanup failed");
        }
    }
}

/// Serve one accepted stream
///
/// Frames on the read half become requests; replies are framed onto the write
/// half. Returns when the connection is finished.
pub async fn serve_stream(stream: UnixStream, conductor: TaskConductor, capacity: usize) {
    let connection = uuid::Uuid::new_v4();
    tracing::info!(%connection, "Surface connected");

    let (mut read_half, mut write_half) = stream.into_split();
    let (request_tx, request_rx) = mpsc::channel::<BridgeRequest>(capacity);
    let (reply_tx, mut reply_rx) = mpsc::channel::<BridgeMessage>(capacity);
    let rejections = reply_tx.clone();

    // Read task: socket -> requests
    let reader = tokio::spawn(async move {
        let mut decoder = FrameDecoder::new();
        let mut buf = [0u8; READ_BUFFER_SIZE];

        loop {
            match read_half.read(&mut buf).await {
                Ok(0) => {
                    tracing::debug!(%connection, "Connection closed by peer");
                    return;
                }
                Ok(n) => decoder.push(&buf[..n]),
                Err(e) => {
                    tracing::warn!(%connection, error = %e, "Read error");
                    return;
                }
            }

            loop {
                match decoder.decode::<serde_json::Value>() {
                    Ok(Some(payload)) => match parse_request(payload) {
                        Ok(request) => {
                            if request_tx.send(request).await.is_err() {
                                return;
                            }
                        }
                        Err(Some(rejected)) => {
                            if rejections.send(rejected).await.is_err() {
                                return;
                            }
                        }
                        Err(None) => {}
                    },
                    Ok(None) => break,
                    Err(e @ TransportError::FrameTooLarge { .. }) => {
                        tracing::warn!(%connection, error = %e, "Oversized frame, closing");
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(%connection, error = %e, "Dropped undecodable frame");
                    }
                }
            }
        }
    });

    // Write task: replies -> socket
    let writer = tokio::spawn(async move {
        while let Some(message) = reply_rx.recv().await {
            let frame = match encode(&message) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(%connection, error = %e, "Encode error");
                    continue;
                }
            };
            if let Err(e) = write_half.write_all(&frame).await {
                tracing::debug!(%connection, error = %e, "Write error");
                return;
            }
        }
    });

    serve_connection(conductor, request_rx, reply_tx).await;
    reader.abort();
    if let Err(e) = writer.await {
        tracing::debug!(%connection, error = %e, "Writer task ended abnormally");
    }
    tracing::info!(%connection, "Connection ended");
}

/// Interpret one well-framed payload
///
/// A payload that is not a valid request is answered with
/// [`BridgeMessage::Rejected`] when it carries a `requestId`, and dropped
/// otherwise.
fn parse_request(payload: serde_json::Value) -> Result<BridgeRequest, Option<BridgeMessage>> {
    let request_id = payload
        .get("requestId")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string);

    serde_json::from_value(payload).map_err(|e| {
        tracing::warn!(request_id = ?request_id, error = %e, "Invalid request");
        request_id.map(|request_id| BridgeMessage::Rejected {
            request_id,
            message: format!("invalid request: {e}"),
        })
    })
}

/// Validate peer credentials
///
/// On Linux, uses `SO_PEERCRED` to check that the peer runs as the same user.
#[cfg(target_os = "linux")]
fn validate_peer(stream: &UnixStream) -> Result<(), TransportError> {
    use std::os::unix::io::AsRawFd;

    let fd = stream.as_raw_fd();
    let mut cred = libc::ucred {
        pid: 0,
        uid: 0,
        gid: 0,
    };
    #[allow(clippy::cast_possible_truncation)]
    let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

    // SAFETY: `cred` and `len` are valid for writes and sized for SO_PEERCRED
    let result = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_PEERCRED,
            std::ptr::addr_of_mut!(cred).cast::<libc::c_void>(),
            &mut len,
        )
    };
    if result < 0 {
        return Err(TransportError::AuthenticationFailed(
            "Failed to get peer credentials".to_string(),
        ));
    }

    // SAFETY: getuid has no preconditions and cannot fail
    let my_uid = unsafe { libc::getuid() };
    if cred.uid != my_uid {
        return Err(TransportError::AuthenticationFailed(format!(
            "Peer UID {} does not match server UID {my_uid}",
            cred.uid
        )));
    }

    tracing::debug!(peer_uid = cred.uid, peer_pid = cred.pid, "Peer validated");
    Ok(())
}

/// Validate peer credentials (non-Linux fallback: filesystem permissions only)
#[cfg(not(target_os = "linux"))]
#[allow(clippy::unnecessary_wraps)]
fn validate_peer(_stream: &UnixStream) -> Result<(), TransportError> {
    tracing::debug!("Peer validation skipped (non-Linux platform)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Provider;

    #[test]
    fn test_parse_valid_request() {
        let payload = serde_json::json!({
            "type": "start",
            "requestId": "r1",
            "prompt": "hi",
            "opts": { "provider": "openai" },
        });
        let Ok(BridgeRequest::Start { opts, .. }) = parse_request(payload) else {
            panic!("expected a start request");
        };
        assert_eq!(opts.provider, Some(Provider::OpenAi));
    }

    #[test]
    fn test_invalid_request_with_id_is_rejected() {
        let payload = serde_json::json!({
            "type": "start",
            "requestId": "r0",
            "prompt": "hi",
            "opts": { "provider": "anthropic" },
        });
        let Err(Some(BridgeMessage::Rejected {
            request_id,
            message,
        })) = parse_request(payload)
        else {
            panic!("expected a rejection");
        };
        assert_eq!(request_id, "r0");
        assert!(message.starts_with("invalid request:"));
    }

    #[test]
    fn test_invalid_request_without_id_is_dropped() {
        assert!(matches!(
            parse_request(serde_json::json!({ "type": "launch" })),
            Err(None)
        ));
        assert!(matches!(parse_request(serde_json::json!([1, 2])), Err(None)));
    }
}
