//! Unix Socket Client Transport
//!
//! Surface-side connection to a daemon.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixStream;
use tokio::sync::mpsc;

use crate::events::BridgeRequest;
use crate::messages::BridgeMessage;
use crate::options::ProviderOptions;
use crate::tasks::TaskId;
use crate::transport::frame::{encode, FrameDecoder};
use crate::transport::TransportError;

use super::READ_BUFFER_SIZE;

/// Connected surface client
#[derive(Debug)]
pub struct UnixSocketClient {
    /// Path to the daemon's socket
    socket_path: PathBuf,
    writer: OwnedWriteHalf,
    /// Messages decoded by the read task
    messages: mpsc::Receiver<BridgeMessage>,
    next_request: u64,
}

impl UnixSocketClient {
    /// Connect to the daemon at `socket_path`
    ///
    /// # Errors
    ///
    /// [`TransportError::Io`] if the socket cannot be reached.
    pub async fn connect(socket_path: impl Into<PathBuf>) -> Result<Self, TransportError> {
        let socket_path = socket_path.into();
        let stream = UnixStream::connect(&socket_path).await.map_err(|e| {
            TransportError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to connect to {}: {e}", socket_path.display()),
            ))
        })?;

        let (mut read_half, writer) = stream.into_split();
        let (message_tx, messages) = mpsc::channel::<BridgeMessage>(100);

        // Read task: socket -> messages
        tokio::spawn(async move {
            let mut decoder = FrameDecoder::new();
            let mut buf = [0u8; READ_BUFFER_SIZE];

            loop {
                match read_half.read(&mut buf).await {
                    Ok(0) => {
                        tracing::debug!("Connection closed by daemon");
                        return;
                    }
                    Ok(n) => decoder.push(&buf[..n]),
                    Err(e) => {
                        tracing::warn!(error = %e, "Read error");
                        return;
                    }
                }

                loop {
                    match decoder.decode::<BridgeMessage>() {
                        Ok(Some(message)) => {
                            if message_tx.send(message).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!(error = %e, "Frame decode error, closing");
                            return;
                        }
                    }
                }
            }
        });

        tracing::debug!(path = %socket_path.display(), "Connected to daemon");
        Ok(Self {
            socket_path,
            writer,
            messages,
            next_request: 0,
        })
    }

    /// Get the socket path
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send a raw request
    ///
    /// # Errors
    ///
    /// [`TransportError::Io`] if the write fails, or an encoding error.
    pub async fn send(&mut self, request: &BridgeRequest) -> Result<(), TransportError> {
        let frame = encode(request)?;
        self.writer.write_all(&frame).await?;
        Ok(())
    }

    /// Request a new task, returning the request id the reply will carry
    ///
    /// # Errors
    ///
    /// Same as [`UnixSocketClient::send`].
    pub async fn start(
        &mut self,
        prompt: impl Into<String>,
        opts: ProviderOptions,
    ) -> Result<String, TransportError> {
        let request_id = self.next_request_id();
        self.send(&BridgeRequest::Start {
            request_id: request_id.clone(),
            prompt: prompt.into(),
            opts,
        })
        .await?;
        Ok(request_id)
    }

    /// Request cancellation of a task, returning the request id
    ///
    /// # Errors
    ///
    /// Same as [`UnixSocketClient::send`].
    pub async fn cancel(&mut self, task_id: TaskId) -> Result<String, TransportError> {
        let request_id = self.next_request_id();
        self.send(&BridgeRequest::Cancel {
            request_id: request_id.clone(),
            task_id,
        })
        .await?;
        Ok(request_id)
    }

    /// Next message from the daemon; `None` once the connection is closed
    pub async fn recv(&mut self) -> Option<BridgeMessage> {
        self.messages.recv().await
    }

    /// Close the write side, ending the daemon's request stream
    ///
    /// Messages still in flight can be read with [`UnixSocketClient::recv`].
    ///
    /// # Errors
    ///
    /// [`TransportError::Io`] if the shutdown fails.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.writer.shutdown().await?;
        Ok(())
    }

    fn next_request_id(&mut self) -> String {
        self.next_request += 1;
        format!("req-{}", self.next_request)
    }
}
