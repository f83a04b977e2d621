//! In-Process Bridge
//!
//! Channel-based bridge for a surface that embeds the core directly (no
//! process separation, no serialization).
//!
//! # Usage
//!
//! ```ignore
//! let mut bridge = InProcessBridge::spawn(&conductor, 100);
//! let request_id = bridge.start("Hello", ProviderOptions::new()).await?;
//! while let Some(message) = bridge.recv().await {
//!     // render started / stream / rejected ...
//! }
//! ```

use tokio::sync::mpsc;

use crate::conductor::TaskConductor;
use crate::events::BridgeRequest;
use crate::messages::BridgeMessage;
use crate::options::ProviderOptions;
use crate::tasks::TaskId;

use super::bridge::serve_connection;
use super::TransportError;

/// Surface side of an in-process connection
#[derive(Debug)]
pub struct InProcessBridge {
    requests: mpsc::Sender<BridgeRequest>,
    messages: mpsc::Receiver<BridgeMessage>,
    next_request: u64,
}

impl InProcessBridge {
    /// Connect to `conductor`, serving the connection on a background task
    ///
    /// Must be called from within a tokio runtime. Dropping the bridge
    /// cancels the tasks it started.
    #[must_use]
    pub fn spawn(conductor: &TaskConductor, capacity: usize) -> Self {
        let (requests, request_rx) = mpsc::channel(capacity);
        let (reply_tx, messages) = mpsc::channel(capacity);
        tokio::spawn(serve_connection(conductor.clone(), request_rx, reply_tx));

        Self {
            requests,
            messages,
            next_request: 0,
        }
    }

    /// Send a raw request
    ///
    /// # Errors
    ///
    /// [`TransportError::ConnectionClosed`] if the serving loop has ended.
    pub async fn send(&self, request: BridgeRequest) -> Result<(), TransportError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Request a new task, returning the request id the reply will carry
    ///
    /// # Errors
    ///
    /// [`TransportError::ConnectionClosed`] if the serving loop has ended.
    pub async fn start(
        &mut self,
        prompt: impl Into<String>,
        opts: ProviderOptions,
    ) -> Result<String, TransportError> {
        let request_id = self.next_request_id();
        self.send(BridgeRequest::Start {
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
    /// [`TransportError::ConnectionClosed`] if the serving loop has ended.
    pub async fn cancel(&mut self, task_id: TaskId) -> Result<String, TransportError> {
        let request_id = self.next_request_id();
        self.send(BridgeRequest::Cancel {
            request_id: request_id.clone(),
            task_id,
        })
        .await?;
        Ok(request_id)
    }

    /// Next reply or notification; `None` once the connection is finished
    pub async fn recv(&mut self) -> Option<BridgeMessage> {
        self.messages.recv().await
    }

    fn next_request_id(&mut self) -> String {
        self.next_request += 1;
        format!("req-{}", self.next_request)
    }
}
