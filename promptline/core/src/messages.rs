//! Core Messages
//!
//! Messages sent from the core to surfaces: per-task stream notifications and
//! replies to bridge requests.
//!
//! # Notification sequence
//!
//! ```text
//! {taskId, chunk: "Hel"}
//! {taskId, chunk: "lo"}
//! {taskId, chunk: "", event: "end", done: true}        <- completed
//! {taskId, chunk: "", event: "cancelled", done: true}  <- cancelled
//! {taskId, chunk: {message}, event: "error", done: true} <- failed
//! ```
//!
//! Exactly one notification per task has `done: true`, and it is the last.

use serde::{Deserialize, Serialize};

use crate::backend::StreamChunk;
use crate::tasks::{TaskId, TaskOutcome};

/// Terminal event for a completed task
pub const END_EVENT: &str = "end";
/// Terminal event for a cancelled task
pub const CANCELLED_EVENT: &str = "cancelled";
/// Terminal event for a failed task
pub const ERROR_EVENT: &str = "error";

/// Payload of a notification
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotificationChunk {
    /// Incremental text
    Text(String),
    /// Failure description
    Error {
        /// Human-readable message
        message: String,
    },
}

impl NotificationChunk {
    /// Text carried by a content notification
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Error { .. } => None,
        }
    }
}

/// One record of a task's notification sequence
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskNotification {
    /// Task this belongs to
    pub task_id: TaskId,
    /// Text or error payload
    pub chunk: NotificationChunk,
    /// Event tag (producer tag on content, terminal event on the last record)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Set only on the terminal record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
}

impl TaskNotification {
    /// Content notification for a producer chunk
    ///
    /// The producer's own `done` flag is not carried over; only the terminal
    /// notification ends the sequence.
    #[must_use]
    pub fn content(task_id: TaskId, chunk: StreamChunk) -> Self {
        Self {
            task_id,
            chunk: NotificationChunk::Text(chunk.text),
            event: chunk.event,
            done: None,
        }
    }

    /// Terminal notification for an outcome
    #[must_use]
    pub fn terminal(task_id: TaskId, outcome: &TaskOutcome) -> Self {
        let (chunk, event) = match outcome {
            TaskOutcome::Completed => (NotificationChunk::Text(String::new()), END_EVENT),
            TaskOutcome::Cancelled => (NotificationChunk::Text(String::new()), CANCELLED_EVENT),
            TaskOutcome::Failed(error) => (
                NotificationChunk::Error {
                    message: error.to_string(),
                },
                ERROR_EVENT,
            ),
        };
        Self {
            task_id,
            chunk,
            event: Some(event.to_string()),
            done: Some(true),
        }
    }

    /// Whether this is the task's terminal record
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.done == Some(true)
    }

    /// Whether this terminal record reports a failure
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.event.as_deref() == Some(ERROR_EVENT)
    }
}

/// Result of a cancel request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResult {
    /// Whether a running task was cancelled
    pub ok: bool,
}

/// Messages from the core to a surface
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeMessage {
    /// A start request was accepted
    Started {
        /// Echoed request id
        #[serde(rename = "requestId")]
        request_id: String,
        /// New task
        #[serde(rename = "taskId")]
        task_id: TaskId,
    },
    /// A start request was rejected before any task existed
    Rejected {
        /// Echoed request id
        #[serde(rename = "requestId")]
        request_id: String,
        /// Why
        message: String,
    },
    /// Reply to a cancel request
    Cancelled {
        /// Echoed request id
        #[serde(rename = "requestId")]
        request_id: String,
        /// Whether a running task was cancelled
        ok: bool,
    },
    /// A task notification
    Stream(TaskNotification),
}
