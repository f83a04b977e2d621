//! Task Management Types
//!
//! Identifiers, states and the cancellation registry for in-flight generation
//! tasks. This module defines the data structures; the
//! [`TaskConductor`](crate::conductor::TaskConductor) drives them.
//!
//! A task is created when a start request is accepted and leaves the registry
//! the moment it reaches a terminal state. Nothing is persisted.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::backend::BackendError;
use crate::options::Provider;

/// Task identifier
///
/// A random UUID v4, so identifiers are never reused within or across
/// processes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Wrap an existing identifier (e.g. one received from a surface)
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new unique task ID
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the string value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a generation task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Producer is being driven
    Running,
    /// Producer finished normally
    Completed,
    /// Cancellation was requested while running
    Cancelled,
    /// Producer raised an error
    Failed,
}

impl TaskStatus {
    /// Whether no further transitions can happen
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

/// How a task ended
#[derive(Debug)]
pub enum TaskOutcome {
    /// The chunk sequence finished, with or without a `done` chunk
    Completed,
    /// Cancelled mid-stream (never reported as an error)
    Cancelled,
    /// The producer failed
    Failed(BackendError),
}

impl TaskOutcome {
    /// Terminal status for this outcome
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Completed => TaskStatus::Completed,
            Self::Cancelled => TaskStatus::Cancelled,
            Self::Failed(_) => TaskStatus::Failed,
        }
    }
}

/// Synchronous rejections of a start request
///
/// No task exists and no notification is emitted when one of these is
/// returned.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The prompt was empty or whitespace-only
    #[error("prompt must not be empty")]
    EmptyPrompt,

    /// The selected provider needs a credential and none was resolvable
    #[error("missing API key for provider {provider}")]
    MissingCredential {
        /// Provider that required it
        provider: Provider,
    },
}

/// Registry of running tasks
///
/// Maps each live task to its cancellation token. Shared through an [`Arc`]
/// between every conductor of the process; entries are only ever inserted,
/// looked up or removed as a whole.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: DashMap<TaskId, CancellationToken>,
}

impl TaskRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry ready to share
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a task
    pub fn insert(&self, id: TaskId, token: CancellationToken) {
        self.tasks.insert(id, token);
    }

    /// Remove a task, returning its token if it was registered
    pub fn remove(&self, id: &TaskId) -> Option<CancellationToken> {
        self.tasks.remove(id).map(|(_, token)| token)
    }

    /// Whether a task is registered
    #[must_use]
    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    /// Number of registered tasks
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancel every registered task and clear the registry
    ///
    /// Used at shutdown. Each drive loop still emits its own terminal
    /// notification.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<TaskId> = self.tasks.iter().map(|entry| entry.key().clone()).collect();
        let mut cancelled = 0;
        for id in ids {
            if let Some(token) = self.remove(&id) {
                token.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }
}
