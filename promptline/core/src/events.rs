//! Surface Requests
//!
//! Requests sent from a surface to the core over a bridge. Every request
//! carries a surface-chosen `requestId` that the reply echoes.

use serde::{Deserialize, Serialize};

use crate::options::ProviderOptions;
use crate::tasks::TaskId;

/// Requests from a surface to the core
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeRequest {
    /// Start a generation task
    Start {
        /// Correlation id for the reply
        #[serde(rename = "requestId")]
        request_id: String,
        /// Prompt text
        prompt: String,
        /// Provider options (all optional)
        #[serde(default)]
        opts: ProviderOptions,
    },
    /// Cancel a running task
    Cancel {
        /// Correlation id for the reply
        #[serde(rename = "requestId")]
        request_id: String,
        /// Task to cancel
        #[serde(rename = "taskId")]
        task_id: TaskId,
    },
}

impl BridgeRequest {
    /// Correlation id of this request
    #[must_use]
    pub fn request_id(&self) -> &str {
        match self {
            Self::Start { request_id, .. } | Self::Cancel { request_id, .. } => request_id,
        }
    }
}
