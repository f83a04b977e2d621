//! Task Conductor - The Lifecycle Core
//!
//! The conductor accepts start and cancel requests, drives the selected
//! producer for each task on its own tokio task, and pushes the resulting
//! notifications into a sink.
//!
//! # Guarantees
//!
//! - `start` returns as soon as the task is registered; no chunk is awaited.
//! - Notifications of one task arrive in producer order.
//! - Every task ends with exactly one terminal notification, emitted after
//!   its registry entry is gone, and nothing follows it.
//!
//! Conductors created through [`TaskConductor::with_sink`] share the
//! registry and selector, so a task can be cancelled from any of them.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendSelector, ChunkStream};
use crate::messages::{CancelResult, TaskNotification};
use crate::options::ProviderOptions;
use crate::tasks::{TaskError, TaskId, TaskOutcome, TaskRegistry};

/// Starts, tracks and cancels generation tasks
#[derive(Clone)]
pub struct TaskConductor {
    registry: Arc<TaskRegistry>,
    selector: Arc<dyn BackendSelector>,
    /// Where notifications go
    tx: mpsc::Sender<TaskNotification>,
}

impl std::fmt::Debug for TaskConductor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskConductor")
            .field("active_tasks", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl TaskConductor {
    /// Create a conductor
    pub fn new(
        registry: Arc<TaskRegistry>,
        selector: Arc<dyn BackendSelector>,
        tx: mpsc::Sender<TaskNotification>,
    ) -> Self {
        Self {
            registry,
            selector,
            tx,
        }
    }

    /// A conductor sharing this one's registry and selector but delivering
    /// notifications to `tx`
    #[must_use]
    pub fn with_sink(&self, tx: mpsc::Sender<TaskNotification>) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            selector: Arc::clone(&self.selector),
            tx,
        }
    }

    /// Start a generation task
    ///
    /// Must be called from within a tokio runtime. The task runs in the
    /// background; its notifications go to this conductor's sink.
    ///
    /// # Errors
    ///
    /// [`TaskError::EmptyPrompt`] for an empty or whitespace-only prompt, or
    /// the selector's rejection (e.g. [`TaskError::MissingCredential`]). In
    /// both cases no task exists and nothing is sent upstream.
    pub fn start(&self, prompt: &str, options: &ProviderOptions) -> Result<TaskId, TaskError> {
        if prompt.trim().is_empty() {
            return Err(TaskError::EmptyPrompt);
        }

        let producer = self.selector.select(options)?;
        let task_id = TaskId::generate();
        let token = CancellationToken::new();
        self.registry.insert(task_id.clone(), token.clone());

        tracing::info!(
            task_id = %task_id,
            provider = producer.name(),
            prompt_len = prompt.len(),
            "Task started"
        );

        let chunks = producer.stream(prompt, token.clone());
        tokio::spawn(drive(
            task_id.clone(),
            chunks,
            token,
            Arc::clone(&self.registry),
            self.tx.clone(),
        ));

        Ok(task_id)
    }

    /// Cancel a running task
    ///
    /// Returns `ok: false` for unknown or already finished tasks, including a
    /// second cancel of the same task.
    pub fn cancel(&self, task_id: &TaskId) -> CancelResult {
        match self.registry.remove(task_id) {
            Some(token) => {
                token.cancel();
                tracing::info!(task_id = %task_id, "Task cancellation requested");
                CancelResult { ok: true }
            }
            None => {
                tracing::debug!(task_id = %task_id, "Cancel for unknown or finished task");
                CancelResult { ok: false }
            }
        }
    }

    /// Number of running tasks across all sinks
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.registry.len()
    }

    /// Whether a task is still running
    #[must_use]
    pub fn is_active(&self, task_id: &TaskId) -> bool {
        self.registry.contains(task_id)
    }

    /// The shared registry
    #[must_use]
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }
}

/// Drive one producer to a terminal state
async fn drive(
    task_id: TaskId,
    mut chunks: ChunkStream,
    token: CancellationToken,
    registry: Arc<TaskRegistry>,
    tx: mpsc::Sender<TaskNotification>,
) {
    let mut forwarded = 0usize;

    let outcome = loop {
        let next = tokio::select! {
            biased;
            () = token.cancelled() => break TaskOutcome::Cancelled,
            () = tx.closed() => {
                tracing::debug!(task_id = %task_id, "Notification sink closed, cancelling");
                token.cancel();
                break TaskOutcome::Cancelled;
            }
            next = chunks.next() => next,
        };

        let chunk = match next {
            None => break TaskOutcome::Completed,
            Some(Err(e)) => break TaskOutcome::Failed(e),
            Some(Ok(chunk)) => chunk,
        };

        let finished = chunk.done;
        tracing::trace!(task_id = %task_id, len = chunk.text.len(), finished, "Forwarding chunk");
        let notification = TaskNotification::content(task_id.clone(), chunk);

        let sent = tokio::select! {
            biased;
            () = token.cancelled() => break TaskOutcome::Cancelled,
            sent = tx.send(notification) => sent,
        };
        if sent.is_err() {
            token.cancel();
            break TaskOutcome::Cancelled;
        }

        forwarded += 1;
        if finished {
            break TaskOutcome::Completed;
        }
    };

    // Release the producer (and its connection) before reporting.
    drop(chunks);

    // A missing entry means a cancel won the race against normal completion.
    let cancelled_elsewhere = registry.remove(&task_id).is_none();
    let outcome = match outcome {
        TaskOutcome::Completed if cancelled_elsewhere => TaskOutcome::Cancelled,
        other => other,
    };

    match &outcome {
        TaskOutcome::Failed(error) => {
            tracing::warn!(task_id = %task_id, forwarded, error = %error, "Task failed");
        }
        other => {
            tracing::info!(task_id = %task_id, forwarded, status = %other.status(), "Task finished");
        }
    }

    if tx
        .send(TaskNotification::terminal(task_id, &outcome))
        .await
        .is_err()
    {
        tracing::debug!("Terminal notification dropped, sink closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::backend::{BackendError, DefaultBackends, StreamChunk, StreamProducer};
    use crate::messages::{CANCELLED_EVENT, END_EVENT};
    use crate::options::{Provider, ProviderDefaults};

    /// Scripted producer: yields `chunks`, then optionally fails or hangs
    #[derive(Clone, Default)]
    struct ScriptedProducer {
        chunks: Vec<StreamChunk>,
        fail: bool,
        hang: bool,
    }

    impl StreamProducer for ScriptedProducer {
        fn name(&self) -> &'static str {
            "Scripted"
        }

        fn stream(&self, _prompt: &str, _cancel: CancellationToken) -> ChunkStream {
            let script = self.clone();
            Box::pin(async_stream::stream! {
                for chunk in script.chunks {
                    yield Ok(chunk);
                }
                if script.fail {
                    yield Err(BackendError::UpstreamRequestFailed {
                        provider: "Scripted",
                        status: 500,
                        body: "boom".to_string(),
                    });
                }
                if script.hang {
                    futures::future::pending::<()>().await;
                }
            })
        }
    }

    struct ScriptedSelector(ScriptedProducer);

    impl BackendSelector for ScriptedSelector {
        fn select(
            &self,
            _options: &ProviderOptions,
        ) -> Result<Arc<dyn StreamProducer>, TaskError> {
            Ok(Arc::new(self.0.clone()))
        }
    }

    fn conductor(
        producer: ScriptedProducer,
    ) -> (TaskConductor, mpsc::Receiver<TaskNotification>) {
        let (tx, rx) = mpsc::channel(16);
        let conductor = TaskConductor::new(
            TaskRegistry::shared(),
            Arc::new(ScriptedSelector(producer)),
            tx,
        );
        (conductor, rx)
    }

    async fn until_terminal(rx: &mut mpsc::Receiver<TaskNotification>) -> Vec<TaskNotification> {
        let mut seen = Vec::new();
        while let Some(notification) = rx.recv().await {
            let terminal = notification.is_terminal();
            seen.push(notification);
            if terminal {
                break;
            }
        }
        seen
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected() {
        let (conductor, _rx) = conductor(ScriptedProducer::default());
        assert!(matches!(
            conductor.start("", &ProviderOptions::new()),
            Err(TaskError::EmptyPrompt)
        ));
        assert!(matches!(
            conductor.start(" \n\t", &ProviderOptions::new()),
            Err(TaskError::EmptyPrompt)
        ));
        assert_eq!(conductor.active_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_credential_rejected() {
        let (tx, mut rx) = mpsc::channel(4);
        let conductor = TaskConductor::new(
            TaskRegistry::shared(),
            Arc::new(DefaultBackends::new(ProviderDefaults::default())),
            tx,
        );

        let result = conductor.start("hi", &ProviderOptions::new().with_provider(Provider::OpenAi));
        assert!(matches!(result, Err(TaskError::MissingCredential { .. })));
        assert_eq!(conductor.active_count(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_exactly_one_terminal_notification() {
        let (conductor, mut rx) = conductor(ScriptedProducer {
            chunks: vec![
                StreamChunk::text("Hel"),
                StreamChunk::text("lo"),
                StreamChunk::finished(),
                StreamChunk::text("late"),
            ],
            ..ScriptedProducer::default()
        });

        let task_id = conductor.start("hi", &ProviderOptions::new()).unwrap();
        let seen = until_terminal(&mut rx).await;

        let texts: Vec<_> = seen.iter().filter_map(|n| n.chunk.as_text()).collect();
        assert_eq!(texts, vec!["Hel", "lo", "", ""]);
        assert_eq!(seen.iter().filter(|n| n.is_terminal()).count(), 1);

        let last = seen.last().unwrap();
        assert_eq!(last.task_id, task_id);
        assert_eq!(last.event.as_deref(), Some(END_EVENT));
        assert!(!conductor.is_active(&task_id));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_end_of_sequence_completes() {
        let (conductor, mut rx) = conductor(ScriptedProducer {
            chunks: vec![StreamChunk::text("only")],
            ..ScriptedProducer::default()
        });

        conductor.start("hi", &ProviderOptions::new()).unwrap();
        let seen = until_terminal(&mut rx).await;
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].event.as_deref(), Some(END_EVENT));
    }

    #[tokio::test]
    async fn test_zero_chunks_still_terminates() {
        let (conductor, mut rx) = conductor(ScriptedProducer::default());
        conductor.start("hi", &ProviderOptions::new()).unwrap();
        let seen = until_terminal(&mut rx).await;
        assert_eq!(seen.len(), 1);
        assert!(seen[0].is_terminal());
    }

    #[tokio::test]
    async fn test_failure_emits_error_event() {
        let (conductor, mut rx) = conductor(ScriptedProducer {
            chunks: vec![StreamChunk::text("partial")],
            fail: true,
            ..ScriptedProducer::default()
        });

        let task_id = conductor.start("hi", &ProviderOptions::new()).unwrap();
        let seen = until_terminal(&mut rx).await;
        assert_eq!(seen.len(), 2);
        assert!(seen[1].is_error());
        assert_eq!(
            seen[1].chunk,
            crate::messages::NotificationChunk::Error {
                message: "Scripted request failed: 500 boom".to_string()
            }
        );
        assert!(!conductor.is_active(&task_id));
    }

    #[tokio::test]
    async fn test_cancel_before_any_chunk() {
        let (conductor, mut rx) = conductor(ScriptedProducer {
            hang: true,
            ..ScriptedProducer::default()
        });

        let task_id = conductor.start("hi", &ProviderOptions::new()).unwrap();
        assert!(conductor.is_active(&task_id));
        assert!(conductor.cancel(&task_id).ok);

        let seen = until_terminal(&mut rx).await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].event.as_deref(), Some(CANCELLED_EVENT));
        assert!(!seen[0].is_error());
        assert_eq!(conductor.active_count(), 0);
    }

    #[tokio::test]
    async fn test_double_and_unknown_cancel() {
        let (conductor, _rx) = conductor(ScriptedProducer {
            hang: true,
            ..ScriptedProducer::default()
        });

        let task_id = conductor.start("hi", &ProviderOptions::new()).unwrap();
        assert!(conductor.cancel(&task_id).ok);
        assert!(!conductor.cancel(&task_id).ok);
        assert!(!conductor.cancel(&TaskId::new("never-issued")).ok);
    }

    #[tokio::test]
    async fn test_closed_sink_cancels_task() {
        let (conductor, rx) = conductor(ScriptedProducer {
            hang: true,
            ..ScriptedProducer::default()
        });

        let task_id = conductor.start("hi", &ProviderOptions::new()).unwrap();
        drop(rx);

        for _ in 0..50 {
            if !conductor.is_active(&task_id) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!conductor.is_active(&task_id));
    }

    #[tokio::test]
    async fn test_sinks_share_registry() {
        let (conductor, _rx) = conductor(ScriptedProducer {
            hang: true,
            ..ScriptedProducer::default()
        });
        let (other_tx, mut other_rx) = mpsc::channel(4);
        let other = conductor.with_sink(other_tx);

        let task_id = other.start("hi", &ProviderOptions::new()).unwrap();
        assert_eq!(conductor.active_count(), 1);
        assert!(conductor.cancel(&task_id).ok);

        let seen = until_terminal(&mut other_rx).await;
        assert_eq!(seen[0].event.as_deref(), Some(CANCELLED_EVENT));
    }

    #[tokio::test]
    async fn test_concurrent_tasks_are_independent() {
        let (conductor, mut rx) = conductor(ScriptedProducer {
            chunks: vec![StreamChunk::text("a"), StreamChunk::text("b")],
            ..ScriptedProducer::default()
        });

        let first = conductor.start("one", &ProviderOptions::new()).unwrap();
        let second = conductor.start("two", &ProviderOptions::new()).unwrap();
        assert_ne!(first, second);

        let mut per_task: std::collections::HashMap<TaskId, Vec<TaskNotification>> =
            std::collections::HashMap::new();
        let mut terminals = 0;
        while terminals < 2 {
            let notification = rx.recv().await.unwrap();
            if notification.is_terminal() {
                terminals += 1;
            }
            per_task
                .entry(notification.task_id.clone())
                .or_default()
                .push(notification);
        }

        for id in [first, second] {
            let texts: Vec<_> = per_task[&id]
                .iter()
                .filter(|n| !n.is_terminal())
                .filter_map(|n| n.chunk.as_text())
                .collect();
            assert_eq!(texts, vec!["a", "b"]);
            assert!(per_task[&id].last().unwrap().is_terminal());
        }
    }
}
