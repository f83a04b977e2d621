//! Bridge loop
//!
//! Serves one surface connection: requests in, replies and task notifications
//! out, all on a single ordered reply channel.
//!
//! ```text
//!  requests ──► serve_connection ──► TaskConductor.start / cancel
//!                     │    ▲
//!                     │    └── notifications (per-connection sink)
//!                     ▼
//!                  replies: started / rejected / cancelled / stream
//! ```
//!
//! A `started` reply is always delivered before any notification of that
//! task.

use std::collections::HashSet;

use tokio::sync::mpsc;

use crate::conductor::TaskConductor;
use crate::events::BridgeRequest;
use crate::messages::{BridgeMessage, TaskNotification};
use crate::tasks::TaskId;

/// Serve one connection until its request channel closes
///
/// Tasks started through this connection that are still running when the
/// requests end are cancelled; the loop returns once their terminal
/// notifications have been relayed. It returns immediately if the reply
/// channel is closed.
pub async fn serve_connection(
    conductor: TaskConductor,
    mut requests: mpsc::Receiver<BridgeRequest>,
    replies: mpsc::Sender<BridgeMessage>,
) {
    let (sink, mut notifications) = mpsc::channel::<TaskNotification>(replies.max_capacity());
    let conductor = conductor.with_sink(sink);
    let mut live: HashSet<TaskId> = HashSet::new();
    let mut accepting = true;

    loop {
        tokio::select! {
            request = requests.recv(), if accepting => {
                let Some(request) = request else {
                    accepting = false;
                    for task_id in &live {
                        conductor.cancel(task_id);
                    }
                    if live.is_empty() {
                        break;
                    }
                    continue;
                };

                let reply = handle_request(&conductor, request, &mut live);
                if replies.send(reply).await.is_err() {
                    break;
                }
            }
            Some(notification) = notifications.recv() => {
                if notification.is_terminal() {
                    live.remove(&notification.task_id);
                }
                if replies.send(BridgeMessage::Stream(notification)).await.is_err() {
                    break;
                }
                if !accepting && live.is_empty() {
                    break;
                }
            }
            else => break,
        }
    }

    // Anything still running has lost its surface.
    for task_id in &live {
        conductor.cancel(task_id);
    }
    tracing::debug!(remaining = live.len(), "Bridge connection finished");
}

fn handle_request(
    conductor: &TaskConductor,
    request: BridgeRequest,
    live: &mut HashSet<TaskId>,
) -> BridgeMessage {
    match request {
        BridgeRequest::Start {
            request_id,
            prompt,
            opts,
        } => match conductor.start(&prompt, &opts) {
            Ok(task_id) => {
                live.insert(task_id.clone());
                BridgeMessage::Started {
                    request_id,
                    task_id,
                }
            }
            Err(e) => {
                tracing::debug!(request_id = %request_id, error = %e, "Start rejected");
                BridgeMessage::Rejected {
                    request_id,
                    message: e.to_string(),
                }
            }
        },
        BridgeRequest::Cancel {
            request_id,
            task_id,
        } => BridgeMessage::Cancelled {
            request_id,
            ok: conductor.cancel(&task_id).ok,
        },
    }
}
