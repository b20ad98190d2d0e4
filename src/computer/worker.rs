use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, trace};

use crate::core::ready_queue::ReadyQueue;
use crate::task::{Outcome, Task, TaskContext, TaskNode, TaskResult};

/// Worker loop: take the next local task, run it off the async threads and
/// hand the result to the sink. Ends when the sink is gone.
///
/// A task that panics is reported as pruned so its parent's join still
/// completes.
pub(crate) async fn run<T: Task>(
    index: usize,
    ctx: TaskContext<T::Shared>,
    queue: Arc<ReadyQueue<TaskNode<T>>>,
    results: mpsc::UnboundedSender<TaskResult<T>>,
) {
    trace!(computer = %ctx.computer_id(), worker = index, "worker started");
    loop {
        let task = queue.pop_wait().await;
        let (id, parent_id) = (task.id, task.parent_id);
        let task_ctx = ctx.clone();
        let result = match tokio::task::spawn_blocking(move || task.execute(&task_ctx)).await {
            Ok(result) => result,
            Err(e) => {
                error!(computer = %ctx.computer_id(), task = %id, "task execution failed, reporting it pruned: {}", e);
                TaskResult {
                    id,
                    parent_id,
                    outcome: Outcome::Value(None),
                }
            }
        };
        if results.send(result).is_err() {
            break;
        }
    }
    trace!(computer = %ctx.computer_id(), worker = index, "worker stopped");
}
