//! Result sink of one machine.
//!
//! Batches worker results, keeps sub-tasks on the local queue while it has
//! room, and ships each batch to the space in one call. Batches go out one
//! at a time, so a parent's result always reaches the space before the
//! results of children it kept locally.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::core::ids::ComputerId;
use crate::core::ready_queue::ReadyQueue;
use crate::task::{QueuingStatus, Task, TaskNode, TaskResult};
use crate::transport::RemoteSpace;

pub(crate) struct ResultSink<T: Task> {
    pub(crate) computer: ComputerId,
    pub(crate) space: Arc<dyn RemoteSpace<T>>,
    pub(crate) queue: Arc<ReadyQueue<TaskNode<T>>>,
    pub(crate) queue_capacity: usize,
    pub(crate) batch_size: usize,
}

impl<T: Task> ResultSink<T> {
    pub(crate) async fn run(self, mut results: mpsc::UnboundedReceiver<TaskResult<T>>) {
        while let Some(first) = results.recv().await {
            let mut batch = Vec::with_capacity(self.batch_size);
            batch.push(first);
            while batch.len() < self.batch_size {
                match results.try_recv() {
                    Ok(result) => batch.push(result),
                    Err(_) => break,
                }
            }

            let kept: usize = batch.iter_mut().map(|result| self.keep_local(result)).sum();
            trace!(computer = %self.computer, results = batch.len(), kept, "flushing results");

            if let Err(e) = self.space.report_results(batch, &self.computer).await {
                warn!(
                    computer = %self.computer,
                    category = e.category(),
                    "reporting results failed: {}",
                    e
                );
            }
        }
        debug!(computer = %self.computer, "result sink stopped");
    }

    /// Mark and enqueue sub-tasks locally while the queue is under capacity.
    /// The rest stay unmarked and go through the space's ready queue.
    pub(crate) fn keep_local(&self, result: &mut TaskResult<T>) -> usize {
        let Some(children) = result.subtasks_mut() else {
            return 0;
        };
        let mut kept = 0;
        for child in children.iter_mut() {
            if self.queue.len() >= self.queue_capacity {
                break;
            }
            child.queuing = QueuingStatus::Queued;
            child.executor = Some(self.computer.clone());
            self.queue.push(child.clone());
            kept += 1;
        }
        kept
    }
}
