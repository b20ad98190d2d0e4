use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

use crate::core::ids::ComputerId;
use crate::task::shared::{Shared, SharedCell};

/// What a task sees of the computer executing it.
///
/// Holds a handle to the computer's shared copy and its outbound broadcast
/// channel, never the computer itself.
pub struct TaskContext<S: Shared> {
    computer: ComputerId,
    shared: Arc<SharedCell<S>>,
    outbox: Option<mpsc::UnboundedSender<S>>,
}

impl<S: Shared> TaskContext<S> {
    pub fn new(
        computer: ComputerId,
        shared: Arc<SharedCell<S>>,
        outbox: mpsc::UnboundedSender<S>,
    ) -> Self {
        Self {
            computer,
            shared,
            outbox: Some(outbox),
        }
    }

    /// Context for running a task outside any computer. Broadcasts only
    /// update the local copy.
    pub fn detached(shared: S) -> Self {
        Self {
            computer: ComputerId::new("detached"),
            shared: Arc::new(SharedCell::new(shared)),
            outbox: None,
        }
    }

    pub fn computer_id(&self) -> &ComputerId {
        &self.computer
    }

    /// The executing computer's current copy of the shared value
    pub fn shared(&self) -> S {
        self.shared.get()
    }

    /// Propose an improvement. If it beats the local copy it is installed
    /// and forwarded to the space; returns whether it was installed.
    pub fn broadcast(&self, proposed: S) -> bool {
        if !self.shared.merge(proposed.clone()) {
            return false;
        }
        if let Some(outbox) = &self.outbox {
            if outbox.send(proposed).is_err() {
                trace!(computer = %self.computer, "broadcast outbox closed");
            }
        }
        true
    }
}

impl<S: Shared> Clone for TaskContext<S> {
    fn clone(&self) -> Self {
        Self {
            computer: self.computer.clone(),
            shared: Arc::clone(&self.shared),
            outbox: self.outbox.clone(),
        }
    }
}
