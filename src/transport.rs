//! Remote seams between the space and the machines.
//!
//! The coordination logic only talks through these traits. The crate ships
//! the in-process implementations ([`crate::Computer`] and
//! [`crate::space::LocalSpace`]); a networked transport implements the same
//! traits and reports any failed call as [`GridError::Transport`].
//!
//! [`GridError::Transport`]: crate::GridError::Transport

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::config::WorkerPlan;
use crate::core::errors::Result;
use crate::core::ids::ComputerId;
use crate::task::{Task, TaskNode, TaskResult};

/// Operations a machine exposes to the space
#[async_trait]
pub trait RemoteComputer<T: Task>: Send + Sync {
    /// Enqueue a batch on the machine's local queue
    async fn add_tasks(&self, batch: Vec<TaskNode<T>>) -> Result<()>;

    /// Spawn `workers` worker loops plus the result sink
    async fn start_workers(&self, workers: usize, queue_capacity: usize) -> Result<()>;

    async fn task_queue_size(&self) -> Result<usize>;

    async fn task_queue_max_size(&self) -> Result<usize>;

    async fn shared(&self) -> Result<T::Shared>;

    /// Overwrite the machine's shared copy
    async fn set_shared(&self, shared: T::Shared) -> Result<()>;

    /// Install `shared` only if it is newer than the machine's copy
    async fn update_shared(&self, shared: T::Shared) -> Result<bool>;
}

/// Operations the space exposes to machines
#[async_trait]
pub trait RemoteSpace<T: Task>: Send + Sync {
    /// Register a machine; the space answers by starting its workers
    async fn register(
        &self,
        computer: Arc<dyn RemoteComputer<T>>,
        id: ComputerId,
        processors: usize,
    ) -> Result<WorkerPlan>;

    async fn report_results(&self, results: Vec<TaskResult<T>>, computer: &ComputerId)
        -> Result<()>;

    /// Forward a locally accepted improvement; returns whether the space
    /// accepted it
    async fn broadcast(&self, proposed: T::Shared, computer: &ComputerId) -> Result<bool>;
}
