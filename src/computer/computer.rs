//! Machine agent
//!
//! A `Computer` owns its local queue, worker loops, result sink and its copy
//! of the shared value. The space reaches it only through
//! [`RemoteComputer`]; tasks reach it only through their [`TaskContext`].

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::computer::sink::ResultSink;
use crate::computer::worker;
use crate::core::config::GridConfig;
use crate::core::errors::{GridError, Result};
use crate::core::ids::ComputerId;
use crate::core::ready_queue::ReadyQueue;
use crate::task::{SharedCell, Task, TaskContext, TaskNode};
use crate::transport::{RemoteComputer, RemoteSpace};

pub struct Computer<T: Task> {
    id: ComputerId,
    space: Arc<dyn RemoteSpace<T>>,
    config: GridConfig,
    queue: Arc<ReadyQueue<TaskNode<T>>>,
    queue_capacity: AtomicUsize,
    workers: AtomicUsize,
    shared: Arc<SharedCell<T::Shared>>,
    outbox: mpsc::UnboundedSender<T::Shared>,
    outbox_rx: Mutex<Option<mpsc::UnboundedReceiver<T::Shared>>>,
    alive: AtomicBool,
    started: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Task> Computer<T> {
    /// Create a machine agent with a generated id and register it with
    /// `space`. Workers start when the space answers the registration.
    pub async fn connect(space: Arc<dyn RemoteSpace<T>>, config: GridConfig) -> Result<Arc<Self>> {
        Self::connect_with_id(space, ComputerId::generate("computer"), config).await
    }

    pub async fn connect_with_id(
        space: Arc<dyn RemoteSpace<T>>,
        id: ComputerId,
        config: GridConfig,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let processors = config.processors;
        let computer = Arc::new(Self::new(id.clone(), Arc::clone(&space), config));
        let plan = space
            .register(computer.clone() as Arc<dyn RemoteComputer<T>>, id.clone(), processors)
            .await?;
        info!(
            computer = %id,
            workers = plan.workers,
            queue_capacity = plan.queue_capacity,
            "computer connected"
        );
        Ok(computer)
    }

    /// A detached agent; nothing runs until `start_workers` is called
    pub fn new(id: ComputerId, space: Arc<dyn RemoteSpace<T>>, config: GridConfig) -> Self {
        let (outbox, outbox_rx) = mpsc::unbounded_channel();
        Self {
            id,
            space,
            queue_capacity: AtomicUsize::new(config.task_queue_min_size),
            workers: AtomicUsize::new(0),
            config,
            queue: Arc::new(ReadyQueue::new()),
            shared: Arc::new(SharedCell::new(T::Shared::default())),
            outbox,
            outbox_rx: Mutex::new(Some(outbox_rx)),
            alive: AtomicBool::new(true),
            started: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &ComputerId {
        &self.id
    }

    /// What a task running here sees
    pub fn context(&self) -> TaskContext<T::Shared> {
        TaskContext::new(self.id.clone(), Arc::clone(&self.shared), self.outbox.clone())
    }

    /// Propose an improvement of the shared value. Installed locally and
    /// forwarded to the space only if it beats the local copy.
    pub fn broadcast(&self, proposed: T::Shared) -> bool {
        self.context().broadcast(proposed)
    }

    pub fn shared_value(&self) -> T::Shared {
        self.shared.get()
    }

    /// Worker loops started at registration
    pub fn worker_count(&self) -> usize {
        self.workers.load(Ordering::Acquire)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Stop every worker, the sink and the forwarder, and drop the local
    /// queue. Later calls from the space fail as a dead machine would.
    pub fn shutdown(&self) {
        if !self.alive.swap(false, Ordering::AcqRel) {
            return;
        }
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
        let dropped = self.queue.clear().len();
        warn!(computer = %self.id, dropped, "computer shut down");
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(GridError::transport(&self.id, "computer is not running"))
        }
    }

    fn spawn_forwarder(&self) -> Option<JoinHandle<()>> {
        let mut proposals = self.outbox_rx.lock().take()?;
        let space = Arc::clone(&self.space);
        let id = self.id.clone();
        Some(tokio::spawn(async move {
            while let Some(proposed) = proposals.recv().await {
                match space.broadcast(proposed, &id).await {
                    Ok(accepted) => debug!(computer = %id, accepted, "broadcast forwarded"),
                    Err(e) => warn!(computer = %id, "broadcast failed: {}", e),
                }
            }
        }))
    }
}

#[async_trait]
impl<T: Task> RemoteComputer<T> for Computer<T> {
    async fn add_tasks(&self, mut batch: Vec<TaskNode<T>>) -> Result<()> {
        self.ensure_alive()?;
        for task in batch.iter_mut() {
            task.executor = Some(self.id.clone());
        }
        debug!(computer = %self.id, count = batch.len(), "tasks received");
        self.queue.push_all(batch);
        Ok(())
    }

    async fn start_workers(&self, workers: usize, queue_capacity: usize) -> Result<()> {
        self.ensure_alive()?;
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(GridError::AlreadyStarted(self.id.clone()));
        }
        self.queue_capacity.store(queue_capacity, Ordering::Release);
        self.workers.store(workers, Ordering::Release);

        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let mut handles = Vec::with_capacity(workers + 2);
        for index in 0..workers {
            handles.push(tokio::spawn(worker::run(
                index,
                self.context(),
                Arc::clone(&self.queue),
                results_tx.clone(),
            )));
        }
        drop(results_tx);

        let sink = ResultSink {
            computer: self.id.clone(),
            space: Arc::clone(&self.space),
            queue: Arc::clone(&self.queue),
            queue_capacity,
            batch_size: self.config.result_batch_size,
        };
        handles.push(tokio::spawn(sink.run(results_rx)));
        handles.extend(self.spawn_forwarder());

        self.handles.lock().extend(handles);
        info!(computer = %self.id, workers, queue_capacity, "workers started");
        Ok(())
    }

    async fn task_queue_size(&self) -> Result<usize> {
        self.ensure_alive()?;
        Ok(self.queue.len())
    }

    async fn task_queue_max_size(&self) -> Result<usize> {
        self.ensure_alive()?;
        Ok(self.queue_capacity.load(Ordering::Acquire))
    }

    async fn shared(&self) -> Result<T::Shared> {
        self.ensure_alive()?;
        Ok(self.shared.get())
    }

    async fn set_shared(&self, shared: T::Shared) -> Result<()> {
        self.ensure_alive()?;
        self.shared.replace(shared);
        Ok(())
    }

    async fn update_shared(&self, shared: T::Shared) -> Result<bool> {
        self.ensure_alive()?;
        Ok(self.shared.merge(shared))
    }
}

impl<T: Task> Drop for Computer<T> {
    fn drop(&mut self) {
        for handle in self.handles.get_mut().drain(..) {
            handle.abort();
        }
    }
}
