//! Space - the coordinator of the grid
//!
//! Owns the global ready queue, the waiting-join table, one completion slot
//! per submitted root task, the proxy registry and the master shared copy.
//! A single dispatch loop hands batches to the least loaded machine while
//! `report_results`, `register` and `broadcast` run concurrently with it.
//!
//! Lock order, outermost first: a proxy's state lock, the waiting table, the
//! ready queue. The registry lock is never held across a remote call.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::computer::Computer;
use crate::core::config::{GridConfig, WorkerPlan};
use crate::core::errors::{GridError, Result};
use crate::core::ids::{ComputerId, TaskId};
use crate::core::ready_queue::ReadyQueue;
use crate::space::proxy::{least_loaded, ComputerProxy, LoadSnapshot};
use crate::space::stats::{SpaceCounters, SpaceStats};
use crate::task::{
    JoinState, Outcome, QueuingStatus, SharedCell, Successor, Task, TaskNode, TaskResult,
};
use crate::transport::{RemoteComputer, RemoteSpace};

/// The coordinator
pub struct Space<T: Task> {
    config: RwLock<GridConfig>,
    ready: ReadyQueue<TaskNode<T>>,
    waiting: DashMap<TaskId, Successor<T>>,
    proxies: RwLock<HashMap<ComputerId, Arc<ComputerProxy<T>>>>,
    completions: DashMap<TaskId, oneshot::Sender<Option<T::Value>>>,
    shared: SharedCell<T::Shared>,
    counters: SpaceCounters,
    selection_seq: AtomicU64,
    shutting_down: AtomicBool,
    shutdown_signal: Notify,
    dispatch_handle: Mutex<Option<JoinHandle<()>>>,
    local_computer: Mutex<Option<Arc<Computer<T>>>>,
    this: Weak<Space<T>>,
}

impl<T: Task> Space<T> {
    /// Create a space without starting its dispatch loop. Drive it with
    /// [`Space::dispatch_once`] or call [`Space::spawn_dispatch_loop`].
    pub fn new(config: GridConfig) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new_cyclic(|this| Self {
            config: RwLock::new(config),
            ready: ReadyQueue::new(),
            waiting: DashMap::new(),
            proxies: RwLock::new(HashMap::new()),
            completions: DashMap::new(),
            shared: SharedCell::new(T::Shared::default()),
            counters: SpaceCounters::new(),
            selection_seq: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
            shutdown_signal: Notify::new(),
            dispatch_handle: Mutex::new(None),
            local_computer: Mutex::new(None),
            this: this.clone(),
        }))
    }

    /// Create a space and start its dispatch loop
    pub async fn start(config: GridConfig) -> Result<Arc<Self>> {
        let space = Self::new(config)?;
        space.spawn_dispatch_loop().await;
        Ok(space)
    }

    pub async fn spawn_dispatch_loop(self: &Arc<Self>) {
        let mut handle = self.dispatch_handle.lock().await;
        if handle.is_some() {
            return;
        }
        let space = Arc::clone(self);
        *handle = Some(tokio::spawn(async move { space.run().await }));
    }

    async fn run(self: Arc<Self>) {
        info!("dispatch loop started");
        while !self.shutting_down.load(Ordering::Acquire) {
            if self.dispatch_once().await > 0 {
                continue;
            }
            let interval = self.config.read().dispatch_interval;
            tokio::select! {
                _ = self.shutdown_signal.notified() => break,
                _ = self.ready.notified() => {}
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!("dispatch loop stopped");
    }

    /// Stop the dispatch loop and the in-process computer. Pending
    /// submissions fail with [`GridError::ShuttingDown`].
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown_signal.notify_waiters();
        let handle = self.dispatch_handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("dispatch loop ended abnormally: {}", e);
            }
        }
        if let Some(local) = self.local_computer.lock().await.take() {
            local.shutdown();
        }
        self.completions.clear();
        info!("space shut down");
    }

    /// Non-owning handle through which in-process computers reach the space
    pub fn handle(&self) -> Arc<dyn RemoteSpace<T>> {
        Arc::new(LocalSpace {
            space: self.this.clone(),
        })
    }

    pub fn set_latency_optimization(&self, enabled: bool) {
        self.config.write().latency_optimization = enabled;
        info!(enabled, "latency optimization toggled");
    }

    pub fn set_multicore_optimization(&self, enabled: bool) {
        self.config.write().multicore_optimization = enabled;
        info!(enabled, "multicore optimization toggled");
    }

    pub fn config(&self) -> GridConfig {
        self.config.read().clone()
    }

    /// Master copy of the shared value
    pub fn shared(&self) -> T::Shared {
        self.shared.get()
    }

    pub fn computers(&self) -> Vec<ComputerId> {
        let mut ids: Vec<ComputerId> = self.proxies.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn proxy(&self, id: &ComputerId) -> Option<Arc<ComputerProxy<T>>> {
        self.proxies.read().get(id).cloned()
    }

    pub fn stats(&self) -> SpaceStats {
        SpaceStats {
            ready: self.ready.len(),
            waiting: self.waiting.len(),
            computers: self.proxies.read().len(),
            pending_submissions: self.completions.len(),
            ..SpaceStats::from_counters(&self.counters)
        }
    }

    /// Run a computation and wait for its root value.
    ///
    /// `shared` overwrites the master copy and every machine's copy before
    /// the root is queued. Fails fast with [`GridError::NoComputers`] when no
    /// machine could ever pick the task up. `Ok(None)` means the root
    /// itself was pruned.
    pub async fn submit(&self, task: T, shared: T::Shared) -> Result<Option<T::Value>> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(GridError::ShuttingDown);
        }

        let root = TaskNode::root(task);
        let latency = self.config.read().latency_optimization;
        if latency && root.task().space_runnable() {
            self.attach_local_computer().await?;
        }

        let proxies = self.snapshot_proxies();
        if proxies.is_empty() {
            return Err(GridError::NoComputers);
        }

        self.shared.replace(shared.clone());
        let installs = proxies.iter().map(|proxy| proxy.remote().set_shared(shared.clone()));
        for (proxy, outcome) in proxies.iter().zip(join_all(installs).await) {
            if let Err(e) = outcome {
                self.evict(proxy, &e);
            }
        }
        // every machine may have died while receiving the shared value
        let registered = self.proxies.read().len();
        if registered == 0 {
            return Err(GridError::NoComputers);
        }

        let (tx, rx) = oneshot::channel();
        let root_id = root.id;
        self.completions.insert(root_id, tx);
        info!(task = %root_id, "computation submitted");
        self.ready.push(root);

        rx.await.map_err(|_| GridError::ShuttingDown)
    }

    /// Register an in-process computer running `min_processors` workers.
    /// Idempotent; returns the id of the attached computer.
    pub async fn attach_local_computer(&self) -> Result<ComputerId> {
        let mut local = self.local_computer.lock().await;
        if let Some(computer) = local.as_ref() {
            return Ok(computer.id().clone());
        }
        let mut config = self.config();
        config.processors = config.min_processors;
        let computer = Computer::connect_with_id(
            self.handle(),
            ComputerId::generate("space"),
            config,
        )
        .await?;
        let id = computer.id().clone();
        info!(computer = %id, "local computer attached");
        *local = Some(computer);
        Ok(id)
    }

    /// One iteration of the dispatch loop. Returns the number of tasks sent.
    ///
    /// With an empty ready queue the iteration only refreshes every proxy's
    /// load, which is also where an idle dead machine gets noticed.
    pub async fn dispatch_once(&self) -> usize {
        let idle = self.ready.is_empty();
        if idle {
            self.refresh_loads().await;
            return 0;
        }

        let Some(proxy) = self.select_proxy() else {
            return 0;
        };

        let size = match proxy.remote().task_queue_size().await {
            Ok(size) => size,
            Err(e) => {
                self.evict(&proxy, &e);
                return 0;
            }
        };
        proxy.set_load(size);

        let low_water = self.config.read().dispatch_low_water;
        if size >= low_water {
            trace!(computer = %proxy.id(), size, "computer above low water");
            return 0;
        }

        let room = proxy.capacity().saturating_sub(size);
        let batch = self.ready.drain_up_to(room);
        if batch.is_empty() {
            return 0;
        }
        if !proxy.track(&batch) {
            self.ready.push_all(batch);
            return 0;
        }

        let count = batch.len();
        match proxy.remote().add_tasks(batch).await {
            Ok(()) => {
                proxy.set_load(size + count);
                self.counters.record_dispatch(count);
                debug!(computer = %proxy.id(), count, "dispatched batch");
                count
            }
            Err(e) => {
                self.evict(&proxy, &e);
                0
            }
        }
    }

    fn snapshot_proxies(&self) -> Vec<Arc<ComputerProxy<T>>> {
        self.proxies.read().values().cloned().collect()
    }

    fn select_proxy(&self) -> Option<Arc<ComputerProxy<T>>> {
        let proxies = self.proxies.read();
        let snapshots: Vec<LoadSnapshot> = proxies.values().map(|p| p.snapshot()).collect();
        let chosen = least_loaded(&snapshots)?;
        let proxy = proxies.get(&chosen.id)?.clone();
        proxy.mark_selected(self.selection_seq.fetch_add(1, Ordering::AcqRel) + 1);
        Some(proxy)
    }

    async fn refresh_loads(&self) {
        for proxy in self.snapshot_proxies() {
            match proxy.remote().task_queue_size().await {
                Ok(size) => proxy.set_load(size),
                Err(e) => self.evict(&proxy, &e),
            }
        }
    }

    /// Drop a machine after a failed call and requeue everything it held
    fn evict(&self, proxy: &Arc<ComputerProxy<T>>, error: &GridError) {
        {
            let mut proxies = self.proxies.write();
            if let Some(current) = proxies.get(proxy.id()) {
                if Arc::ptr_eq(current, proxy) {
                    proxies.remove(proxy.id());
                }
            }
        }
        if let Some(recovered) = proxy.evict_into(&self.ready) {
            self.counters.record_eviction(recovered);
            warn!(
                computer = %proxy.id(),
                recovered,
                category = error.category(),
                "evicted computer: {}",
                error
            );
        }
    }

    /// Register a machine and start its workers according to the current
    /// toggles.
    pub async fn register(
        &self,
        remote: Arc<dyn RemoteComputer<T>>,
        id: ComputerId,
        processors: usize,
    ) -> Result<WorkerPlan> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(GridError::ShuttingDown);
        }
        if processors == 0 {
            return Err(GridError::configuration_field(
                "computer must advertise at least one processor",
                "processors",
            ));
        }
        let known = self.proxies.read().contains_key(&id);
        if known {
            return Err(GridError::DuplicateComputer(id));
        }

        let plan = self.config.read().worker_plan(processors);
        remote.set_shared(self.shared.get()).await?;
        remote.start_workers(plan.workers, plan.queue_capacity).await?;
        let capacity = remote.task_queue_max_size().await?;

        let proxy = Arc::new(ComputerProxy::new(id.clone(), remote, capacity));
        match self.proxies.write().entry(id.clone()) {
            Entry::Occupied(_) => return Err(GridError::DuplicateComputer(id)),
            Entry::Vacant(slot) => {
                slot.insert(proxy);
            }
        }
        info!(
            computer = %id,
            processors,
            workers = plan.workers,
            capacity,
            "computer registered"
        );
        Ok(plan)
    }

    /// Ingest a batch of results reported by `computer`.
    ///
    /// Runs entirely under the reporting proxy's lock. Results from an
    /// evicted machine are dropped: its tasks are already back on the ready
    /// queue.
    pub fn report_results(&self, results: Vec<TaskResult<T>>, computer: &ComputerId) -> Result<()> {
        let Some(proxy) = self.proxy(computer) else {
            debug!(computer = %computer, count = results.len(), "results from unregistered computer dropped");
            return Err(GridError::UnknownComputer(computer.clone()));
        };

        let mut state = proxy.lock();
        if state.failed {
            debug!(computer = %computer, "results from evicted computer dropped");
            return Ok(());
        }

        for result in results {
            self.counters.record_result();
            let Some(mut task) = state.tasks.remove(&result.id) else {
                warn!(computer = %computer, task = %result.id, "result for task not held by computer");
                continue;
            };

            match result.outcome {
                Outcome::Subtasks(children) => {
                    let join = task.decomposition_size();
                    if join == 0 {
                        warn!(task = %task.id, "split with zero decomposition size, composing immediately");
                        task.put_values(Vec::new());
                        self.ready.push(task);
                        continue;
                    }
                    trace!(task = %task.id, join, "task decomposed");
                    self.waiting.insert(task.id, Successor::new(task, join));

                    let mut global = Vec::with_capacity(children.len());
                    for child in children {
                        match child.queuing {
                            QueuingStatus::Queued => {
                                state.tasks.insert(child.id, child);
                            }
                            QueuingStatus::NotQueued => global.push(child),
                        }
                    }
                    self.ready.push_all(global);
                }
                Outcome::Value(value) if task.is_root() => self.complete(task.id, value),
                Outcome::Value(value) => self.deliver(task.parent_id, value),
            }
        }
        Ok(())
    }

    fn complete(&self, root: TaskId, value: Option<T::Value>) {
        match self.completions.remove(&root) {
            Some((_, slot)) => {
                self.counters.record_submission_completed();
                info!(task = %root, pruned = value.is_none(), "computation complete");
                if slot.send(value).is_err() {
                    debug!(task = %root, "submitter went away");
                }
            }
            None => warn!(task = %root, "no submitter waiting for root result"),
        }
    }

    fn deliver(&self, parent: TaskId, value: Option<T::Value>) {
        let state = match self.waiting.get_mut(&parent) {
            Some(mut successor) => successor.put(value),
            None => {
                warn!(task = %parent, "no successor waiting for child outcome");
                return;
            }
        };

        match state {
            Ok(JoinState::Pending { remaining }) => {
                self.counters.record_closure_put(false);
                trace!(task = %parent, remaining, "child outcome joined");
            }
            Ok(JoinState::Ready) => {
                self.counters.record_closure_put(true);
                if let Some((_, successor)) = self.waiting.remove(&parent) {
                    trace!(task = %parent, "join complete");
                    self.ready.push(successor.into_ready_task());
                }
            }
            Err(e) => warn!(task = %parent, "{}", e),
        }
    }

    /// Accept `proposed` if it beats the master copy and fan it out to
    /// every machine except `origin`. Returns whether it was accepted.
    pub async fn broadcast(&self, proposed: T::Shared, origin: &ComputerId) -> Result<bool> {
        let accepted = self.shared.merge(proposed.clone());
        self.counters.record_broadcast(accepted);
        if !accepted {
            trace!(computer = %origin, "stale broadcast ignored");
            return Ok(false);
        }
        info!(computer = %origin, shared = ?proposed, "shared value improved");

        let targets: Vec<Arc<ComputerProxy<T>>> = self
            .snapshot_proxies()
            .into_iter()
            .filter(|proxy| proxy.id() != origin)
            .collect();
        let updates = targets
            .iter()
            .map(|proxy| proxy.remote().update_shared(proposed.clone()));
        for (proxy, outcome) in targets.iter().zip(join_all(updates).await) {
            if let Err(e) = outcome {
                self.evict(proxy, &e);
            }
        }
        Ok(true)
    }

    #[cfg(test)]
    pub(crate) fn enqueue(&self, tasks: Vec<TaskNode<T>>) {
        self.ready.push_all(tasks);
    }
}

/// Weak link from an in-process computer to its space
pub struct LocalSpace<T: Task> {
    space: Weak<Space<T>>,
}

impl<T: Task> LocalSpace<T> {
    fn space(&self) -> Result<Arc<Space<T>>> {
        self.space.upgrade().ok_or(GridError::ShuttingDown)
    }
}

#[async_trait]
impl<T: Task> RemoteSpace<T> for LocalSpace<T> {
    async fn register(
        &self,
        computer: Arc<dyn RemoteComputer<T>>,
        id: ComputerId,
        processors: usize,
    ) -> Result<WorkerPlan> {
        self.space()?.register(computer, id, processors).await
    }

    async fn report_results(
        &self,
        results: Vec<TaskResult<T>>,
        computer: &ComputerId,
    ) -> Result<()> {
        self.space()?.report_results(results, computer)
    }

    async fn broadcast(&self, proposed: T::Shared, computer: &ComputerId) -> Result<bool> {
        self.space()?.broadcast(proposed, computer).await
    }
}
