use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::core::ids::{ComputerId, TaskId};
use crate::core::ready_queue::ReadyQueue;
use crate::task::{QueuingStatus, Task, TaskNode};
use crate::transport::RemoteComputer;

/// Tasks the space believes are resident on one machine
pub(crate) struct ProxyState<T: Task> {
    pub(crate) tasks: HashMap<TaskId, TaskNode<T>>,
    pub(crate) failed: bool,
}

/// Space-side stand-in for one registered machine.
///
/// The in-flight set is only touched under the proxy's own lock, and an
/// eviction flips `failed` under that same lock, so ingestion of the
/// machine's results and its eviction never interleave.
pub struct ComputerProxy<T: Task> {
    id: ComputerId,
    remote: Arc<dyn RemoteComputer<T>>,
    capacity: usize,
    load: AtomicUsize,
    last_selected: AtomicU64,
    state: Mutex<ProxyState<T>>,
}

impl<T: Task> ComputerProxy<T> {
    pub fn new(id: ComputerId, remote: Arc<dyn RemoteComputer<T>>, capacity: usize) -> Self {
        Self {
            id,
            remote,
            capacity,
            load: AtomicUsize::new(0),
            last_selected: AtomicU64::new(0),
            state: Mutex::new(ProxyState {
                tasks: HashMap::new(),
                failed: false,
            }),
        }
    }

    pub fn id(&self) -> &ComputerId {
        &self.id
    }

    pub fn remote(&self) -> &Arc<dyn RemoteComputer<T>> {
        &self.remote
    }

    /// Local queue capacity of the machine
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Last known queue size of the machine
    pub fn load(&self) -> usize {
        self.load.load(Ordering::Acquire)
    }

    pub fn set_load(&self, load: usize) {
        self.load.store(load, Ordering::Release);
    }

    pub(crate) fn mark_selected(&self, seq: u64) {
        self.last_selected.store(seq, Ordering::Release);
    }

    pub fn snapshot(&self) -> LoadSnapshot {
        LoadSnapshot {
            id: self.id.clone(),
            load: self.load(),
            last_selected: self.last_selected.load(Ordering::Acquire),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ProxyState<T>> {
        self.state.lock()
    }

    /// Remember a batch about to be sent. Returns false if the proxy was
    /// evicted meanwhile; the caller still owns the batch.
    pub(crate) fn track(&self, batch: &[TaskNode<T>]) -> bool {
        let mut state = self.state.lock();
        if state.failed {
            return false;
        }
        for task in batch {
            state.tasks.insert(task.id, task.clone());
        }
        true
    }

    /// Mark the proxy failed and move every resident task back onto
    /// `ready` in one step. Returns how many tasks were recovered, or `None`
    /// if the proxy had already been evicted.
    pub(crate) fn evict_into(&self, ready: &ReadyQueue<TaskNode<T>>) -> Option<usize> {
        let mut state = self.state.lock();
        if state.failed {
            return None;
        }
        state.failed = true;
        let recovered: Vec<TaskNode<T>> = state
            .tasks
            .drain()
            .map(|(_, mut task)| {
                task.queuing = QueuingStatus::NotQueued;
                task.executor = None;
                task
            })
            .collect();
        let count = recovered.len();
        debug!(computer = %self.id, count, "returning resident tasks to ready queue");
        ready.push_all(recovered);
        Some(count)
    }

    pub fn is_failed(&self) -> bool {
        self.state.lock().failed
    }

    /// Number of tasks believed resident on the machine
    pub fn in_flight(&self) -> usize {
        self.state.lock().tasks.len()
    }

    pub fn resident_ids(&self) -> Vec<TaskId> {
        self.state.lock().tasks.keys().copied().collect()
    }
}

/// Point-in-time view of a proxy used to pick a dispatch target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSnapshot {
    pub id: ComputerId,
    pub load: usize,
    pub last_selected: u64,
}

/// Pick the proxy with the smallest load estimate.
///
/// Ties go to the proxy selected least recently, then to the smallest id,
/// so equally loaded machines are served in turn.
pub fn least_loaded(snapshots: &[LoadSnapshot]) -> Option<&LoadSnapshot> {
    snapshots
        .iter()
        .min_by(|a, b| {
            a.load
                .cmp(&b.load)
                .then(a.last_selected.cmp(&b.last_selected))
                .then_with(|| a.id.cmp(&b.id))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: &str, load: usize, last_selected: u64) -> LoadSnapshot {
        LoadSnapshot {
            id: ComputerId::new(id),
            load,
            last_selected,
        }
    }

    #[test]
    fn test_picks_smallest_load() {
        let snapshots = vec![snapshot("a", 5, 0), snapshot("b", 2, 0), snapshot("c", 9, 0)];
        assert_eq!(least_loaded(&snapshots).unwrap().id, ComputerId::new("b"));
    }

    #[test]
    fn test_tie_goes_to_least_recently_selected() {
        let snapshots = vec![snapshot("a", 1, 7), snapshot("b", 1, 3), snapshot("c", 4, 0)];
        assert_eq!(least_loaded(&snapshots).unwrap().id, ComputerId::new("b"));

        let snapshots = vec![snapshot("z", 0, 0), snapshot("y", 0, 0)];
        assert_eq!(least_loaded(&snapshots).unwrap().id, ComputerId::new("y"));
    }

    #[test]
    fn test_empty_set_has_no_target() {
        assert!(least_loaded(&[]).is_none());
    }
}
