use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tracing::warn;

use crate::core::ids::{ComputerId, TaskId};
use crate::task::context::TaskContext;
use crate::task::shared::Shared;

/// Execution phase of a divide-and-conquer task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Decompose,
    Compose,
}

/// Whether a child was placed straight onto the producing machine's queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueuingStatus {
    NotQueued,
    Queued,
}

/// What the decompose phase of a task produced
#[derive(Debug)]
pub enum Decomposition<T: Task> {
    /// Terminal value, no children
    Value(T::Value),
    /// Branch cut off; still counts towards the parent's join
    Pruned,
    /// Children to run; must hold exactly `decomposition_size()` tasks
    Split(Vec<T>),
}

/// A divide-and-conquer workload.
///
/// The grid only ever calls these capabilities; it never looks at a
/// concrete workload type.
pub trait Task: Clone + Debug + Send + Sync + Sized + 'static {
    type Value: Clone + Debug + Send + Sync + 'static;
    type Shared: Shared;

    /// Number of children `decompose` returns when it splits. Read by the
    /// space to size the join before any child reports.
    fn decomposition_size(&self) -> usize;

    /// Terminate with a value, prune, or split into children.
    fn decompose(&self, ctx: &TaskContext<Self::Shared>) -> Decomposition<Self>;

    /// Combine the children's values. Pruned children contribute nothing, so
    /// `values` may be shorter than `decomposition_size()`.
    fn compose(
        &self,
        values: Vec<Self::Value>,
        ctx: &TaskContext<Self::Shared>,
    ) -> Option<Self::Value>;

    /// Whether the task may run on a computer hosted inside the space
    /// process when latency optimization is on.
    fn space_runnable(&self) -> bool {
        false
    }
}

/// A task instance as it travels through the grid
#[derive(Debug, Clone)]
pub struct TaskNode<T: Task> {
    pub id: TaskId,
    /// Equals `id` for a root task
    pub parent_id: TaskId,
    pub status: TaskStatus,
    pub queuing: QueuingStatus,
    pub level: u32,
    pub created_at: DateTime<Utc>,
    /// Computer currently holding the task
    pub executor: Option<ComputerId>,
    values: Vec<T::Value>,
    task: T,
}

impl<T: Task> TaskNode<T> {
    /// Wrap a top-level task submitted by a client
    pub fn root(task: T) -> Self {
        let id = TaskId::new();
        Self {
            id,
            parent_id: id,
            status: TaskStatus::Decompose,
            queuing: QueuingStatus::NotQueued,
            level: 0,
            created_at: Utc::now(),
            executor: None,
            values: Vec::new(),
            task,
        }
    }

    fn child(parent: TaskId, parent_level: u32, task: T) -> Self {
        Self {
            id: TaskId::new(),
            parent_id: parent,
            status: TaskStatus::Decompose,
            queuing: QueuingStatus::NotQueued,
            level: parent_level + 1,
            created_at: Utc::now(),
            executor: None,
            values: Vec::new(),
            task,
        }
    }

    pub fn is_root(&self) -> bool {
        self.id == self.parent_id
    }

    pub fn task(&self) -> &T {
        &self.task
    }

    pub fn decomposition_size(&self) -> usize {
        self.task.decomposition_size()
    }

    /// Deliver the children's accumulated values and switch to the compose
    /// phase
    pub fn put_values(&mut self, values: Vec<T::Value>) {
        self.values = values;
        self.status = TaskStatus::Compose;
    }

    /// Run the current phase
    pub fn execute(self, ctx: &TaskContext<T::Shared>) -> TaskResult<T> {
        let id = self.id;
        let parent_id = self.parent_id;
        let level = self.level;

        let outcome = match self.status {
            TaskStatus::Decompose => match self.task.decompose(ctx) {
                Decomposition::Value(value) => Outcome::Value(Some(value)),
                Decomposition::Pruned => Outcome::Value(None),
                Decomposition::Split(children) => {
                    let expected = self.task.decomposition_size();
                    if children.len() != expected {
                        warn!(
                            task = %id,
                            expected,
                            produced = children.len(),
                            "decomposition size does not match produced children"
                        );
                    }
                    Outcome::Subtasks(
                        children
                            .into_iter()
                            .map(|child| TaskNode::child(id, level, child))
                            .collect(),
                    )
                }
            },
            TaskStatus::Compose => Outcome::Value(self.task.compose(self.values, ctx)),
        };

        TaskResult {
            id,
            parent_id,
            outcome,
        }
    }
}

/// What executing one task produced
#[derive(Debug, Clone)]
pub enum Outcome<T: Task> {
    /// Terminal value; `None` is a pruned branch
    Value(Option<T::Value>),
    Subtasks(Vec<TaskNode<T>>),
}

/// Result of one task execution, keyed by the producing task
#[derive(Debug, Clone)]
pub struct TaskResult<T: Task> {
    pub id: TaskId,
    pub parent_id: TaskId,
    pub outcome: Outcome<T>,
}

impl<T: Task> TaskResult<T> {
    pub fn value(&self) -> Option<&T::Value> {
        match &self.outcome {
            Outcome::Value(value) => value.as_ref(),
            Outcome::Subtasks(_) => None,
        }
    }

    pub fn subtasks(&self) -> Option<&[TaskNode<T>]> {
        match &self.outcome {
            Outcome::Subtasks(children) => Some(children),
            Outcome::Value(_) => None,
        }
    }

    pub fn subtasks_mut(&mut self) -> Option<&mut Vec<TaskNode<T>>> {
        match &mut self.outcome {
            Outcome::Subtasks(children) => Some(children),
            Outcome::Value(_) => None,
        }
    }

    pub fn is_pruned(&self) -> bool {
        matches!(self.outcome, Outcome::Value(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Halve(u32);

    impl Task for Halve {
        type Value = u32;
        type Shared = ();

        fn decomposition_size(&self) -> usize {
            2
        }

        fn decompose(&self, _ctx: &TaskContext<()>) -> Decomposition<Self> {
            match self.0 {
                0 => Decomposition::Pruned,
                1 => Decomposition::Value(1),
                n => Decomposition::Split(vec![Halve(n / 2), Halve(n - n / 2)]),
            }
        }

        fn compose(&self, values: Vec<u32>, _ctx: &TaskContext<()>) -> Option<u32> {
            Some(values.into_iter().sum())
        }
    }

    #[test]
    fn test_root_is_its_own_parent() {
        let node = TaskNode::root(Halve(4));
        assert!(node.is_root());
        assert_eq!(node.level, 0);
        assert_eq!(node.status, TaskStatus::Decompose);
        assert_eq!(node.queuing, QueuingStatus::NotQueued);
    }

    #[test]
    fn test_split_wraps_children() {
        let ctx = TaskContext::detached(());
        let node = TaskNode::root(Halve(4));
        let root_id = node.id;
        let result = node.execute(&ctx);

        assert_eq!(result.id, root_id);
        let children = result.subtasks().unwrap();
        assert_eq!(children.len(), 2);
        for child in children {
            assert_eq!(child.parent_id, root_id);
            assert_eq!(child.level, 1);
            assert!(!child.is_root());
        }
    }

    #[test]
    fn test_terminal_and_pruned_outcomes() {
        let ctx = TaskContext::detached(());
        let leaf = TaskNode::root(Halve(1)).execute(&ctx);
        assert_eq!(leaf.value(), Some(&1));
        assert!(!leaf.is_pruned());

        let pruned = TaskNode::root(Halve(0)).execute(&ctx);
        assert!(pruned.is_pruned());
        assert!(pruned.subtasks().is_none());
    }

    #[test]
    fn test_compose_after_put_values() {
        let ctx = TaskContext::detached(());
        let mut node = TaskNode::root(Halve(4));
        node.put_values(vec![2, 2]);
        assert_eq!(node.status, TaskStatus::Compose);
        assert_eq!(node.execute(&ctx).value(), Some(&4));
    }
}
