//! Continuation-passing join for decomposed tasks.
//!
//! When a task splits, the space parks it in a [`Successor`] whose
//! [`Closure`] counts the children still outstanding. Every child outcome,
//! pruned ones included, decrements the counter; at zero the parked task
//! receives the collected values and becomes ready to compose.

use crate::core::errors::{GridError, Result};
use crate::core::ids::TaskId;
use crate::task::model::{Task, TaskNode};

/// State of a join after one child outcome was delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    Pending { remaining: usize },
    Ready,
}

/// Missing-argument holder of one pending join
#[derive(Debug)]
pub struct Closure<V> {
    join_counter: usize,
    values: Vec<V>,
}

impl<V> Closure<V> {
    pub fn new(join_counter: usize) -> Self {
        Self {
            join_counter,
            values: Vec::with_capacity(join_counter),
        }
    }

    /// Record one child outcome. `None` decrements without contributing.
    /// Returns `None` if the join had already completed.
    pub fn put(&mut self, value: Option<V>) -> Option<JoinState> {
        if self.join_counter == 0 {
            return None;
        }
        if let Some(value) = value {
            self.values.push(value);
        }
        self.join_counter -= 1;
        Some(match self.join_counter {
            0 => JoinState::Ready,
            remaining => JoinState::Pending { remaining },
        })
    }

    pub fn remaining(&self) -> usize {
        self.join_counter
    }

    pub fn values(&self) -> &[V] {
        &self.values
    }

    pub fn into_values(self) -> Vec<V> {
        self.values
    }
}

/// A decomposed task waiting for its children
#[derive(Debug)]
pub struct Successor<T: Task> {
    task: TaskNode<T>,
    closure: Closure<T::Value>,
}

impl<T: Task> Successor<T> {
    pub fn new(task: TaskNode<T>, join_counter: usize) -> Self {
        Self {
            task,
            closure: Closure::new(join_counter),
        }
    }

    pub fn id(&self) -> TaskId {
        self.task.id
    }

    pub fn remaining(&self) -> usize {
        self.closure.remaining()
    }

    pub fn closure(&self) -> &Closure<T::Value> {
        &self.closure
    }

    pub fn put(&mut self, value: Option<T::Value>) -> Result<JoinState> {
        self.closure.put(value).ok_or_else(|| GridError::JoinOverflow {
            task_id: self.task.id.to_string(),
        })
    }

    /// Hand the collected values to the parked task, which flips to the
    /// compose phase
    pub fn into_ready_task(self) -> TaskNode<T> {
        let mut task = self.task;
        task.put_values(self.closure.into_values());
        task
    }
}
