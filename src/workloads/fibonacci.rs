use serde::{Deserialize, Serialize};

use crate::task::{Decomposition, Task, TaskContext};

/// `F(n)` with `F(0) = 0`, `F(1) = 1`, split as `F(n-1) + F(n-2)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fibonacci {
    pub n: u32,
}

impl Fibonacci {
    pub fn new(n: u32) -> Self {
        Self { n }
    }

    /// Nodes in the task tree for `F(n)`
    pub fn tree_size(n: u32) -> u64 {
        match n {
            0 | 1 => 1,
            n => 1 + Self::tree_size(n - 1) + Self::tree_size(n - 2),
        }
    }
}

impl Task for Fibonacci {
    type Value = u64;
    type Shared = ();

    fn decomposition_size(&self) -> usize {
        2
    }

    fn decompose(&self, _ctx: &TaskContext<()>) -> Decomposition<Self> {
        match self.n {
            0 | 1 => Decomposition::Value(self.n as u64),
            n => Decomposition::Split(vec![Fibonacci::new(n - 1), Fibonacci::new(n - 2)]),
        }
    }

    fn compose(&self, values: Vec<u64>, _ctx: &TaskContext<()>) -> Option<u64> {
        Some(values.into_iter().sum())
    }

    fn space_runnable(&self) -> bool {
        true
    }
}
