//! Divide-and-conquer workloads shipped with the grid.

pub mod fibonacci;
pub mod mandelbrot;
pub mod tsp;

pub use fibonacci::Fibonacci;
pub use mandelbrot::{MandelbrotTask, Tile};
pub use tsp::{City, Tour, TourBound, TspTask};

use crate::task::{Outcome, Task, TaskContext, TaskNode};

/// Evaluate a task tree depth-first on the calling thread.
///
/// Follows the same join rules as the grid, pruned children included, which
/// makes it the reference answer for distributed runs.
pub fn solve_sequential<T: Task>(task: T, ctx: &TaskContext<T::Shared>) -> Option<T::Value> {
    evaluate(TaskNode::root(task), ctx)
}

fn evaluate<T: Task>(node: TaskNode<T>, ctx: &TaskContext<T::Shared>) -> Option<T::Value> {
    let mut parent = node.clone();
    match node.execute(ctx).outcome {
        Outcome::Value(value) => value,
        Outcome::Subtasks(children) => {
            let values = children
                .into_iter()
                .filter_map(|child| evaluate(child, ctx))
                .collect();
            parent.put_values(values);
            parent.execute(ctx).value().cloned()
        }
    }
}
