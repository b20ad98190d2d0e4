// Core infrastructure modules
pub mod core {
    pub mod config;
    pub mod errors;
    pub mod ids;
    pub mod ready_queue;
}

pub mod task;        // Task contract, results, shared state, joins
pub mod transport;   // Remote seams between space and machines
pub mod space;       // Coordinator: dispatch, ingestion, fault recovery
pub mod computer;    // Machine agent: workers and result sink
pub mod workloads;   // Fibonacci, TSP, Mandelbrot

// Re-exports for convenience
pub use core::config::{GridConfig, GridConfigBuilder, WorkerPlan};
pub use core::errors::{GridError, Result};
pub use core::ids::{ComputerId, TaskId};
pub use computer::Computer;
pub use space::{Space, SpaceStats};
pub use task::{Decomposition, Shared, Task, TaskContext, TaskNode, TaskResult};
pub use transport::{RemoteComputer, RemoteSpace};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workloads::Fibonacci;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_space_with_local_computers() {
        let space = Space::<Fibonacci>::start(GridConfig::development())
            .await
            .unwrap();
        for _ in 0..2 {
            Computer::connect(space.handle(), GridConfig::development())
                .await
                .unwrap();
        }

        let value = tokio::time::timeout(
            Duration::from_secs(10),
            space.submit(Fibonacci::new(10), ()),
        )
        .await
        .expect("computation timed out")
        .unwrap();
        assert_eq!(value, Some(55));

        space.shutdown().await;
    }
}
