use std::sync::Arc;
use std::time::Duration;

use spacegrid::{Computer, GridConfig, Space, Task};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A running space with `machines` in-process computers attached
pub async fn grid<T: Task>(
    config: GridConfig,
    machines: usize,
) -> (Arc<Space<T>>, Vec<Arc<Computer<T>>>) {
    init_tracing();
    let space = Space::<T>::start(config.clone()).await.unwrap();
    let mut computers = Vec::with_capacity(machines);
    for _ in 0..machines {
        computers.push(Computer::connect(space.handle(), config.clone()).await.unwrap());
    }
    (space, computers)
}

pub const LIMIT: Duration = Duration::from_secs(30);
