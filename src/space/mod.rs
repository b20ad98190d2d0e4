//! Coordinator side of the grid.

pub mod proxy;
pub mod space;
pub mod stats;

pub use proxy::{least_loaded, ComputerProxy, LoadSnapshot};
pub use space::{LocalSpace, Space};
pub use stats::SpaceStats;
