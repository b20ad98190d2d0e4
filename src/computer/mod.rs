//! Machine side of the grid: local queue, workers and result sink.

pub mod computer;
mod sink;
mod worker;

pub use computer::Computer;
