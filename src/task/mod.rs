//! Task contract, results, shared state and the join primitive.

pub mod context;
pub mod model;
pub mod shared;
pub mod successor;

pub use context::*;
pub use model::*;
pub use shared::*;
pub use successor::*;
