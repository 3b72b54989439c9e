pub mod failure;
pub mod gate;
pub mod queue;
pub mod worker_pool;

pub use failure::FailureSlot;
pub use gate::{GateSummary, GateTurn, OrderedWriteGate};
pub use queue::BoundedBlockQueue;
pub use worker_pool::{PoolRuntimeSnapshot, WorkerPool, WorkerRuntimeSnapshot};
