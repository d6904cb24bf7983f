//! Worker pool and batch execution primitives shared by every stage.

pub mod batch;
pub mod pool;

pub use batch::{CompletionLatch, run_chunked};
pub use pool::{PoolConfig, RayonWorkerPool, Task, WorkerPool};
