/*!
 * Pool Module
 * Parent-side worker handles, assignments, and the process pool
 */

pub mod assignment;
pub mod handle;
pub mod manager;
pub mod types;

// Re-export for convenience
pub use assignment::{Assignment, PassThroughFn};
pub use handle::WorkerHandle;
pub use manager::ProcessPool;
pub use types::{PoolConfig, PoolError, PoolResult, WorkerCommand};
