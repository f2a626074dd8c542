/*!
 * procpool
 * Worker process pool with a duplex parent/child control protocol:
 * each unit of work runs isolated in its own OS process, and a worker
 * can push intermediate messages to its caller (or block for an answer)
 * before delivering the terminal result.
 */

pub mod core;
pub mod monitoring;
pub mod pool;
pub mod protocol;
pub mod tasks;
pub mod worker;

// Re-exports
pub use crate::core::types::WorkerId;
pub use monitoring::init_tracing;
pub use pool::{Assignment, PassThroughFn, PoolConfig, PoolError, PoolResult, ProcessPool, WorkerCommand};
pub use protocol::{Message, ProtocolError, ProtocolResult, RemoteFailure};
pub use tasks::{TaskRegistry, TASK_CALLABLE};
pub use worker::{
    run_worker, worker_main, Bootstrap, CallContext, CallableRegistry, NullRuntime, WorkerRuntime,
};
