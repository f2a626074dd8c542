/*!
 * Worker Module
 * Everything that runs inside a worker process: the control channel,
 * callable resolution, and the request loop
 */

pub mod control;
pub mod entry;
pub mod registry;
pub mod runtime;

// Re-export for convenience
pub use control::{Control, ControlPort};
pub use entry::{read_bootstrap, run_worker, worker_main, Bootstrap};
pub use registry::{CallContext, Callable, CallableRegistry};
pub use runtime::{NullRuntime, WorkerRuntime};
