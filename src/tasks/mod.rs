/*!
 * Tasks Module
 * Fire-and-forget task dispatch over the pool
 */

pub mod registry;

// Re-export for convenience
pub use registry::{TaskRegistry, TASK_CALLABLE};
