/*!
 * Core Types
 * Common types shared by the pool and worker sides
 */

/// Worker identifier, allocated sequentially by the pool
pub type WorkerId = u32;
