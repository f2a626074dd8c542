/*!
 * Monitoring Module
 * Tracing setup for the parent process
 */

pub mod tracer;

pub use tracer::init_tracing;
