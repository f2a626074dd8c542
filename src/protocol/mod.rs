/*!
 * Protocol Module
 * Duplex message protocol spoken between the pool and its workers
 */

pub mod codec;
pub mod failure;
pub mod message;

// Re-export for convenience
pub use codec::{read_message, write_message, ProtocolError, ProtocolResult};
pub use failure::RemoteFailure;
pub use message::Message;
