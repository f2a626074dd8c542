/*!
 * Worker-Side Control
 * Child endpoint of the duplex channel; used only inside a worker process
 */

use super::runtime::WorkerRuntime;
use crate::protocol::{codec, Message, ProtocolError, ProtocolResult, RemoteFailure};
use log::warn;
use serde_json::Value;
use std::io::{BufRead, Write};

/// Object-safe view of a [`Control`], handed to callables through
/// [`CallContext`](super::CallContext).
pub trait ControlPort {
    fn send(&mut self, value: Value) -> ProtocolResult<()>;
    fn sendrecv(&mut self, value: Value, runtime: &mut dyn WorkerRuntime) -> ProtocolResult<Value>;
    fn response(&mut self, value: Value) -> ProtocolResult<()>;
    fn error(&mut self, failure: RemoteFailure);
}

/// Child side of the channel to the parent process.
///
/// Generic over the endpoints so it runs over stdio in production and
/// over in-memory or socket pairs in tests.
pub struct Control<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> Control<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Next inbound message; `Ok(None)` on end-of-channel.
    pub fn read(&mut self) -> ProtocolResult<Option<Message>> {
        codec::read_message(&mut self.reader)
    }

    fn write(&mut self, msg: &Message) -> ProtocolResult<()> {
        codec::write_message(&mut self.writer, msg)
    }

    /// Emit a one-way pass-through message.
    pub fn send(&mut self, value: Value) -> ProtocolResult<()> {
        self.write(&Message::Send { value })
    }

    /// Emit a blocking pass-through message and wait for the answer.
    ///
    /// The worker's only thread suspends on the channel read until an
    /// `answer` arrives; an inbound `error` raises as an abort, and
    /// `reload` notifications are serviced transparently while blocked.
    pub fn sendrecv(
        &mut self,
        value: Value,
        runtime: &mut dyn WorkerRuntime,
    ) -> ProtocolResult<Value> {
        self.write(&Message::SendRecv { value })?;
        loop {
            match self.read()? {
                None => return Err(ProtocolError::Closed),
                Some(Message::Answer { value }) => return Ok(value),
                Some(Message::Error { error }) => {
                    return Err(ProtocolError::Aborted(error.message))
                }
                Some(Message::Reload { module }) => runtime.reload(&module),
                Some(other) => return Err(ProtocolError::Unexpected(other.kind())),
            }
        }
    }

    /// Emit the terminal success message.
    pub fn response(&mut self, value: Value) -> ProtocolResult<()> {
        self.write(&Message::Response { value })
    }

    /// Best-effort emit of the terminal failure message.
    ///
    /// Send failures are swallowed: the parent detects the dead process
    /// at its next acquisition and recovers on its own.
    pub fn error(&mut self, failure: RemoteFailure) {
        if let Err(e) = self.write(&Message::Error { error: failure }) {
            warn!("could not report error to parent: {}", e);
        }
    }
}

impl<R: BufRead, W: Write> ControlPort for Control<R, W> {
    fn send(&mut self, value: Value) -> ProtocolResult<()> {
        Control::send(self, value)
    }

    fn sendrecv(&mut self, value: Value, runtime: &mut dyn WorkerRuntime) -> ProtocolResult<Value> {
        Control::sendrecv(self, value, runtime)
    }

    fn response(&mut self, value: Value) -> ProtocolResult<()> {
        Control::response(self, value)
    }

    fn error(&mut self, failure: RemoteFailure) {
        Control::error(self, failure)
    }
}
