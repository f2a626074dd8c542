/*!
 * Assignment
 * The record binding one caller to one worker for a request cycle
 */

use super::handle::WorkerHandle;
use super::manager::ProcessPool;
use super::types::{PoolError, PoolResult};
use crate::core::types::WorkerId;
use crate::protocol::{codec, Message, ProtocolError, RemoteFailure};
use serde_json::Value;
use std::sync::Arc;

/// Synchronous callback invoked for every pass-through message received
/// while the caller's request is outstanding.
pub type PassThroughFn = Arc<dyn Fn(&Message) + Send + Sync>;

/// An acquired worker.
///
/// The pass-through callback is part of this record, not a mutable field
/// on the worker, so a late message can never reach a cleared callback.
/// Unless keepalive is set, receiving a terminal message releases the
/// worker back to the idle set; dropping the assignment releases it in
/// any case.
pub struct Assignment {
    pool: ProcessPool,
    worker: Arc<WorkerHandle>,
    callback: Option<PassThroughFn>,
    released: bool,
}

impl Assignment {
    pub(super) fn new(
        pool: ProcessPool,
        worker: Arc<WorkerHandle>,
        callback: Option<PassThroughFn>,
    ) -> Self {
        Self {
            pool,
            worker,
            callback,
            released: false,
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker.id()
    }

    /// Keep the worker bound to this caller across multiple
    /// request/response cycles instead of releasing it after one.
    pub fn set_keep_alive(&self, keep_alive: bool) {
        self.worker.set_keep_alive(keep_alive);
    }

    pub fn keep_alive(&self) -> bool {
        self.worker.keep_alive()
    }

    /// Dispatch a request to the worker.
    pub fn request(&self, callable: impl Into<String>, args: Vec<Value>) -> PoolResult<()> {
        self.worker.write(&Message::Request {
            callable: callable.into(),
            args,
            keepalive: self.worker.keep_alive(),
        })
    }

    /// Unblock the worker's pending `sendrecv`.
    pub fn answer(&self, value: Value) -> PoolResult<()> {
        self.worker.write(&Message::Answer { value })
    }

    /// Abort the worker's pending `sendrecv` with an error.
    pub fn abort(&self, message: impl Into<String>) -> PoolResult<()> {
        self.worker.write(&Message::Error {
            error: RemoteFailure::new("Aborted", message),
        })
    }

    /// Await the terminal outcome of the current request.
    ///
    /// Pass-through messages are handed to the callback and the loop
    /// continues; `response` resolves to the value and `error` to
    /// [`PoolError::Remote`]. A worker that emits `sendrecv` stays
    /// blocked until the caller delivers an answer, so interactive
    /// callers that answer from outside the callback should drive
    /// [`recv_message`](Self::recv_message) instead.
    pub async fn recv(&mut self) -> PoolResult<Value> {
        loop {
            let msg = self.recv_message().await?;
            if msg.is_pass_through() {
                if let Some(callback) = &self.callback {
                    callback(&msg);
                }
                continue;
            }
            match msg {
                Message::Response { value } => return Ok(value),
                Message::Error { error } => return Err(PoolError::Remote(error)),
                other => return Err(ProtocolError::Unexpected(other.kind()).into()),
            }
        }
    }

    /// Next raw message from the worker.
    ///
    /// The blocking channel read runs on the background-thread executor
    /// so the event loop is never blocked by a slow worker. A terminal
    /// message releases the worker unless keepalive is set;
    /// end-of-channel means the process died mid-request.
    pub async fn recv_message(&mut self) -> PoolResult<Message> {
        let reader = self.worker.reader();
        let msg = tokio::task::spawn_blocking(move || codec::read_message(&mut *reader.lock()))
            .await
            .map_err(|_| PoolError::from(ProtocolError::Closed))??;

        match msg {
            Some(msg) => {
                if msg.is_terminal() && !self.worker.keep_alive() {
                    self.release();
                }
                Ok(msg)
            }
            None => {
                let id = self.worker.id();
                self.release();
                Err(PoolError::WorkerDied(id))
            }
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.pool.release(&self.worker);
        }
    }
}

impl Drop for Assignment {
    fn drop(&mut self) {
        self.release();
    }
}
