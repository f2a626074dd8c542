/*!
 * Task Registry
 * Fire-and-forget units of work over the process pool
 */

use crate::core::types::WorkerId;
use crate::pool::{PassThroughFn, PoolError, PoolResult, ProcessPool};
use crate::protocol::Message;
use dashmap::DashMap;
use log::warn;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Well-known callable dispatched by [`TaskRegistry::run`]. The worker
/// side registers it to set up a batch session (authenticated, optional
/// impersonated user), instantiate the target unit, and invoke the
/// method.
pub const TASK_CALLABLE: &str = "task.run";

#[derive(Default)]
struct TaskState {
    buffer: Mutex<VecDeque<Message>>,
    finished: AtomicBool,
    died: AtomicBool,
}

/// Starts named units of work without waiting for completion; callers
/// poll later by worker id or kill the worker outright.
pub struct TaskRegistry {
    pool: ProcessPool,
    tasks: Arc<DashMap<WorkerId, Arc<TaskState>>>,
}

impl TaskRegistry {
    pub fn new(pool: ProcessPool) -> Self {
        Self {
            pool,
            tasks: Arc::new(DashMap::new()),
        }
    }

    /// Start a unit of work if a worker is available right now.
    ///
    /// Returns `None` when the pool is saturated; the caller decides
    /// whether to retry. Every message the worker emits is buffered for
    /// [`get_result`](Self::get_result) by a background pump, which also
    /// releases the worker on the terminal message. Must be called
    /// within a tokio runtime.
    pub fn run(
        &self,
        unit: &str,
        method: &str,
        run_as_user: Option<&str>,
        args: Vec<Value>,
    ) -> PoolResult<Option<WorkerId>> {
        let state = Arc::new(TaskState::default());

        let buffer_state = Arc::clone(&state);
        let callback: PassThroughFn = Arc::new(move |msg: &Message| {
            buffer_state.buffer.lock().push_back(msg.clone());
        });

        let Some(mut assignment) = self.pool.try_acquire(Some(callback))? else {
            return Ok(None);
        };
        let id = assignment.worker_id();

        let mut call_args = vec![
            Value::from(unit),
            Value::from(method),
            run_as_user.map(Value::from).unwrap_or(Value::Null),
        ];
        call_args.extend(args);
        assignment.request(TASK_CALLABLE, call_args)?;

        self.tasks.insert(id, Arc::clone(&state));

        tokio::spawn(async move {
            match assignment.recv().await {
                Ok(value) => state.buffer.lock().push_back(Message::Response { value }),
                Err(PoolError::Remote(error)) => {
                    state.buffer.lock().push_back(Message::Error { error })
                }
                Err(e) => {
                    warn!("task worker {} ended abnormally: {}", id, e);
                    state.died.store(true, Ordering::SeqCst);
                }
            }
            state.finished.store(true, Ordering::SeqCst);
        });

        Ok(Some(id))
    }

    /// Non-blocking poll for the next buffered message of a task.
    ///
    /// `Ok(None)` means nothing queued yet (or the task completed and
    /// was drained); an error means the worker's process is gone.
    pub fn get_result(&self, id: WorkerId) -> PoolResult<Option<Message>> {
        let state = match self.tasks.get(&id) {
            Some(entry) => Arc::clone(entry.value()),
            None => return Err(PoolError::WorkerNotFound(id)),
        };

        if let Some(msg) = state.buffer.lock().pop_front() {
            return Ok(Some(msg));
        }

        if state.died.load(Ordering::SeqCst) {
            self.tasks.remove(&id);
            return Err(PoolError::WorkerDied(id));
        }
        if state.finished.load(Ordering::SeqCst) {
            // Terminal message already drained
            self.tasks.remove(&id);
            return Ok(None);
        }

        match self.pool.is_alive(id) {
            Ok(true) => Ok(None),
            Ok(false) | Err(_) => {
                self.tasks.remove(&id);
                Err(PoolError::WorkerDied(id))
            }
        }
    }

    /// Forcibly terminate the identified worker's process; the pool
    /// detects and replaces it on the next acquisition.
    pub fn kill(&self, id: WorkerId) -> PoolResult<()> {
        self.pool.kill(id)
    }

    /// Number of tasks not yet drained.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }
}
