/*!
 * Worker Handle
 * Parent-side representation of one worker process and its channel
 */

use super::types::{PoolConfig, PoolError, PoolResult};
use crate::core::types::WorkerId;
use crate::protocol::{codec, Message, ProtocolError};
use crate::worker::Bootstrap;
use log::{info, warn};
use parking_lot::Mutex;
use std::io::{BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One worker process as seen by the pool.
///
/// The `busy` and `keep_alive` flags move only under the pool's guard or
/// from the holder of the current assignment; the channel halves carry
/// their own locks so writes and the blocking read never contend with
/// pool bookkeeping.
pub struct WorkerHandle {
    id: WorkerId,
    child: Mutex<Child>,
    writer: Mutex<Option<ChildStdin>>,
    reader: Arc<Mutex<BufReader<ChildStdout>>>,
    busy: AtomicBool,
    keep_alive: AtomicBool,
}

impl WorkerHandle {
    /// Spawn a worker process and deliver its bootstrap payload.
    ///
    /// stderr is inherited so the worker's local log output reaches the
    /// parent's.
    pub(super) fn spawn(id: WorkerId, config: &PoolConfig) -> PoolResult<Arc<Self>> {
        let mut child = Command::new(&config.worker_command.program)
            .args(&config.worker_command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                PoolError::SpawnFailed(format!("{}: {}", config.worker_command.program, e))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| PoolError::SpawnFailed("worker stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PoolError::SpawnFailed("worker stdout not captured".to_string()))?;

        let boot = Bootstrap {
            instance: config.instance.clone(),
            log_level: config.log_level.clone(),
            base_path: config.base_path.clone(),
        };
        let line = serde_json::to_string(&boot).map_err(ProtocolError::from)?;
        writeln!(stdin, "{}", line)?;
        stdin.flush()?;

        info!("spawned worker {} (os pid {})", id, child.id());

        Ok(Arc::new(Self {
            id,
            child: Mutex::new(child),
            writer: Mutex::new(Some(stdin)),
            reader: Arc::new(Mutex::new(BufReader::new(stdout))),
            busy: AtomicBool::new(false),
            keep_alive: AtomicBool::new(false),
        }))
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn os_pid(&self) -> u32 {
        self.child.lock().id()
    }

    pub(super) fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub(super) fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }

    pub(crate) fn keep_alive(&self) -> bool {
        self.keep_alive.load(Ordering::SeqCst)
    }

    pub(crate) fn set_keep_alive(&self, keep_alive: bool) {
        self.keep_alive.store(keep_alive, Ordering::SeqCst);
    }

    /// Lazy liveness check; never blocks.
    pub(super) fn is_alive(&self) -> bool {
        matches!(self.child.lock().try_wait(), Ok(None))
    }

    /// Write one message on the channel.
    pub(crate) fn write(&self, msg: &Message) -> PoolResult<()> {
        let mut guard = self.writer.lock();
        let writer = guard.as_mut().ok_or(PoolError::WorkerDied(self.id))?;
        codec::write_message(writer, msg)?;
        Ok(())
    }

    /// Shared reader half, locked by whoever performs the blocking read.
    pub(crate) fn reader(&self) -> Arc<Mutex<BufReader<ChildStdout>>> {
        Arc::clone(&self.reader)
    }

    /// Close the parent end of the channel; the worker sees EOF and
    /// shuts down cleanly.
    pub(super) fn close_channel(&self) {
        *self.writer.lock() = None;
    }

    /// Forcibly terminate the worker's process and reap it.
    pub(crate) fn kill(&self) -> PoolResult<()> {
        let mut child = self.child.lock();
        match child.kill() {
            Ok(()) => {
                let _ = child.wait();
                info!("killed worker {} (os pid {})", self.id, child.id());
                Ok(())
            }
            // Already exited and reaped
            Err(_) => Ok(()),
        }
    }

    /// Wait up to `grace` for a clean exit, then terminate.
    pub(super) fn shutdown(&self, grace: Duration) {
        let deadline = Instant::now() + grace;
        loop {
            let mut child = self.child.lock();
            match child.try_wait() {
                Ok(Some(status)) => {
                    info!("worker {} exited with {:?}", self.id, status.code());
                    return;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("could not reap worker {}: {}", self.id, e);
                    return;
                }
            }
            if Instant::now() >= deadline {
                if let Err(e) = child.kill() {
                    warn!("could not kill worker {}: {}", self.id, e);
                }
                let _ = child.wait();
                info!("worker {} terminated", self.id);
                return;
            }
            drop(child);
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("busy", &self.is_busy())
            .field("keep_alive", &self.keep_alive())
            .finish()
    }
}
