/*!
 * Process Pool
 * Owns the dynamically sized worker collection and the acquisition paths
 */

use super::assignment::{Assignment, PassThroughFn};
use super::handle::WorkerHandle;
use super::types::{PoolConfig, PoolError, PoolResult};
use crate::core::types::WorkerId;
use crate::protocol::Message;
use log::{info, warn};
use parking_lot::Mutex;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

/// Manager of a bounded, dynamically sized set of worker processes.
///
/// All collection mutation happens under one guard; at most
/// `max_workers` entries exist at any time, and every worker is either
/// idle or exactly one caller's assignee. Cloning shares the pool.
#[derive(Clone)]
pub struct ProcessPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    config: PoolConfig,
    workers: Mutex<Vec<Arc<WorkerHandle>>>,
    /// Broadcast wakeup for callers blocked on a full pool
    capacity_freed: Notify,
    exiting: AtomicBool,
    next_worker_id: AtomicU32,
}

impl ProcessPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                config,
                workers: Mutex::new(Vec::new()),
                capacity_freed: Notify::new(),
                exiting: AtomicBool::new(false),
                next_worker_id: AtomicU32::new(1),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Pre-spawn `min_workers` worker processes.
    pub fn start(&self) -> PoolResult<()> {
        info!(
            "starting {} worker processes (ceiling {})",
            self.inner.config.min_workers, self.inner.config.max_workers
        );
        let mut workers = self.inner.workers.lock();
        while workers.len() < self.inner.config.min_workers {
            self.spawn_locked(&mut workers)?;
        }
        Ok(())
    }

    fn spawn_locked(
        &self,
        workers: &mut Vec<Arc<WorkerHandle>>,
    ) -> PoolResult<Arc<WorkerHandle>> {
        let id = self.inner.next_worker_id.fetch_add(1, Ordering::SeqCst);
        let handle = WorkerHandle::spawn(id, &self.inner.config)?;
        workers.push(Arc::clone(&handle));
        Ok(handle)
    }

    /// Acquire an idle worker, waiting on the capacity signal while the
    /// pool is saturated.
    ///
    /// Wakeups are broadcast and released waiters re-race for the freed
    /// slot; this is an unordered pool, not a FIFO queue.
    pub async fn acquire(&self, callback: Option<PassThroughFn>) -> PoolResult<Assignment> {
        loop {
            if self.inner.exiting.load(Ordering::SeqCst) {
                return Err(PoolError::ShuttingDown);
            }

            // Register for the wakeup before scanning so a release
            // between the scan and the await is not missed.
            let mut notified = pin!(self.inner.capacity_freed.notified());
            notified.as_mut().enable();

            if let Some(worker) = self.select()? {
                return Ok(Assignment::new(self.clone(), worker, callback));
            }

            warn!("process pool is full");
            notified.await;
        }
    }

    /// Non-blocking acquisition; `None` when the pool is saturated.
    pub fn try_acquire(&self, callback: Option<PassThroughFn>) -> PoolResult<Option<Assignment>> {
        if self.inner.exiting.load(Ordering::SeqCst) {
            return Err(PoolError::ShuttingDown);
        }
        Ok(self
            .select()?
            .map(|worker| Assignment::new(self.clone(), worker, callback)))
    }

    /// One scan under the guard: first idle worker in collection order,
    /// replacing dead entries eagerly, spawning below the ceiling.
    fn select(&self) -> PoolResult<Option<Arc<WorkerHandle>>> {
        let mut workers = self.inner.workers.lock();
        'rescan: loop {
            for i in 0..workers.len() {
                let worker = Arc::clone(&workers[i]);
                if worker.is_busy() {
                    continue;
                }
                if !worker.is_alive() {
                    warn!(
                        "worker {} is not responding, adding a new worker to pool",
                        worker.id()
                    );
                    workers.remove(i);
                    self.spawn_locked(&mut workers)?;
                    continue 'rescan;
                }
                worker.set_busy(true);
                return Ok(Some(worker));
            }

            if workers.len() < self.inner.config.max_workers {
                let worker = self.spawn_locked(&mut workers)?;
                worker.set_busy(true);
                return Ok(Some(worker));
            }

            return Ok(None);
        }
    }

    /// Return a worker to the idle set and wake blocked acquirers.
    pub(super) fn release(&self, worker: &Arc<WorkerHandle>) {
        {
            let _guard = self.inner.workers.lock();
            worker.set_keep_alive(false);
            worker.set_busy(false);
        }
        self.inner.capacity_freed.notify_waiters();
    }

    /// Fan a reload notification out to every live worker.
    pub fn notify_reload(&self, module: &str) {
        let workers: Vec<_> = self.inner.workers.lock().iter().cloned().collect();
        for worker in workers {
            let msg = Message::Reload {
                module: module.to_string(),
            };
            if let Err(e) = worker.write(&msg) {
                warn!("could not notify worker {} of reload: {}", worker.id(), e);
            }
        }
    }

    /// Forcibly terminate one worker's process.
    ///
    /// The dead entry stays in the collection until the next acquisition
    /// scan detects and replaces it.
    pub fn kill(&self, id: WorkerId) -> PoolResult<()> {
        self.find(id).ok_or(PoolError::WorkerNotFound(id))?.kill()
    }

    /// Lazy liveness of one worker.
    pub fn is_alive(&self, id: WorkerId) -> PoolResult<bool> {
        Ok(self
            .find(id)
            .ok_or(PoolError::WorkerNotFound(id))?
            .is_alive())
    }

    fn find(&self, id: WorkerId) -> Option<Arc<WorkerHandle>> {
        self.inner
            .workers
            .lock()
            .iter()
            .find(|w| w.id() == id)
            .cloned()
    }

    pub fn worker_count(&self) -> usize {
        self.inner.workers.lock().len()
    }

    pub fn busy_count(&self) -> usize {
        self.inner.workers.lock().iter().filter(|w| w.is_busy()).count()
    }

    /// Stop the pool: unblock waiters, close every channel, terminate
    /// every process, and drop the entries as they confirm exit.
    pub async fn stop(&self) {
        self.inner.exiting.store(true, Ordering::SeqCst);
        self.inner.capacity_freed.notify_waiters();

        let workers: Vec<_> = {
            let mut guard = self.inner.workers.lock();
            guard.drain(..).collect()
        };

        for worker in &workers {
            worker.close_channel();
        }
        for worker in workers {
            let _ = tokio::task::spawn_blocking(move || worker.shutdown(SHUTDOWN_GRACE)).await;
        }

        info!("process pool stopped");
    }
}
