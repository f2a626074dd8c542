/*!
 * Pool Types
 * Configuration and errors for the process pool
 */

use crate::core::types::WorkerId;
use crate::protocol::{ProtocolError, RemoteFailure};
use thiserror::Error;

/// Pool operation result
pub type PoolResult<T> = Result<T, PoolError>;

/// Pool errors
#[derive(Error, Debug)]
pub enum PoolError {
    /// The callable raised inside the worker; payload delivered verbatim
    #[error("remote failure: {0}")]
    Remote(RemoteFailure),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("worker {0} not found")]
    WorkerNotFound(WorkerId),

    #[error("worker {0} died")]
    WorkerDied(WorkerId),

    #[error("pool is shutting down")]
    ShuttingDown,

    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl PoolError {
    /// The structured remote payload, when this is an application error.
    pub fn remote(&self) -> Option<&RemoteFailure> {
        match self {
            PoolError::Remote(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Command line used to launch one worker process.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Relaunch the current executable in worker mode.
    pub fn current_exe() -> Self {
        let program = std::env::current_exe()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "procpool".to_string());
        Self::new(program).with_args(vec!["worker".to_string()])
    }
}

/// Process pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Instance identifier passed to every worker's bootstrap payload
    pub instance: String,
    /// Workers pre-spawned at start
    pub min_workers: usize,
    /// Hard ceiling on live workers
    pub max_workers: usize,
    /// How worker processes are launched
    pub worker_command: WorkerCommand,
    /// Log filter forwarded to workers
    pub log_level: String,
    /// Installation root forwarded to workers for trace relativization
    pub base_path: Option<String>,
}

impl PoolConfig {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            min_workers: 2,
            max_workers: 8,
            worker_command: WorkerCommand::current_exe(),
            log_level: "info".to_string(),
            base_path: None,
        }
    }

    pub fn with_min_workers(mut self, min_workers: usize) -> Self {
        self.min_workers = min_workers;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_worker_command(mut self, command: WorkerCommand) -> Self {
        self.worker_command = command;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_base_path(mut self, path: impl Into<String>) -> Self {
        self.base_path = Some(path.into());
        self
    }
}
