/*!
 * Callable Registry
 * Resolves fully qualified callable names carried by request messages
 */

use super::control::ControlPort;
use super::runtime::WorkerRuntime;
use crate::protocol::ProtocolResult;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A registered callable.
///
/// The request's `callable` field must name an entry registered under
/// the same key in both parent and child; closures capturing parent
/// state do not cross the process boundary.
pub type Callable =
    Arc<dyn Fn(&mut CallContext<'_>, &[Value]) -> anyhow::Result<Value> + Send + Sync>;

/// Per-invocation context handed to a callable, exposing the control
/// channel for pass-through traffic.
pub struct CallContext<'a> {
    control: &'a mut dyn ControlPort,
    runtime: &'a mut dyn WorkerRuntime,
}

impl<'a> CallContext<'a> {
    pub(super) fn new(
        control: &'a mut dyn ControlPort,
        runtime: &'a mut dyn WorkerRuntime,
    ) -> Self {
        Self { control, runtime }
    }

    /// Emit a one-way pass-through message to the caller.
    pub fn send(&mut self, value: Value) -> ProtocolResult<()> {
        self.control.send(value)
    }

    /// Emit a blocking pass-through message and wait for the caller's
    /// answer. No other work happens in this process while blocked.
    pub fn sendrecv(&mut self, value: Value) -> ProtocolResult<Value> {
        self.control.sendrecv(value, &mut *self.runtime)
    }
}

/// Name -> callable table for one worker process.
#[derive(Default)]
pub struct CallableRegistry {
    callables: HashMap<String, Callable>,
}

impl CallableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callable under a fully qualified name.
    pub fn register<F>(&mut self, name: impl Into<String>, callable: F)
    where
        F: Fn(&mut CallContext<'_>, &[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.callables.insert(name.into(), Arc::new(callable));
    }

    /// Resolve a name to its callable.
    pub fn resolve(&self, name: &str) -> Option<Callable> {
        self.callables.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.callables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callables.is_empty()
    }
}
