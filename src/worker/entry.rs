/*!
 * Worker Entry
 * Bootstrap handshake and the per-process request loop
 */

use super::control::Control;
use super::registry::{CallContext, CallableRegistry};
use super::runtime::WorkerRuntime;
use crate::protocol::{Message, ProtocolError, RemoteFailure};
use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};

/// One-time configuration payload a worker receives as the first line
/// on its channel, before any protocol message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Bootstrap {
    /// Instance identifier of the owning server
    pub instance: String,
    /// Log filter for the worker's local logger
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Installation root; trace frames are relativized against it
    #[serde(default)]
    pub base_path: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Bootstrap {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            log_level: default_log_level(),
            base_path: None,
        }
    }
}

/// Read the bootstrap payload off the channel.
pub fn read_bootstrap<R: BufRead>(reader: &mut R) -> Result<Bootstrap> {
    let mut line = String::new();
    let n = reader
        .read_line(&mut line)
        .context("reading bootstrap payload")?;
    if n == 0 {
        return Err(anyhow!("channel closed before bootstrap payload"));
    }
    serde_json::from_str(line.trim()).context("malformed bootstrap payload")
}

/// Entry point for a worker process speaking over stdio.
///
/// Reads the bootstrap payload, initializes local logging (stderr, which
/// the parent inherits), then runs the request loop until end-of-channel.
pub fn worker_main<T: WorkerRuntime>(runtime: T, registry: &CallableRegistry) -> Result<()> {
    let mut reader = BufReader::new(std::io::stdin().lock());
    let boot = read_bootstrap(&mut reader)?;

    let _ = env_logger::Builder::new()
        .parse_filters(&boot.log_level)
        .try_init();

    run_worker(runtime, registry, &boot, reader, std::io::stdout().lock())
}

/// The worker request loop over arbitrary channel endpoints.
///
/// Each `request` runs one callable: session initialization (skipped on
/// keepalive), invocation, commit, then the terminal `response`. Any
/// failure in that cycle is logged locally and reported via `error`; a
/// failed request never kills the worker. `reload` messages are handed
/// to the runtime. End-of-channel is a clean shutdown request.
pub fn run_worker<R, W, T>(
    mut runtime: T,
    registry: &CallableRegistry,
    boot: &Bootstrap,
    reader: R,
    writer: W,
) -> Result<()>
where
    R: BufRead,
    W: Write,
    T: WorkerRuntime,
{
    let mut control = Control::new(reader, writer);

    runtime.connect()?;
    info!("worker ready (instance '{}')", boot.instance);

    loop {
        let msg = match control.read() {
            Ok(Some(msg)) => msg,
            Ok(None) => break,
            Err(ProtocolError::Malformed(e)) => {
                warn!("dropping malformed message: {}", e);
                continue;
            }
            Err(e) => {
                error!("channel read failed: {}", e);
                break;
            }
        };

        match msg {
            Message::Request { callable, args, keepalive } => {
                handle_request(
                    &mut runtime,
                    registry,
                    &mut control,
                    boot,
                    &callable,
                    &args,
                    keepalive,
                );
            }
            Message::Reload { module } => runtime.reload(&module),
            other => warn!("unexpected message kind '{}'", other.kind()),
        }
    }

    runtime.disconnect();
    info!("worker shutdown");
    Ok(())
}

fn handle_request<R: BufRead, W: Write>(
    runtime: &mut dyn WorkerRuntime,
    registry: &CallableRegistry,
    control: &mut Control<R, W>,
    boot: &Bootstrap,
    callable: &str,
    args: &[Value],
    keepalive: bool,
) {
    match invoke(&mut *runtime, registry, control, callable, args, keepalive) {
        Ok(value) => {
            if let Err(e) = control.response(value) {
                warn!("could not deliver response: {}", e);
            }
        }
        Err(err) => {
            error!("request '{}' failed: {:#}", callable, err);
            control.error(RemoteFailure::from_error(&err, boot.base_path.as_deref()));
        }
    }

    if !keepalive {
        runtime.session_end();
    }
}

fn invoke<R: BufRead, W: Write>(
    runtime: &mut dyn WorkerRuntime,
    registry: &CallableRegistry,
    control: &mut Control<R, W>,
    callable: &str,
    args: &[Value],
    keepalive: bool,
) -> Result<Value> {
    if !keepalive {
        runtime.session_begin()?;
    }

    let f = registry
        .resolve(callable)
        .ok_or_else(|| anyhow!("unknown callable '{}'", callable))?;

    let value = {
        let mut ctx = CallContext::new(control, &mut *runtime);
        f(&mut ctx, args)?
    };

    runtime.commit()?;
    Ok(value)
}
