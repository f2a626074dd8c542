/*!
 * procpool - Demo Entry Point
 *
 * Runs in two modes:
 * - `procpool worker` — worker mode, spoken to over stdio by a pool
 * - `procpool`        — parent mode, spawns a small pool against its own
 *                       executable and drives a few requests through it
 */

use std::error::Error;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use procpool::{
    init_tracing, worker_main, CallableRegistry, Message, NullRuntime, PassThroughFn, PoolConfig,
    ProcessPool, TaskRegistry, TASK_CALLABLE,
};

fn main() -> Result<(), Box<dyn Error>> {
    if std::env::args().nth(1).as_deref() == Some("worker") {
        let registry = demo_registry();
        worker_main(NullRuntime, &registry)?;
        return Ok(());
    }

    init_tracing();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_parent())
}

/// Callables resolvable in both parent and child by qualified name.
fn demo_registry() -> CallableRegistry {
    let mut registry = CallableRegistry::new();

    registry.register("demo.echo", |_ctx, args| Ok(Value::from(args.to_vec())));

    registry.register("demo.greet", |ctx, args| {
        let name = args.first().and_then(Value::as_str).unwrap_or("world");
        ctx.send(json!({ "progress": "composing greeting" }))?;
        Ok(json!(format!("hello, {}", name)))
    });

    registry.register("demo.fail", |_ctx, _args| -> anyhow::Result<Value> {
        anyhow::bail!("demo failure")
    });

    // Batch entry used by the fire-and-forget task registry. A real
    // embedder would start an authenticated batch session here and
    // dispatch into its business-object layer.
    registry.register(TASK_CALLABLE, |_ctx, args| {
        let unit = args.first().and_then(Value::as_str).unwrap_or("?");
        let method = args.get(1).and_then(Value::as_str).unwrap_or("?");
        Ok(json!(format!("{}.{} completed", unit, method)))
    });

    registry
}

async fn run_parent() -> Result<(), Box<dyn Error>> {
    info!("procpool demo starting");

    let config = PoolConfig::new("demo")
        .with_min_workers(1)
        .with_max_workers(2);
    let pool = ProcessPool::new(config);
    pool.start()?;

    let callback: PassThroughFn = Arc::new(|msg: &Message| {
        info!(kind = msg.kind(), "pass-through from worker");
    });

    let mut assignment = pool.acquire(Some(callback)).await?;
    assignment.request("demo.greet", vec![json!("operator")])?;
    let value = assignment.recv().await?;
    info!(%value, "request completed");

    let registry = TaskRegistry::new(pool.clone());
    if let Some(id) = registry.run("demo.batch", "run", None, vec![])? {
        info!(worker = id, "background task started");
        loop {
            match registry.get_result(id)? {
                Some(msg) => {
                    info!(kind = msg.kind(), "background task message");
                    if msg.is_terminal() {
                        break;
                    }
                }
                None => tokio::time::sleep(std::time::Duration::from_millis(20)).await,
            }
        }
    }

    pool.stop().await;
    info!("procpool demo finished");
    Ok(())
}
