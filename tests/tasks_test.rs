/*!
 * Task Registry Tests
 * Fire-and-forget scheduling, result polling, and kill semantics
 */

#![cfg(unix)]

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use serial_test::serial;

use procpool::{Message, PoolConfig, PoolError, ProcessPool, TaskRegistry, WorkerCommand};

const SLEEPER: &str = "read boot; exec sleep 60";

const RESPONDER: &str =
    r#"read boot; while read line; do echo '{"kind":"response","value":42}'; done"#;

/// Emits one pass-through before the terminal response.
const PROGRESS: &str = r#"read boot; read req
echo '{"kind":"send","value":"halfway"}'
echo '{"kind":"response","value":"done"}'"#;

fn sh_pool(script: &str, min: usize, max: usize) -> ProcessPool {
    let config = PoolConfig::new("test")
        .with_min_workers(min)
        .with_max_workers(max)
        .with_worker_command(
            WorkerCommand::new("/bin/sh").with_args(vec!["-c".to_string(), script.to_string()]),
        );
    ProcessPool::new(config)
}

/// Polls until the task yields a message, its entry drains, or it dies.
async fn poll_result(
    tasks: &TaskRegistry,
    id: procpool::WorkerId,
) -> Result<Option<Message>, PoolError> {
    for _ in 0..100 {
        match tasks.get_result(id) {
            Ok(None) => tokio::time::sleep(Duration::from_millis(20)).await,
            other => return other,
        }
    }
    Ok(None)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_task_result_then_drained_then_forgotten() {
    let pool = sh_pool(RESPONDER, 1, 1);
    pool.start().unwrap();
    let tasks = TaskRegistry::new(pool.clone());

    let id = tasks
        .run("app.codeunit.batch", "nightly", Some("svc"), vec![json!(7)])
        .unwrap()
        .expect("worker available");
    assert_eq!(tasks.pending(), 1);

    let msg = poll_result(&tasks, id).await.unwrap().expect("task result");
    assert_eq!(msg, Message::Response { value: json!(42) });

    // Pump marked the task finished once the terminal arrived
    assert!(matches!(tasks.get_result(id), Ok(None)));
    assert_eq!(tasks.pending(), 0);

    assert!(matches!(
        tasks.get_result(id),
        Err(PoolError::WorkerNotFound(_))
    ));

    pool.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_run_returns_none_when_saturated() {
    let pool = sh_pool(SLEEPER, 1, 1);
    pool.start().unwrap();
    let tasks = TaskRegistry::new(pool.clone());

    let first = tasks.run("app.codeunit.batch", "run", None, vec![]).unwrap();
    assert!(first.is_some());

    let second = tasks.run("app.codeunit.batch", "run", None, vec![]).unwrap();
    assert_eq!(second, None, "saturated pool refuses new tasks");

    pool.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_killed_task_reports_death_once() {
    let pool = sh_pool(SLEEPER, 1, 1);
    pool.start().unwrap();
    let tasks = TaskRegistry::new(pool.clone());

    let id = tasks
        .run("app.codeunit.batch", "run", None, vec![])
        .unwrap()
        .expect("worker available");

    tasks.kill(id).unwrap();

    let err = poll_result(&tasks, id).await.unwrap_err();
    assert!(matches!(err, PoolError::WorkerDied(_)));
    assert_eq!(tasks.pending(), 0, "dead task is forgotten after reporting");

    // The pool replaces the dead worker once its slot frees up
    let mut next = None;
    for _ in 0..100 {
        next = tasks.run("app.codeunit.batch", "run", None, vec![]).unwrap();
        if next.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_ne!(next.expect("replacement worker"), id);

    pool.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_pass_through_buffered_before_terminal() {
    let pool = sh_pool(PROGRESS, 1, 1);
    pool.start().unwrap();
    let tasks = TaskRegistry::new(pool.clone());

    let id = tasks
        .run("app.codeunit.batch", "run", None, vec![])
        .unwrap()
        .expect("worker available");

    let msg = poll_result(&tasks, id).await.unwrap().expect("progress");
    assert_eq!(msg, Message::Send { value: json!("halfway") });

    let msg = poll_result(&tasks, id).await.unwrap().expect("terminal");
    assert_eq!(msg, Message::Response { value: json!("done") });

    pool.stop().await;
}
