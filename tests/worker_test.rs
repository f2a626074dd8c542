/*!
 * Worker Loop Tests
 * Full request cycles against the worker loop over a socket pair
 */

#![cfg(unix)]

use std::io::BufReader;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use procpool::protocol::{read_message, write_message, Message};
use procpool::worker::{run_worker, Bootstrap, CallableRegistry, WorkerRuntime};

#[derive(Default)]
struct RuntimeLog {
    connects: usize,
    disconnects: usize,
    session_begins: usize,
    session_ends: usize,
    commits: usize,
    reloads: Vec<String>,
}

#[derive(Clone, Default)]
struct TestRuntime {
    log: Arc<Mutex<RuntimeLog>>,
}

impl WorkerRuntime for TestRuntime {
    fn connect(&mut self) -> anyhow::Result<()> {
        self.log.lock().connects += 1;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.log.lock().disconnects += 1;
    }

    fn session_begin(&mut self) -> anyhow::Result<()> {
        self.log.lock().session_begins += 1;
        Ok(())
    }

    fn session_end(&mut self) {
        self.log.lock().session_ends += 1;
    }

    fn commit(&mut self) -> anyhow::Result<()> {
        self.log.lock().commits += 1;
        Ok(())
    }

    fn reload(&mut self, module: &str) {
        self.log.lock().reloads.push(module.to_string());
    }
}

fn test_registry() -> CallableRegistry {
    let mut registry = CallableRegistry::new();
    registry.register("test.echo", |_ctx, args| {
        Ok(args.first().cloned().unwrap_or(Value::Null))
    });
    registry.register("test.fail", |_ctx, _args| -> anyhow::Result<Value> {
        anyhow::bail!("boom")
    });
    registry.register("test.ask", |ctx, _args| {
        let answer = ctx.sendrecv(json!({"q": 1}))?;
        Ok(answer)
    });
    registry
}

/// Spawn the worker loop on a thread; returns the parent-side stream.
fn spawn_worker(runtime: TestRuntime) -> (UnixStream, JoinHandle<()>) {
    let (child, parent) = UnixStream::pair().unwrap();
    let handle = thread::spawn(move || {
        let registry = test_registry();
        let reader = BufReader::new(child.try_clone().unwrap());
        run_worker(runtime, &registry, &Bootstrap::new("test"), reader, child).unwrap();
    });
    (parent, handle)
}

fn request(callable: &str, args: Vec<Value>, keepalive: bool) -> Message {
    Message::Request {
        callable: callable.to_string(),
        args,
        keepalive,
    }
}

#[test]
fn test_request_response_cycle() {
    let runtime = TestRuntime::default();
    let (parent, worker) = spawn_worker(runtime.clone());
    let mut reader = BufReader::new(parent.try_clone().unwrap());
    let mut writer = parent;

    write_message(&mut writer, &request("test.echo", vec![json!(7)], false)).unwrap();
    let msg = read_message(&mut reader).unwrap().unwrap();
    assert_eq!(msg, Message::Response { value: json!(7) });

    drop(writer);
    drop(reader);
    worker.join().unwrap();

    let log = runtime.log.lock();
    assert_eq!(log.connects, 1);
    assert_eq!(log.session_begins, 1);
    assert_eq!(log.commits, 1);
    assert_eq!(log.session_ends, 1);
    assert_eq!(log.disconnects, 1);
}

#[test]
fn test_failed_request_does_not_kill_worker() {
    let runtime = TestRuntime::default();
    let (parent, worker) = spawn_worker(runtime.clone());
    let mut reader = BufReader::new(parent.try_clone().unwrap());
    let mut writer = parent;

    write_message(&mut writer, &request("test.fail", vec![], false)).unwrap();
    match read_message(&mut reader).unwrap().unwrap() {
        Message::Error { error } => {
            assert_eq!(error.message, "boom");
            assert_eq!(error.class, "Error");
        }
        other => panic!("expected error, got {}", other.kind()),
    }

    // The loop survives a failed request
    write_message(&mut writer, &request("test.echo", vec![json!("ok")], false)).unwrap();
    let msg = read_message(&mut reader).unwrap().unwrap();
    assert_eq!(msg, Message::Response { value: json!("ok") });

    drop(writer);
    drop(reader);
    worker.join().unwrap();
    assert_eq!(runtime.log.lock().commits, 1);
}

#[test]
fn test_unknown_callable_reports_error() {
    let runtime = TestRuntime::default();
    let (parent, worker) = spawn_worker(runtime);
    let mut reader = BufReader::new(parent.try_clone().unwrap());
    let mut writer = parent;

    write_message(&mut writer, &request("test.missing", vec![], false)).unwrap();
    match read_message(&mut reader).unwrap().unwrap() {
        Message::Error { error } => assert!(error.message.contains("unknown callable")),
        other => panic!("expected error, got {}", other.kind()),
    }

    drop(writer);
    drop(reader);
    worker.join().unwrap();
}

#[test]
fn test_keepalive_skips_session_initialization() {
    let runtime = TestRuntime::default();
    let (parent, worker) = spawn_worker(runtime.clone());
    let mut reader = BufReader::new(parent.try_clone().unwrap());
    let mut writer = parent;

    for n in 0..2 {
        write_message(&mut writer, &request("test.echo", vec![json!(n)], true)).unwrap();
        let msg = read_message(&mut reader).unwrap().unwrap();
        assert_eq!(msg, Message::Response { value: json!(n) });
    }

    drop(writer);
    drop(reader);
    worker.join().unwrap();

    let log = runtime.log.lock();
    assert_eq!(log.session_begins, 0);
    assert_eq!(log.session_ends, 0);
    assert_eq!(log.commits, 2);
}

#[test]
fn test_reload_between_requests() {
    let runtime = TestRuntime::default();
    let (parent, worker) = spawn_worker(runtime.clone());
    let mut reader = BufReader::new(parent.try_clone().unwrap());
    let mut writer = parent;

    write_message(&mut writer, &Message::Reload { module: "app.sales".into() }).unwrap();
    write_message(&mut writer, &request("test.echo", vec![json!(1)], false)).unwrap();
    let msg = read_message(&mut reader).unwrap().unwrap();
    assert_eq!(msg, Message::Response { value: json!(1) });

    drop(writer);
    drop(reader);
    worker.join().unwrap();
    assert_eq!(runtime.log.lock().reloads, vec!["app.sales".to_string()]);
}

#[test]
fn test_sendrecv_from_inside_callable() {
    let runtime = TestRuntime::default();
    let (parent, worker) = spawn_worker(runtime);
    let mut reader = BufReader::new(parent.try_clone().unwrap());
    let mut writer = parent;

    write_message(&mut writer, &request("test.ask", vec![], false)).unwrap();

    let msg = read_message(&mut reader).unwrap().unwrap();
    assert_eq!(msg, Message::SendRecv { value: json!({"q": 1}) });

    write_message(&mut writer, &Message::Answer { value: json!(42) }).unwrap();
    let msg = read_message(&mut reader).unwrap().unwrap();
    assert_eq!(msg, Message::Response { value: json!(42) });

    drop(writer);
    drop(reader);
    worker.join().unwrap();
}

#[test]
fn test_end_of_channel_is_clean_shutdown() {
    let runtime = TestRuntime::default();
    let (parent, worker) = spawn_worker(runtime.clone());

    drop(parent);
    worker.join().unwrap();

    let log = runtime.log.lock();
    assert_eq!(log.connects, 1);
    assert_eq!(log.disconnects, 1);
}
