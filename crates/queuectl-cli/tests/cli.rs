//! End-to-end tests driving the `queuectl` binary

use std::path::Path;
use std::process::{Command, Output};
use std::time::{Duration, Instant};

fn queuectl(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_queuectl"))
        .args(args)
        .env("QUEUECTL_HOME", home)
        .env("QUEUECTL_DB", home.join("queue.db"))
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .expect("run queuectl")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_enqueue_list_status() {
    let home = tempfile::tempdir().unwrap();

    let out = queuectl(home.path(), &["enqueue", r#"{"id":"job1","command":"echo hello"}"#]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(stdout(&out).contains("job1"));

    let out = queuectl(home.path(), &["list"]);
    assert!(out.status.success());
    let text = stdout(&out);
    assert!(text.contains("job1"));
    assert!(text.contains("pending"));
    assert!(text.contains("echo hello"));

    let out = queuectl(home.path(), &["list", "--state", "dead"]);
    assert!(out.status.success());
    assert!(!stdout(&out).contains("job1"));

    let out = queuectl(home.path(), &["status"]);
    assert!(out.status.success());
    assert!(stdout(&out).contains("Active workers: 0"));
}

#[test]
fn test_enqueue_from_file_and_duplicate() {
    let home = tempfile::tempdir().unwrap();
    let file = home.path().join("job.json");
    std::fs::write(&file, r#"{"id":"fromfile","command":"true","max_retries":1}"#).unwrap();

    let out = queuectl(home.path(), &["enqueue", "--file", file.to_str().unwrap()]);
    assert!(out.status.success(), "{}", stderr(&out));

    let out = queuectl(home.path(), &["enqueue", r#"{"id":"fromfile","command":"false"}"#]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("already exists"));
}

#[test]
fn test_enqueue_rejects_bad_input() {
    let home = tempfile::tempdir().unwrap();

    let out = queuectl(home.path(), &["enqueue", "{not json"]);
    assert!(!out.status.success());

    let out = queuectl(home.path(), &["enqueue", r#"{"id":"x","command":"true","max_retries":99}"#]);
    assert!(!out.status.success());

    let out = queuectl(home.path(), &["list"]);
    assert!(stdout(&out).contains("No jobs"));
}

#[test]
fn test_config_set_get() {
    let home = tempfile::tempdir().unwrap();

    let out = queuectl(home.path(), &["config", "set", "max-retries", "5"]);
    assert!(out.status.success(), "{}", stderr(&out));

    let out = queuectl(home.path(), &["config", "get", "max-retries"]);
    assert_eq!(stdout(&out).trim(), "5");

    let out = queuectl(home.path(), &["config", "set", "backoff-base", "0"]);
    assert!(!out.status.success());
    let out = queuectl(home.path(), &["config", "get", "backoff-base"]);
    assert_eq!(stdout(&out).trim(), "2");

    // new jobs pick up the configured default
    queuectl(home.path(), &["enqueue", r#"{"id":"j","command":"true"}"#]);
    let out = queuectl(home.path(), &["list"]);
    assert!(stdout(&out).contains("0/6"));
}

#[test]
fn test_config_set_repairs_malformed_file() {
    let home = tempfile::tempdir().unwrap();
    std::fs::write(home.path().join("config.json"), "{ broken").unwrap();

    let out = queuectl(home.path(), &["status"]);
    assert!(!out.status.success());

    let out = queuectl(home.path(), &["config", "set", "max-retries", "4"]);
    assert!(out.status.success(), "{}", stderr(&out));

    let out = queuectl(home.path(), &["config", "get", "max-retries"]);
    assert!(out.status.success());
    assert_eq!(stdout(&out).trim(), "4");

    let out = queuectl(home.path(), &["status"]);
    assert!(out.status.success(), "{}", stderr(&out));
}

#[test]
fn test_dlq_retry_unknown_job_fails() {
    let home = tempfile::tempdir().unwrap();

    let out = queuectl(home.path(), &["dlq", "list"]);
    assert!(out.status.success());
    assert!(stdout(&out).contains("empty"));

    let out = queuectl(home.path(), &["dlq", "retry", "ghost"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("ghost"));
}

#[cfg(unix)]
#[test]
fn test_worker_pool_drains_queue() {
    let home = tempfile::tempdir().unwrap();
    queuectl(home.path(), &["config", "set", "poll-interval-ms", "50"]);
    queuectl(home.path(), &["config", "set", "backoff-base", "1"]);

    queuectl(home.path(), &["enqueue", r#"{"id":"ok","command":"true"}"#]);
    queuectl(home.path(), &["enqueue", r#"{"id":"bad","command":"exit 3","max_retries":1}"#]);

    let out = queuectl(home.path(), &["worker", "start", "--count", "2"]);
    assert!(out.status.success(), "{}", stderr(&out));

    let deadline = Instant::now() + Duration::from_secs(30);
    let mut drained = false;
    while Instant::now() < deadline {
        let dead = stdout(&queuectl(home.path(), &["list", "--state", "dead"]));
        let done = stdout(&queuectl(home.path(), &["list", "--state", "completed"]));
        if dead.contains("bad") && done.contains("ok") {
            drained = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(200));
    }

    let out = queuectl(home.path(), &["worker", "stop"]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(drained, "workers did not finish both jobs");

    let dead = stdout(&queuectl(home.path(), &["dlq", "list"]));
    assert!(dead.contains("exit code 3"));

    let out = queuectl(home.path(), &["dlq", "retry", "bad"]);
    assert!(out.status.success(), "{}", stderr(&out));
    let pending = stdout(&queuectl(home.path(), &["list", "--state", "pending"]));
    assert!(pending.contains("bad"));

    let status = stdout(&queuectl(home.path(), &["status"]));
    assert!(status.contains("Active workers: 0"));
}
