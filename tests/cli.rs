use std::fs;

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::TempDir;

fn threadkit() -> Command {
    Command::cargo_bin("threadkit").unwrap()
}

#[test]
fn cli_no_args() {
    threadkit().assert().failure();
}

#[test]
fn cli_version() {
    threadkit()
        .arg("-V")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn cli_pool_runs_all_tasks() {
    threadkit()
        .args(["pool", "--tasks", "10", "--threads", "2", "--queue-depth", "3"])
        .assert()
        .success()
        .stdout(contains("completed 10 tasks, sum 55"));
}

#[test]
fn cli_pool_reads_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("pool.json");
    fs::write(&path, r#"{"threads": 1, "max_queue_size": 2}"#).unwrap();

    threadkit()
        .args(["pool", "--tasks", "100", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(contains("completed 100 tasks, sum 5050"))
        .stderr(contains(r#"{"threads":1,"max_queue_size":2}"#));
}

#[test]
fn cli_pool_logs_clamped_config() {
    threadkit()
        .args(["pool", "--tasks", "5", "--threads", "9", "--queue-depth", "0"])
        .assert()
        .success()
        .stdout(contains("completed 5 tasks, sum 15"))
        .stderr(contains(r#"{"threads":5,"max_queue_size":1}"#));
}

#[test]
fn cli_pool_rejects_bad_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("pool.json");
    fs::write(&path, "threads = 3").unwrap();

    threadkit()
        .args(["pool", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(contains("Serde error"));
}

#[test]
fn cli_pool_missing_config() {
    let temp_dir = TempDir::new().unwrap();
    threadkit()
        .args(["pool", "--config"])
        .arg(temp_dir.path().join("absent.json"))
        .assert()
        .failure()
        .stderr(contains("IO error"));
}

#[test]
fn cli_delegate_runs_both_threads() {
    threadkit()
        .args(["delegate", "--millis", "50"])
        .assert()
        .success()
        .stdout(contains("produced"));
}
