//! End-to-end CLI tests for the fetchpool binary.

use std::path::Path;
use std::time::Duration;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

macro_rules! require_mock_server {
    () => {{
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        mock_server
    }};
}

/// Binary command isolated from any user-level config file.
fn fetchpool(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("fetchpool").unwrap();
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("RUST_LOG");
    cmd
}

/// Runs the binary off the async runtime so the mock server keeps serving.
async fn run_blocking(mut cmd: Command) -> assert_cmd::assert::Assert {
    tokio::task::spawn_blocking(move || cmd.assert())
        .await
        .unwrap()
}

async fn mount_body(server: &MockServer, route: &str, body: &'static [u8]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

// ==================== Basic invocation ====================

#[test]
fn test_binary_without_input_returns_zero() {
    let home = TempDir::new().unwrap();
    fetchpool(home.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("No input provided"));
}

#[test]
fn test_binary_help_displays_usage() {
    let home = TempDir::new().unwrap();
    fetchpool(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Download a list of files concurrently"))
        .stdout(predicate::str::contains("--rate-limit"));
}

#[test]
fn test_binary_version_displays_version() {
    let home = TempDir::new().unwrap();
    fetchpool(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fetchpool"));
}

#[test]
fn test_binary_invalid_flag_returns_error() {
    let home = TempDir::new().unwrap();
    fetchpool(home.path())
        .arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_binary_rejects_zero_concurrency() {
    let home = TempDir::new().unwrap();
    fetchpool(home.path())
        .args(["-c", "0", "http://example.com/a"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("concurrency"));
}

#[test]
fn test_binary_missing_input_file_exits_one() {
    let home = TempDir::new().unwrap();
    fetchpool(home.path())
        .args(["-i", "/nonexistent/fetchpool/tasks.txt"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("tasks.txt"));
}

#[test]
fn test_binary_all_invalid_lines_exits_one() {
    let home = TempDir::new().unwrap();
    fetchpool(home.path())
        .write_stdin("ftp://example.com/a\nnot a url\n")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No valid URLs"));
}

#[test]
fn test_binary_invalid_config_exits_one() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("bad.toml");
    std::fs::write(&config, "concurrency = 0\n").unwrap();

    fetchpool(home.path())
        .arg("--config")
        .arg(&config)
        .arg("http://example.com/a")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("concurrency"));
}

// ==================== Downloads ====================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_binary_partial_failure_exits_two() {
    let server = require_mock_server!();
    mount_body(&server, "/one.txt", b"one").await;
    mount_body(&server, "/two.txt", b"two").await;
    Mock::given(method("GET"))
        .and(path("/gone.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let home = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let input = home.path().join("tasks.txt");
    std::fs::write(
        &input,
        format!(
            "# batch\n{0}/one.txt\n{0}/two.txt renamed.txt\n{0}/gone.txt\n",
            server.uri()
        ),
    )
    .unwrap();

    let mut cmd = fetchpool(home.path());
    cmd.arg("-i").arg(&input).arg("-o").arg(out.path());
    run_blocking(cmd)
        .await
        .code(2)
        .stdout(predicate::str::contains("completed one.txt (3 bytes)"))
        .stdout(predicate::str::contains("completed renamed.txt (3 bytes)"))
        .stdout(predicate::str::contains("failed    gone.txt"))
        .stderr(predicate::str::contains("2 completed, 1 failed, 0 canceled"));

    assert_eq!(std::fs::read(out.path().join("one.txt")).unwrap(), b"one");
    assert_eq!(std::fs::read(out.path().join("renamed.txt")).unwrap(), b"two");
    assert!(!out.path().join("gone.txt").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_binary_json_events_are_json_lines() {
    let server = require_mock_server!();
    mount_body(&server, "/data.bin", b"0123456789").await;

    let home = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let mut cmd = fetchpool(home.path());
    cmd.arg("--json-events")
        .arg("-o")
        .arg(out.path())
        .arg(format!("{}/data.bin", server.uri()));
    let assert = run_blocking(cmd).await.success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let events: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(events.first().unwrap()["status"], "starting");
    let last = events.last().unwrap();
    assert_eq!(last["status"], "completed");
    assert_eq!(last["name"], "data.bin");
    assert_eq!(last["bytes_transferred"], 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_binary_deadline_cancels_run_with_130() {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/slow.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"late".to_vec())
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let home = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let mut cmd = fetchpool(home.path());
    cmd.args(["--timeout-secs", "1", "-o"])
        .arg(out.path())
        .arg(format!("{}/slow.bin", server.uri()))
        .timeout(Duration::from_secs(20));
    run_blocking(cmd)
        .await
        .code(130)
        .stdout(predicate::str::contains("canceled  slow.bin"))
        .stderr(predicate::str::contains("Canceled:"));

    assert!(!out.path().join("slow.bin").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_binary_quiet_prints_nothing_on_success() {
    let server = require_mock_server!();
    mount_body(&server, "/q.txt", b"q").await;

    let home = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let mut cmd = fetchpool(home.path());
    cmd.arg("-q")
        .arg("-o")
        .arg(out.path())
        .arg(format!("{}/q.txt", server.uri()));
    run_blocking(cmd)
        .await
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::is_empty());

    assert!(out.path().join("q.txt").exists());
}
