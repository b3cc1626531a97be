//! End-to-end tests that drive the `sgate` binary the way a user would:
//! init, index, retrieve, suggest, respond, prune, stats, serve.
//!
//! The default test config leaves both the completion and embedding
//! providers disabled, so these tests exercise the degraded paths the
//! engine must handle gracefully: empty retrieval and provider failure as
//! a terminal rejected suggestion — never a crash.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn sgate_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("sgate");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("auth.rs"),
        "fn check_password(p: &str) -> bool {\n    !p.is_empty()\n}\n\nfn hash_password(p: &str) -> String {\n    p.to_string()\n}\n",
    )
    .unwrap();
    fs::write(
        files_dir.join("io.rs"),
        "fn read_config(path: &str) -> String {\n    std::fs::read_to_string(path).unwrap_or_default()\n}\n",
    )
    .unwrap();
    fs::write(
        files_dir.join("notes.txt"),
        "not a source file, should be excluded by the include globs\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/sgate.sqlite"

[chunking]
max_tokens = 300
overlap_tokens = 40

[indexing]
root = "{}/files"
include_globs = ["**/*.rs"]
exclude_globs = []

[server]
bind = "127.0.0.1:7343"
"#,
        root.display(),
        root.display()
    );

    let config_path = config_dir.join("sgate.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_sgate(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = sgate_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run sgate binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_sgate(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("sgate.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_sgate(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_sgate(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_index_counts_matching_files() {
    let (_tmp, config_path) = setup_test_env();

    run_sgate(&config_path, &["init"]);
    let (stdout, stderr, success) = run_sgate(&config_path, &["index"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    // Two .rs files; notes.txt is excluded by the include globs.
    assert!(stdout.contains("files seen: 2"), "got: {}", stdout);
    assert!(stdout.contains("files changed: 2"), "got: {}", stdout);
    assert!(stdout.contains("ok"));
}

#[test]
fn test_index_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    run_sgate(&config_path, &["init"]);
    run_sgate(&config_path, &["index"]);

    // Unchanged content: the second pass upserts nothing.
    let (stdout, _, success) = run_sgate(&config_path, &["index"]);
    assert!(success);
    assert!(stdout.contains("files changed: 0"), "got: {}", stdout);
    assert!(stdout.contains("chunks created: 0"), "got: {}", stdout);
}

#[test]
fn test_index_reindexes_modified_file() {
    let (tmp, config_path) = setup_test_env();

    run_sgate(&config_path, &["init"]);
    run_sgate(&config_path, &["index"]);

    fs::write(
        tmp.path().join("files").join("auth.rs"),
        "fn check_password(p: &str) -> bool {\n    p.len() > 8\n}\n",
    )
    .unwrap();

    let (stdout, _, success) = run_sgate(&config_path, &["index"]);
    assert!(success);
    assert!(stdout.contains("files changed: 1"), "got: {}", stdout);
    // The old chunks are invalidated, not silently kept.
    assert!(!stdout.contains("chunks invalidated: 0"), "got: {}", stdout);
}

#[test]
fn test_retrieve_empty_store_reports_no_results() {
    let (_tmp, config_path) = setup_test_env();

    run_sgate(&config_path, &["init"]);
    let (stdout, _, success) = run_sgate(&config_path, &["retrieve", "password check"]);
    assert!(success, "retrieve must not fail on an empty store");
    assert!(stdout.contains("No results."));
}

#[test]
fn test_retrieve_with_embeddings_disabled_is_empty_not_error() {
    let (_tmp, config_path) = setup_test_env();

    run_sgate(&config_path, &["init"]);
    run_sgate(&config_path, &["index"]);

    // Indexed but no embedding provider: retrieval degrades to empty.
    let (stdout, _, success) = run_sgate(&config_path, &["retrieve", "password check"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_suggest_with_disabled_provider_rejects_with_reason() {
    let (_tmp, config_path) = setup_test_env();

    run_sgate(&config_path, &["init"]);
    let (stdout, stderr, success) =
        run_sgate(&config_path, &["suggest", "add error handling to read_config"]);
    assert!(
        success,
        "suggest must degrade, not crash: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("status:     rejected"), "got: {}", stdout);
    assert!(stdout.contains("provider_error"), "got: {}", stdout);
    assert!(stdout.contains("confidence: 0.000"), "got: {}", stdout);
    assert!(stdout.contains("ok"));
}

#[test]
fn test_suggest_records_session_history() {
    let (_tmp, config_path) = setup_test_env();

    run_sgate(&config_path, &["init"]);
    run_sgate(&config_path, &["suggest", "first query"]);
    run_sgate(&config_path, &["suggest", "second query"]);

    let (stdout, _, success) = run_sgate(&config_path, &["sessions"]);
    assert!(success);
    assert!(stdout.contains("suggestions: 2"), "got: {}", stdout);

    // Pull the session id and check its history.
    let session_id = stdout
        .lines()
        .find(|l| l.contains("project: default"))
        .and_then(|l| l.split_whitespace().next())
        .expect("session line")
        .to_string();

    let (stdout, _, success) = run_sgate(&config_path, &["history", &session_id]);
    assert!(success);
    assert_eq!(
        stdout.matches("rejected").count(),
        2,
        "both suggestions recorded: {}",
        stdout
    );
}

#[test]
fn test_respond_unknown_id_fails() {
    let (_tmp, config_path) = setup_test_env();

    run_sgate(&config_path, &["init"]);
    let (_, stderr, success) = run_sgate(&config_path, &["respond", "no-such-id", "approve"]);
    assert!(!success);
    assert!(stderr.contains("not found"), "got: {}", stderr);
}

#[test]
fn test_respond_invalid_decision_fails() {
    let (_tmp, config_path) = setup_test_env();

    run_sgate(&config_path, &["init"]);
    let (_, stderr, success) = run_sgate(&config_path, &["respond", "some-id", "maybe"]);
    assert!(!success);
    assert!(stderr.contains("Unknown decision"), "got: {}", stderr);
}

#[test]
fn test_prune_empty_database() {
    let (_tmp, config_path) = setup_test_env();

    run_sgate(&config_path, &["init"]);
    let (stdout, _, success) = run_sgate(&config_path, &["prune"]);
    assert!(success);
    assert!(stdout.contains("sessions removed: 0"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_stats_after_index() {
    let (_tmp, config_path) = setup_test_env();

    run_sgate(&config_path, &["init"]);
    run_sgate(&config_path, &["index"]);

    let (stdout, _, success) = run_sgate(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Engine Stats"));
    assert!(stdout.contains("Live chunks:"), "got: {}", stdout);
}

#[test]
fn test_embed_errors_when_disabled() {
    let (_tmp, config_path) = setup_test_env();

    run_sgate(&config_path, &["init"]);
    let (_, stderr, success) = run_sgate(&config_path, &["embed"]);
    assert!(!success, "embed should fail when provider disabled");
    assert!(stderr.contains("disabled"), "got: {}", stderr);
}

#[test]
fn test_invalid_config_rejected() {
    let (tmp, config_path) = setup_test_env();

    let bad = format!(
        "[db]\npath = \"{}/data/x.sqlite\"\n[gate]\nhigh_threshold = 0.2\nlow_threshold = 0.8\n",
        tmp.path().display()
    );
    fs::write(&config_path, bad).unwrap();

    let (_, stderr, success) = run_sgate(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("thresholds"), "got: {}", stderr);
}

// ============ HTTP API ============

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn setup_server_env(port: u16) -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env();
    let content = fs::read_to_string(&config_path).unwrap();
    let content = content.replace("127.0.0.1:7343", &format!("127.0.0.1:{port}"));
    fs::write(&config_path, content).unwrap();
    (tmp, config_path)
}

fn start_server(config_path: &Path) -> std::process::Child {
    let binary = sgate_binary();
    Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("serve")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap_or_else(|e| panic!("Failed to start server: {}", e))
}

fn wait_for_server(port: u16) {
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        std::thread::sleep(std::time::Duration::from_millis(100));
        if let Ok(resp) = reqwest::blocking::get(&url) {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

#[test]
fn test_server_health() {
    let port = find_free_port();
    let (_tmp, config_path) = setup_server_env(port);

    run_sgate(&config_path, &["init"]);
    let mut server = start_server(&config_path);
    wait_for_server(port);

    let resp = reqwest::blocking::get(format!("http://127.0.0.1:{}/health", port)).unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["degraded"], false);
    assert!(body["version"].is_string());

    server.kill().ok();
    server.wait().ok();
}

#[test]
fn test_server_query_flow() {
    let port = find_free_port();
    let (_tmp, config_path) = setup_server_env(port);

    run_sgate(&config_path, &["init"]);
    let mut server = start_server(&config_path);
    wait_for_server(port);

    let client = reqwest::blocking::Client::new();

    // Disabled provider: the query still returns a well-formed terminal
    // suggestion instead of a 5xx.
    let resp = client
        .post(format!("http://127.0.0.1:{}/queries", port))
        .json(&serde_json::json!({
            "project_id": "default",
            "query_text": "add error handling",
            "cursor": {"file_path": "src/io.rs", "start_line": 1, "end_line": 3}
        }))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 200);

    let suggestion: serde_json::Value = resp.json().unwrap();
    assert_eq!(suggestion["status"], "rejected");
    assert_eq!(suggestion["reason"], "provider_error");
    assert_eq!(suggestion["confidence"], 0.0);
    let id = suggestion["id"].as_str().unwrap().to_string();

    // Poll the suggestion back.
    let resp = client
        .get(format!("http://127.0.0.1:{}/suggestions/{}", port, id))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 200);
    let fetched: serde_json::Value = resp.json().unwrap();
    assert_eq!(fetched["id"], id.as_str());

    // Responding to a terminal suggestion is a no-op, not an error.
    let resp = client
        .post(format!(
            "http://127.0.0.1:{}/suggestions/{}/respond",
            port, id
        ))
        .json(&serde_json::json!({"decision": "approve"}))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 200);
    let settled: serde_json::Value = resp.json().unwrap();
    assert_eq!(settled["status"], "rejected");

    server.kill().ok();
    server.wait().ok();
}

#[test]
fn test_server_query_validation() {
    let port = find_free_port();
    let (_tmp, config_path) = setup_server_env(port);

    run_sgate(&config_path, &["init"]);
    let mut server = start_server(&config_path);
    wait_for_server(port);

    let client = reqwest::blocking::Client::new();
    let resp = client
        .post(format!("http://127.0.0.1:{}/queries", port))
        .json(&serde_json::json!({"project_id": "default", "query_text": ""}))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    server.kill().ok();
    server.wait().ok();
}

#[test]
fn test_server_suggestion_not_found() {
    let port = find_free_port();
    let (_tmp, config_path) = setup_server_env(port);

    run_sgate(&config_path, &["init"]);
    let mut server = start_server(&config_path);
    wait_for_server(port);

    let resp = reqwest::blocking::get(format!(
        "http://127.0.0.1:{}/suggestions/no-such-id",
        port
    ))
    .unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    server.kill().ok();
    server.wait().ok();
}

#[test]
fn test_server_file_changed_and_stats() {
    let port = find_free_port();
    let (_tmp, config_path) = setup_server_env(port);

    run_sgate(&config_path, &["init"]);
    let mut server = start_server(&config_path);
    wait_for_server(port);

    let client = reqwest::blocking::Client::new();

    let resp = client
        .post(format!("http://127.0.0.1:{}/files/changed", port))
        .json(&serde_json::json!({
            "project_id": "default",
            "file_path": "src/new.rs",
            "content": "fn new_code() -> i32 {\n    42\n}\n"
        }))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().unwrap();
    assert!(body["created"].as_u64().unwrap() > 0);

    // Identical content again: idempotent.
    let resp = client
        .post(format!("http://127.0.0.1:{}/files/changed", port))
        .json(&serde_json::json!({
            "project_id": "default",
            "file_path": "src/new.rs",
            "content": "fn new_code() -> i32 {\n    42\n}\n"
        }))
        .send()
        .unwrap();
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["created"], 0);
    assert_eq!(body["invalidated"], 0);

    let resp = client
        .get(format!("http://127.0.0.1:{}/stats/default", port))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 200);
    let stats: serde_json::Value = resp.json().unwrap();
    assert_eq!(stats["project_id"], "default");
    assert!(stats["total_suggested"].is_i64() || stats["total_suggested"].is_u64());

    server.kill().ok();
    server.wait().ok();
}
