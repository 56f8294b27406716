use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn kb_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("kb");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/kb.sqlite"

[index]
storage_dir = "{root}/data/index"

[embedding]
provider = "hash"
dims = 128

[retrieval]
top_k = 5
"#,
        root = root.display()
    );

    let config_path = config_dir.join("kb.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_kb(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = kb_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run kb binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn record(config_path: &Path, args: &[&str]) -> String {
    let mut full = vec!["record"];
    full.extend_from_slice(args);
    let (stdout, stderr, success) = run_kb(config_path, &full);
    assert!(success, "record failed: stdout={}, stderr={}", stdout, stderr);
    stdout
        .lines()
        .find_map(|l| l.trim().strip_prefix("id: "))
        .map(str::to_string)
        .unwrap_or_else(|| panic!("no id in record output: {}", stdout))
}

fn record_redis_and_ui(config_path: &Path) -> (String, String) {
    let redis = record(
        config_path,
        &[
            "--intent",
            "Fix Redis connection timeout",
            "--problem-context",
            "API pods fail with Redis connection timeout errors under load",
            "--root-cause",
            "Redis connection pool exhausted",
            "--solution-steps",
            "Increase the Redis connection pool size and set a client timeout",
            "--tags",
            "redis,timeout",
        ],
    );
    let ui = record(
        config_path,
        &[
            "--intent",
            "Change UI button color",
            "--problem-context",
            "Primary button color does not match the brand palette",
            "--solution-steps",
            "Update the theme token for the primary button",
            "--tags",
            "ui,css",
        ],
    );
    (redis, ui)
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_kb(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_kb(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_kb(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_record_prints_confirmation() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);

    let (stdout, _, success) = run_kb(
        &config_path,
        &["record", "--intent", "Fix Redis connection timeout"],
    );
    assert!(success);
    assert!(stdout.contains("Experience recorded successfully: 'Fix Redis connection timeout'"));
}

#[test]
fn test_query_before_build_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);
    record_redis_and_ui(&config_path);

    let (_, stderr, success) = run_kb(&config_path, &["query", "redis"]);
    assert!(!success, "query without a build should fail");
    assert!(stderr.contains("kb build"), "stderr: {}", stderr);
}

#[test]
fn test_build_and_query() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);
    let (redis_id, _) = record_redis_and_ui(&config_path);

    let (stdout, stderr, success) = run_kb(&config_path, &["build"]);
    assert!(success, "build failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("build full"));
    assert!(stdout.contains("documents: 2"));

    let (stdout, _, success) = run_kb(
        &config_path,
        &["query", "How do I fix a Redis connection timeout?", "--top-k", "1"],
    );
    assert!(success);
    assert!(stdout.starts_with("1. ["), "stdout: {}", stdout);
    assert!(stdout.contains("Fix Redis connection timeout"));
    assert!(stdout.contains(&redis_id));
    assert!(!stdout.contains("2. ["));
}

#[test]
fn test_second_build_is_incremental_noop() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);
    record_redis_and_ui(&config_path);

    run_kb(&config_path, &["build"]);
    let (stdout, _, success) = run_kb(&config_path, &["build"]);
    assert!(success);
    assert!(stdout.contains("build incremental"));
    assert!(stdout.contains("embedded:  0"));
    assert!(stdout.contains("unchanged: 2"));
}

#[test]
fn test_update_then_incremental_build() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);
    let (redis_id, _) = record_redis_and_ui(&config_path);
    run_kb(&config_path, &["build"]);

    let (_, stderr, success) = run_kb(
        &config_path,
        &[
            "update",
            &redis_id,
            "--solution-steps",
            "Put a connection pooler in front of Redis",
        ],
    );
    assert!(success, "update failed: {}", stderr);

    let (stdout, _, success) = run_kb(&config_path, &["build"]);
    assert!(success);
    assert!(stdout.contains("build incremental"));
    assert!(stdout.contains("embedded:  1"));
    assert!(stdout.contains("updated:   1"));

    let (stdout, _, _) = run_kb(&config_path, &["get", &redis_id]);
    assert!(stdout.contains("Put a connection pooler in front of Redis"));
}

#[test]
fn test_delete_is_pruned_on_build() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);
    let (_, ui_id) = record_redis_and_ui(&config_path);
    run_kb(&config_path, &["build"]);

    let (_, _, success) = run_kb(&config_path, &["delete", &ui_id]);
    assert!(success);

    let (stdout, _, _) = run_kb(&config_path, &["build"]);
    assert!(stdout.contains("pruned:    1"));
    assert!(stdout.contains("documents: 1"));

    let (stdout, _, _) = run_kb(&config_path, &["query", "button color"]);
    assert!(!stdout.contains(&ui_id));
}

#[test]
fn test_get_unknown_id_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);

    let (_, stderr, success) = run_kb(&config_path, &["get", "does-not-exist"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_status_reports_index_state() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);
    record_redis_and_ui(&config_path);

    let (stdout, _, success) = run_kb(&config_path, &["status"]);
    assert!(success);
    assert!(stdout.contains("Entries:     2"));
    assert!(stdout.contains("not built"));

    run_kb(&config_path, &["build"]);
    let (stdout, _, _) = run_kb(&config_path, &["status"]);
    assert!(stdout.contains("Model:       hash:feature-hash-v1"));
    assert!(stdout.contains("Documents:   2"));
}

#[test]
fn test_reset_then_query_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);
    record_redis_and_ui(&config_path);
    run_kb(&config_path, &["build"]);

    let (stdout, _, success) = run_kb(&config_path, &["reset", "--yes"]);
    assert!(success);
    assert!(stdout.contains("Index cleared"));

    let (_, _, success) = run_kb(&config_path, &["query", "redis"]);
    assert!(!success);

    let (stdout, _, success) = run_kb(&config_path, &["build"]);
    assert!(success);
    assert!(stdout.contains("build full"));
}

#[test]
fn test_export_import_roundtrip() {
    let (tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);
    let (redis_id, _) = record_redis_and_ui(&config_path);

    let export_path = tmp.path().join("entries.jsonl");
    let (_, stderr, success) = run_kb(
        &config_path,
        &["export", "--output", export_path.to_str().unwrap()],
    );
    assert!(success, "export failed: {}", stderr);
    let exported = fs::read_to_string(&export_path).unwrap();
    assert_eq!(exported.lines().count(), 2);

    let (other_tmp, other_config) = setup_test_env();
    let (stdout, stderr, success) = run_kb(
        &other_config,
        &["import", export_path.to_str().unwrap()],
    );
    assert!(success, "import failed: {}", stderr);
    assert!(stdout.contains("Imported 2 entries"));

    let (stdout, _, _) = run_kb(&other_config, &["get", &redis_id]);
    assert!(stdout.contains("Fix Redis connection timeout"));
    drop(other_tmp);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_kb(&tmp.path().join("nope.toml"), &["status"]);
    assert!(!success);
    assert!(stderr.contains("Configuration error"));
}
