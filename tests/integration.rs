use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use docmesh::segment::document_id;

const SEP: &str = "<|RELATED_DOC_SEP|>";

fn docmesh_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("docmesh");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    // One blob with three articles, one with a single article, one not UTF-8
    let corpus_dir = root.join("corpus");
    fs::create_dir_all(corpus_dir.join("nested")).unwrap();
    fs::write(
        corpus_dir.join("guides.md"),
        format!(
            "# Async Rust\n\nTokio schedules futures.\n\n## Runtimes\n\nMulti-threaded by default.\n\n### Blocking\n\nUse spawn_blocking.\n{SEP}\n# Error handling\n\nUse anyhow in binaries and thiserror in libraries.\n{SEP}\n# Testing\n\n> **Note:** integration tests live under tests/.\n"
        ),
    )
    .unwrap();
    fs::write(
        corpus_dir.join("nested/patterns.md"),
        "# Async Rust patterns\n\nSelect and join.\n\n```rust\nasync fn run() {}\n```\n",
    )
    .unwrap();
    fs::write(corpus_dir.join("broken.md"), [0xffu8, 0xfe, 0xfd]).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/docmesh.sqlite"

[corpus]
root = "{root}/corpus"
separator = "{SEP}"
include_globs = ["**/*.md", "**/*.txt"]

[retrieval]
final_limit = 12

[server]
bind = "127.0.0.1:7341"
"#,
        root = root.display(),
    );

    let config_path = config_dir.join("docmesh.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docmesh(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docmesh_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docmesh binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn built_env() -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_docmesh(&config_path, &["build"]);
    assert!(success, "build failed: stdout={}, stderr={}", stdout, stderr);
    (tmp, config_path)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_docmesh(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/docmesh.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_docmesh(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_docmesh(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_build_reports_counts() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_docmesh(&config_path, &["build"]);
    assert!(success, "build failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("blobs read: 2"));
    assert!(stdout.contains("blobs skipped: 1"));
    assert!(stdout.contains("broken.md"));
    assert!(stdout.contains("documents: 4"));
    assert!(stdout.contains("sibling edges: 3"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_build_dry_run_writes_nothing() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_docmesh(&config_path, &["build", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("dry-run"));
    assert!(stdout.contains("documents: 4"));

    let (_, stderr, success) = run_docmesh(&config_path, &["search", "tokio"]);
    assert!(!success, "search should fail before a real build");
    assert!(stderr.contains("docmesh build"));
}

#[test]
fn test_search_keyword() {
    let (_tmp, config_path) = built_env();

    let (stdout, stderr, success) = run_docmesh(&config_path, &["search", "tokio"]);
    assert!(success, "search failed: stderr={}", stderr);
    assert!(stdout.contains("Async Rust"));
    assert!(stdout.contains(&document_id("guides.md", 0)));
    assert!(stdout.contains("Tokio schedules futures"));
}

#[test]
fn test_search_deterministic() {
    let (_tmp, config_path) = built_env();

    let (first, _, _) = run_docmesh(&config_path, &["search", "async rust"]);
    let (second, _, _) = run_docmesh(&config_path, &["search", "async rust"]);
    assert_eq!(first, second);
    assert!(first.contains("1. "));
    assert!(first.contains("2. "));
}

#[test]
fn test_search_empty_query() {
    let (_tmp, config_path) = built_env();

    let (_, stderr, success) = run_docmesh(&config_path, &["search", "   "]);
    assert!(!success, "empty query should fail");
    assert!(stderr.contains("invalid query"));
}

#[test]
fn test_search_no_results() {
    let (_tmp, config_path) = built_env();

    let (stdout, _, success) = run_docmesh(&config_path, &["search", "nonexistenttoken"]);
    assert!(success, "no-match search is not an error");
    assert!(stdout.contains("No results."));
}

#[test]
fn test_related_lists_siblings_then_topical() {
    let (_tmp, config_path) = built_env();

    let id = document_id("guides.md", 0);
    let (stdout, stderr, success) = run_docmesh(&config_path, &["related", &id]);
    assert!(success, "related failed: stderr={}", stderr);

    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3, "unexpected output: {}", stdout);
    assert!(lines[0].starts_with("sibling") && lines[0].contains("Error handling"));
    assert!(lines[1].starts_with("sibling") && lines[1].contains("Testing"));
    assert!(lines[2].starts_with("topical") && lines[2].contains("Async Rust patterns"));
}

#[test]
fn test_related_unknown_id() {
    let (_tmp, config_path) = built_env();

    let (_, stderr, success) = run_docmesh(&config_path, &["related", "0000000000000000"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_toc_nesting() {
    let (_tmp, config_path) = built_env();

    let id = document_id("guides.md", 0);
    let (stdout, _, success) = run_docmesh(&config_path, &["toc", &id]);
    assert!(success);
    assert_eq!(
        stdout.lines().collect::<Vec<_>>(),
        vec!["# Async Rust", "  ## Runtimes", "    ### Blocking"]
    );
}

#[test]
fn test_get_document() {
    let (_tmp, config_path) = built_env();

    let id = document_id("guides.md", 2);
    let (stdout, stderr, success) = run_docmesh(&config_path, &["get", &id]);
    assert!(success, "get failed: stderr={}", stderr);
    assert!(stdout.contains("title:        Testing"));
    assert!(stdout.contains("ordinal:      2"));
    assert!(stdout.contains("callouts:     note"));
    assert!(stdout.contains("integration tests live under tests/"));
}

#[test]
fn test_get_missing_document() {
    let (_tmp, config_path) = built_env();

    let (_, stderr, success) = run_docmesh(&config_path, &["get", "does-not-exist"]);
    assert!(!success, "get for a missing ID should fail");
    assert!(stderr.contains("not found"));
}

#[test]
fn test_ids_stable_across_rebuilds() {
    let (_tmp, config_path) = built_env();

    let (first, _, _) = run_docmesh(&config_path, &["search", "anyhow"]);
    let (_, _, success) = run_docmesh(&config_path, &["build"]);
    assert!(success);
    let (second, _, _) = run_docmesh(&config_path, &["search", "anyhow"]);

    assert!(first.contains(&document_id("guides.md", 1)));
    assert_eq!(first, second);
}

#[test]
fn test_stats() {
    let (_tmp, config_path) = built_env();

    let (stdout, _, success) = run_docmesh(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Documents:   4"));
    assert!(stdout.contains("Blobs:       2 (1 skipped)"));
    assert!(stdout.contains("nested/patterns.md"));
}

#[test]
fn test_export_json() {
    let (tmp, config_path) = built_env();

    let out = tmp.path().join("out/export.json");
    let (_, stderr, success) = run_docmesh(&config_path, &["export", out.to_str().unwrap()]);
    assert!(success, "export failed: stderr={}", stderr);

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(json["documents"].as_array().unwrap().len(), 4);
    assert_eq!(json["skipped"][0]["path"], "broken.md");
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_docmesh(&tmp.path().join("nope.toml"), &["stats"]);
    assert!(!success);
    assert!(stderr.contains("config"));
}
