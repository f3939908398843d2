use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn tshard_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("tshard");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(files_dir.join("notes")).unwrap();
    fs::create_dir_all(files_dir.join(".git")).unwrap();
    fs::write(
        files_dir.join("alpha.md"),
        "# Alpha Document\n\nThis is the alpha document about Rust programming.\n\nIt contains information about cargo and crates.",
    )
    .unwrap();
    fs::write(
        files_dir.join("beta.md"),
        "# Beta Document\n\nThis document discusses Python and machine learning.\n",
    )
    .unwrap();
    fs::write(
        files_dir.join("notes").join("gamma.txt"),
        "Gamma plain text file.\n\nKubernetes and Docker are mentioned here.",
    )
    .unwrap();
    fs::write(files_dir.join(".git").join("config"), "[core]\n\tbare = false\n").unwrap();

    let config_content = format!(
        r#"[index]
dir = "{}/data/index"

[search]
default_num_results = 10

[server]
bind = "127.0.0.1:0"
"#,
        root.display()
    );

    let config_path = config_dir.join("treeshard.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_tshard(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = tshard_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run tshard binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn files_root(tmp: &TempDir) -> String {
    tmp.path().join("files").to_string_lossy().into_owned()
}

fn index(tmp: &TempDir, config_path: &Path) -> String {
    let root = files_root(tmp);
    let (stdout, stderr, success) = run_tshard(config_path, &["index", &root, "--progress", "off"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    stdout
}

fn shard_files(tmp: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(tmp.path().join("data/index"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_index_filesystem() {
    let (tmp, config_path) = setup_test_env();

    let stdout = index(&tmp, &config_path);
    assert!(stdout.contains("repository: files"), "{}", stdout);
    assert!(stdout.contains("added documents: 3"), "{}", stdout);
    assert!(stdout.contains("listing errors: 0"), "{}", stdout);
    assert!(stdout.contains("ok"));
    assert_eq!(shard_files(&tmp), vec!["files_v1.00000.shard.json"]);
}

#[test]
fn test_reindex_is_idempotent() {
    let (tmp, config_path) = setup_test_env();

    let first = index(&tmp, &config_path);
    let second = index(&tmp, &config_path);
    assert!(first.contains("added documents: 3"));
    assert!(second.contains("added documents: 3"));
    assert_eq!(shard_files(&tmp), vec!["files_v1.00000.shard.json"]);
}

#[test]
fn test_index_missing_root_fails() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_tshard(&config_path, &["index", "/nonexistent/treeshard/root"]);
    assert!(!success);
    assert!(stderr.contains("does not exist"), "{}", stderr);
}

#[test]
fn test_search_finds_document() {
    let (tmp, config_path) = setup_test_env();
    index(&tmp, &config_path);

    let (stdout, stderr, success) = run_tshard(&config_path, &["search", "Rust programming"]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("files / alpha.md"), "got: {}", stdout);
    assert!(!stdout.contains("beta.md"));

    let (stdout, _, _) = run_tshard(&config_path, &["search", "kubernetes"]);
    assert!(stdout.contains("notes/gamma.txt"), "got: {}", stdout);
}

#[test]
fn test_search_json_and_num() {
    let (tmp, config_path) = setup_test_env();
    index(&tmp, &config_path);

    let (stdout, _, success) = run_tshard(&config_path, &["search", "document", "--json", "--num", "1"]);
    assert!(success);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let files = value["files"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["repo"], "files");
}

#[test]
fn test_search_repo_scope() {
    let (tmp, config_path) = setup_test_env();
    index(&tmp, &config_path);

    let (stdout, _, success) = run_tshard(&config_path, &["search", "document", "--repo", "elsewhere"]);
    assert!(success);
    assert!(stdout.contains("No results."), "got: {}", stdout);
}

#[test]
fn test_ignored_dirs_are_not_indexed() {
    let (tmp, config_path) = setup_test_env();
    index(&tmp, &config_path);

    let (stdout, _, _) = run_tshard(&config_path, &["search", "bare"]);
    assert!(stdout.contains("No results."), "got: {}", stdout);
}

#[test]
fn test_search_rejects_bad_input() {
    let (tmp, config_path) = setup_test_env();
    index(&tmp, &config_path);

    let (_, stderr, success) = run_tshard(&config_path, &["search", "  "]);
    assert!(!success);
    assert!(stderr.contains("invalid query"), "{}", stderr);

    let (_, _, success) = run_tshard(&config_path, &["search", "document", "--num", "0"]);
    assert!(!success);
}

#[test]
fn test_search_without_index_is_empty() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_tshard(&config_path, &["search", "anything"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}
