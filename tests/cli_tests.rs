//! Command-line behaviour of the `sqlrun` binary.

use assert_cmd::Command;
use std::fs;
use tempfile::TempDir;

/// A temp dir holding a sqlite database and a config pointing at it.
fn setup() -> (TempDir, String) {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("cli.db");
    let config_path = dir.path().join("config.toml");
    fs::write(
        &config_path,
        format!(
            "[database]\ndriver = \"sqlite\"\npath = {:?}\n",
            db_path.to_str().unwrap()
        ),
    )
    .unwrap();
    let config = config_path.to_str().unwrap().to_string();
    (dir, config)
}

fn sqlrun(config: &str, args: &[&str]) -> assert_cmd::assert::Assert {
    Command::cargo_bin("sqlrun")
        .unwrap()
        .arg("--config")
        .arg(config)
        .args(args)
        .assert()
}

#[test]
fn test_statements_and_rows() {
    let (_dir, config) = setup();

    sqlrun(&config, &["CREATE TABLE t (id INTEGER, name TEXT)"])
        .success()
        .stdout("OK\n");
    sqlrun(&config, &["INSERT INTO t VALUES (?, ?), (?, ?)", "1", "a", "2", "b"])
        .success()
        .stdout("2 row(s) affected\n");
    sqlrun(&config, &["SELECT id, name FROM t WHERE id IN (:ids) ORDER BY id", ":ids=[1,2]"])
        .success()
        .stdout("{\"id\":1,\"name\":\"a\"}\n{\"id\":2,\"name\":\"b\"}\n");
}

#[test]
fn test_query_error_exit_code() {
    let (_dir, config) = setup();
    let output = sqlrun(&config, &["SELECT * FROM missing"])
        .failure()
        .code(1)
        .get_output()
        .clone();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no such table"));
}

#[test]
fn test_usage_errors() {
    let (_dir, config) = setup();
    sqlrun(&config, &[]).failure().code(2);
    sqlrun(&config, &["SELECT :a, ?", ":a=1", "2"]).failure().code(2);

    Command::cargo_bin("sqlrun")
        .unwrap()
        .args(["--config", "/nonexistent/config.toml", "SELECT 1"])
        .assert()
        .failure()
        .code(2);
}
