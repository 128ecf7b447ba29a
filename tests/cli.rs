// CLI tests for the redis-lua-mock binary

use assert_cmd::Command;
use std::fs;
use tempfile::TempDir;

fn write_script(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("script.lua");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_runs_script_and_prints_json() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "return 'k:' .. redis.call('INCR', KEYS[1])");

    Command::cargo_bin("redis-lua-mock")
        .unwrap()
        .arg(&script)
        .arg("counter")
        .assert()
        .success()
        .stdout("\"k:1\"\n");
}

#[test]
fn test_keys_and_args() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "return {KEYS[1], ARGV[1], ARGV[2]}");

    Command::cargo_bin("redis-lua-mock")
        .unwrap()
        .args([script.to_str().unwrap(), "k", "--", "a", "b"])
        .assert()
        .success()
        .stdout("[\"k\",\"a\",\"b\"]\n");
}

#[test]
fn test_script_error_fails() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "return cjson.decode('{')");

    Command::cargo_bin("redis-lua-mock")
        .unwrap()
        .arg(&script)
        .assert()
        .failure();
}

#[test]
fn test_missing_script_argument() {
    Command::cargo_bin("redis-lua-mock")
        .unwrap()
        .assert()
        .failure();
}
