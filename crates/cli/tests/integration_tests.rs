//! End-to-end tests driving the `cli` binary over stdin.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use tempfile::tempdir;

/// Runs the shell on `data_dir`, feeds it `commands` followed by `EXIT`,
/// and returns the result lines (prompts stripped).
fn run_cli(data_dir: &Path, commands: &str, extra_env: &[(&str, &str)]) -> Vec<String> {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cli"));
    cmd.env("LSM_DATA_DIR", data_dir)
        .env("LSM_WAL_SYNC", "false")
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (k, v) in extra_env {
        cmd.env(k, v);
    }

    let mut child = cmd.spawn().expect("failed to spawn cli");
    {
        let stdin = child.stdin.as_mut().expect("failed to open stdin");
        stdin.write_all(commands.as_bytes()).unwrap();
        stdin.write_all(b"EXIT\n").unwrap();
    }
    let output = child.wait_with_output().expect("failed to read output");
    assert!(output.status.success(), "cli exited with {:?}", output.status);

    String::from_utf8_lossy(&output.stdout)
        .split("> ")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[test]
fn put_and_get() {
    let dir = tempdir().unwrap();
    let out = run_cli(dir.path(), "PUT key1 value1\nGET key1\nGET missing\n", &[]);
    assert_eq!(out, vec!["OK", "value1", "(nil)", "bye"]);
}

#[test]
fn set_alias_and_multi_word_values() {
    let dir = tempdir().unwrap();
    let out = run_cli(dir.path(), "SET greeting hello there world\nGET greeting\n", &[]);
    assert_eq!(out, vec!["OK", "hello there world", "bye"]);
}

#[test]
fn delete_key() {
    let dir = tempdir().unwrap();
    let out = run_cli(dir.path(), "PUT k v\nDEL k\nGET k\n", &[]);
    assert_eq!(out, vec!["OK", "OK", "(nil)", "bye"]);
}

#[test]
fn usage_and_unknown_commands_report_errors() {
    let dir = tempdir().unwrap();
    let out = run_cli(dir.path(), "PUT onlykey\nGET\nFROB x\n\n", &[]);
    assert_eq!(out.len(), 4);
    assert!(out[0].starts_with("ERR usage"));
    assert!(out[1].starts_with("ERR usage"));
    assert_eq!(out[2], "ERR unknown command: FROB");
}

#[test]
fn flush_writes_a_table() {
    let dir = tempdir().unwrap();
    let out = run_cli(dir.path(), "PUT a 1\nFLUSH\nGET a\n", &[]);
    assert_eq!(out, vec!["OK", "OK (L0=1)", "1", "bye"]);

    let tables = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".sst"))
        .count();
    assert_eq!(tables, 1);
    assert!(dir.path().join("CURRENT").exists());
}

#[test]
fn small_memtable_flushes_and_compacts() {
    let dir = tempdir().unwrap();
    let mut commands = String::new();
    for i in 0..200 {
        commands.push_str(&format!("PUT key{i:03} value{i}\n"));
    }
    commands.push_str("GET key000\nGET key199\n");

    let out = run_cli(
        dir.path(),
        &commands,
        &[("LSM_MEMTABLE_BYTES", "256"), ("LSM_L0_TRIGGER", "2")],
    );
    assert_eq!(out[200], "value0");
    assert_eq!(out[201], "value199");
}

#[test]
fn manual_compaction() {
    let dir = tempdir().unwrap();
    let out = run_cli(
        dir.path(),
        "PUT a 1\nFLUSH\nPUT b 2\nFLUSH\nCOMPACT 0\nGET a\nGET b\n",
        &[("LSM_L0_TRIGGER", "0")],
    );
    assert_eq!(
        out,
        vec!["OK", "OK (L0=1)", "OK", "OK (L0=2)", "OK (L0=0, L1=1)", "1", "2", "bye"]
    );
}

#[test]
fn stats_prints_engine_state() {
    let dir = tempdir().unwrap();
    let out = run_cli(dir.path(), "STATS\n", &[]);
    assert!(out[0].starts_with("Engine"));
    assert!(out[0].contains("memtable_entries"));
}

#[test]
fn data_persists_across_restarts() {
    let dir = tempdir().unwrap();
    run_cli(dir.path(), "PUT persist yes\nPUT gone soon\nDEL gone\n", &[]);

    let out = run_cli(dir.path(), "GET persist\nGET gone\n", &[]);
    assert_eq!(out, vec!["yes", "(nil)", "bye"]);
}

#[test]
fn quit_stops_reading() {
    let dir = tempdir().unwrap();
    let out = run_cli(dir.path(), "QUIT\nPUT after quit\n", &[]);
    assert_eq!(out, vec!["bye"]);
}
