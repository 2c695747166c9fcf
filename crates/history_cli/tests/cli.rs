use std::path::Path;
use std::process::Command;

use history_cli::{parse_command, run, CliError, HistoryCommand};
use tape_history::{ExpandMode, HistoryConfig, HistoryError};

fn config(dir: &Path) -> HistoryConfig {
    let mut config = HistoryConfig::new(dir.join("history"));
    config.instance_id = 7;
    config
}

fn run_args(dir: &Path, args: &[&str]) -> Result<String, CliError> {
    let args: Vec<String> = args.iter().map(|arg| (*arg).to_string()).collect();
    let command = parse_command(&args)?;
    let mut out = Vec::new();
    run(&command, config(dir), &mut out)?;
    Ok(String::from_utf8(out).expect("output should be utf-8"))
}

#[test]
fn add_list_delete_compact() {
    let dir = tempfile::tempdir().expect("tempdir should be created");

    for line in ["cd src", "cargo build", "cargo test"] {
        run_args(dir.path(), &["add", line]).expect("add");
    }
    assert_eq!(
        run_args(dir.path(), &["list"]).expect("list"),
        "    1  cd src\n    2  cargo build\n    3  cargo test\n"
    );

    run_args(dir.path(), &["delete", "2"]).expect("delete");
    assert_eq!(
        run_args(dir.path(), &["export"]).expect("export"),
        "    1  cd src\n    2  cargo test\n"
    );

    assert_eq!(
        run_args(dir.path(), &["compact"]).expect("compact"),
        "compacted: 2 active, 1 deleted\n"
    );
    assert_eq!(
        run_args(dir.path(), &["list"]).expect("list"),
        "    1  cd src\n    2  cargo test\n"
    );
}

#[test]
fn json_listing_carries_ids() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    run_args(dir.path(), &["add", "ls"]).expect("add");

    let output = run_args(dir.path(), &["list", "--json"]).expect("list");
    let value: serde_json::Value = serde_json::from_str(output.trim()).expect("json line");
    assert_eq!(value["position"], 1);
    assert_eq!(value["bank"], "master");
    assert_eq!(value["text"], "ls");
    assert!(value["offset"].as_u64().expect("offset") > 0);
}

#[test]
fn delete_out_of_range_fails() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    run_args(dir.path(), &["add", "ls"]).expect("add");

    let error = run_args(dir.path(), &["delete", "4"]).expect_err("delete should fail");
    assert!(matches!(
        error,
        CliError::History(HistoryError::UnknownPosition {
            position: 4,
            len: 1
        })
    ));
}

#[test]
fn clear_leaves_nothing_to_list() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    run_args(dir.path(), &["add", "ls"]).expect("add");
    run_args(dir.path(), &["clear"]).expect("clear");
    assert_eq!(run_args(dir.path(), &["list"]).expect("list"), "");
}

#[test]
fn rejected_line_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let error = run_args(dir.path(), &["add", " hidden"]).expect_err("add should fail");
    assert!(matches!(error, CliError::Rejected));
}

#[test]
fn expand_check_follows_configured_mode() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let command = HistoryCommand::ExpandCheck {
        marker_pos: 6,
        line: "echo '!x'".to_string(),
    };

    let mut out = Vec::new();
    run(&command, config(dir.path()), &mut out).expect("expand-check");
    assert_eq!(out, b"inhibited\n");

    let mut on = config(dir.path());
    on.expand_mode = ExpandMode::On;
    let mut out = Vec::new();
    run(&command, on, &mut out).expect("expand-check");
    assert_eq!(out, b"expand\n");
    assert!(!dir.path().join("history").exists());
}

#[test]
fn binary_reports_errors_with_exit_status() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let history = dir.path().join("history");
    let binary = env!("CARGO_BIN_EXE_tape-history");

    let added = Command::new(binary)
        .args(["add", "echo", "hi"])
        .env("TAPE_HISTORY_PATH", &history)
        .output()
        .expect("binary should run");
    assert!(added.status.success());

    let listed = Command::new(binary)
        .arg("list")
        .env("TAPE_HISTORY_PATH", &history)
        .output()
        .expect("binary should run");
    assert_eq!(String::from_utf8_lossy(&listed.stdout), "    1  echo hi\n");

    let failed = Command::new(binary)
        .arg("purge")
        .env("TAPE_HISTORY_PATH", &history)
        .output()
        .expect("binary should run");
    assert_eq!(failed.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&failed.stderr).starts_with("error: unknown command"));
}
