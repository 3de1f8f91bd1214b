//! CLI integration tests for mysql-ch-migrate.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for various error conditions.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the mysql-ch-migrate binary.
fn cmd() -> Command {
    Command::cargo_bin("mysql-ch-migrate").unwrap()
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("health-check"))
        .stdout(predicate::str::contains("history"))
        .stdout(predicate::str::contains("init"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--task-name"))
        .stdout(predicate::str::contains("--continue-on-error"));
}

#[test]
fn test_history_subcommand_help() {
    cmd()
        .args(["history", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--limit"))
        .stdout(predicate::str::contains("[default: 50]"))
        .stdout(predicate::str::contains("--task-id"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mysql-ch-migrate"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_output_json_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"));
}

#[test]
fn test_log_format_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"));
}

#[test]
fn test_verbosity_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"));
}

// =============================================================================
// Exit Code Tests - Config Errors (Exit Code 1)
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not config error (code 1)
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(7); // EXIT_IO_ERROR - file not found
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1); // EXIT_CONFIG_ERROR
}

#[test]
fn test_empty_config_exits_with_code_1() {
    let file = tempfile::NamedTempFile::new().unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1); // EXIT_CONFIG_ERROR
}

#[test]
fn test_missing_required_fields_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    // Valid YAML but missing required config fields
    writeln!(file, "source:").unwrap();
    writeln!(file, "  host: mysql.internal").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run"])
        .assert()
        .code(1); // EXIT_CONFIG_ERROR
}

#[test]
fn test_same_endpoint_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "source:\n  host: db\n  port: 9000\n  database: a\n  user: u\ntarget:\n  host: db\n  port: 9000\n  database: b"
    )
    .unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "validate"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("same endpoint"));
}

// =============================================================================
// Subcommand Existence Tests
// =============================================================================

#[test]
fn test_health_check_command_exists() {
    cmd()
        .args(["health-check", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Test database connections"));
}

#[test]
fn test_validate_command_exists() {
    cmd()
        .args(["validate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Validate row counts"));
}

// =============================================================================
// Init and History Tests
// =============================================================================

#[test]
fn test_init_writes_loadable_template() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");

    cmd()
        .args(["init", "--output", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote configuration template"));

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("source_table: orders"));
    assert!(content.contains("drop_table_before_create: true"));
}

#[test]
fn test_init_refuses_to_overwrite() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "keep me").unwrap();

    cmd()
        .args(["init", "--output", file.path().to_str().unwrap()])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--force"));

    let content = std::fs::read_to_string(file.path()).unwrap();
    assert!(content.contains("keep me"));
}

#[test]
fn test_history_on_empty_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = dir.path().join("tasks.db");
    let config = dir.path().join("config.yaml");
    std::fs::write(
        &config,
        format!(
            "source:\n  host: mysql.internal\n  database: shop\n  user: reader\ntarget:\n  host: clickhouse.internal\n  database: analytics\nledger:\n  path: {}\n",
            ledger.display()
        ),
    )
    .unwrap();

    cmd()
        .args(["--config", config.to_str().unwrap(), "--output-json", "history"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn test_history_unknown_task_exits_with_code_1() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = dir.path().join("tasks.db");
    let config = dir.path().join("config.yaml");
    std::fs::write(
        &config,
        format!(
            "source:\n  host: mysql.internal\n  database: shop\n  user: reader\ntarget:\n  host: clickhouse.internal\n  database: analytics\nledger:\n  path: {}\n",
            ledger.display()
        ),
    )
    .unwrap();

    cmd()
        .args(["--config", config.to_str().unwrap(), "history", "--task-id", "99"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Task 99 not found"));
}

// =============================================================================
// Config Path Tests
// =============================================================================

#[test]
fn test_config_default_path() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

#[test]
fn test_short_config_flag() {
    // -c should work as short for --config
    cmd()
        .args(["-c", "some_config.yaml", "--help"])
        .assert()
        .success();
}

// =============================================================================
// No Subcommand Tests
// =============================================================================

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}
