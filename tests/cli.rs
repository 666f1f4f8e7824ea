//! End-to-end smoke tests for the `judge-core` binary's CLI surface.
//!
//! These avoid anything that would require a real container runtime:
//! the one scenario exercised here — no `judge-template` tree anywhere
//! above the working directory — fails during workspace init, before
//! `docker` is ever invoked.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn missing_judge_template_reports_runner_error_with_exit_code_one() {
    let tmp = tempfile::tempdir().unwrap();

    let mut cmd = Command::cargo_bin("judge-core").unwrap();
    cmd.current_dir(tmp.path())
        .arg("--config")
        .arg(tmp.path().join("does-not-exist.toml"));

    cmd.assert()
        .code(1)
        .stdout(predicate::str::contains("runner_error"))
        .stdout(predicate::str::contains("workspace_init"));
}

#[test]
fn help_flag_exits_successfully() {
    let mut cmd = Command::cargo_bin("judge-core").unwrap();
    cmd.arg("--help");
    cmd.assert().success();
}
