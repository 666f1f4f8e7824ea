//! The submission pipeline state machine: INIT → RESTORE → TEST →
//! LOCATE → CONVERT/EMIT.
//!
//! [`Runner::run`] never returns an `Err` — every failure mode the
//! pipeline can hit is mapped to one of the four verdict shapes in
//! [`crate::verdict`] before it reaches the caller, and the workspace is
//! always torn down (unless `keep` is set) regardless of which branch
//! was taken.

use std::path::Path;
use std::time::Duration;

use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::JudgeError;
use crate::process::ProcessExecutor;
use crate::sandbox::{Phase, SandboxCommandBuilder};
use crate::workspace::{WorkspaceManager, WorkspacePaths};
use crate::{report, verdict};

/// Container runtime binary invoked for both sandboxed phases. Matches
/// the CLI contract `SandboxCommandBuilder` assembles argv for.
const CONTAINER_RUNTIME: &str = "docker";

/// Case-insensitive phrases that, found anywhere in a phase's captured
/// stdout+stderr, indicate the sandbox's resource limits (not the
/// submission's own logic) killed the process.
const RESOURCE_LIMIT_PHRASES: [&str; 5] = [
    "Out of memory",
    "OutOfMemoryException",
    "Killed",
    "Test host process crashed",
    "Test Run Aborted",
];

/// Conventional exit code for a process terminated by SIGKILL.
const EXIT_SIGKILL: i32 = 137;

/// Drives one submission through the full pipeline and produces a
/// verdict document plus the process exit code to report it with.
pub struct Runner {
    config: EngineConfig,
    workspace: WorkspaceManager,
    executor: ProcessExecutor,
}

impl Runner {
    pub fn new(config: EngineConfig) -> Self {
        let executor = ProcessExecutor::new(
            config.stdout_cap_chars,
            config.stderr_cap_chars,
            Duration::from_secs(config.drain_grace_secs),
        );
        Self {
            workspace: WorkspaceManager::new(),
            executor,
            config,
        }
    }

    /// Runs one submission rooted at `cwd` (used to locate the judge
    /// template repo root) and returns `(verdict, exit_code)`. `keep`
    /// suppresses workspace cleanup for post-mortem debugging.
    pub async fn run(&self, cwd: &Path, keep: bool) -> (Value, i32) {
        let submission_id = mint_submission_id();

        let workspace = match self.workspace.create_workspace(cwd, &submission_id).await {
            Ok(ws) => ws,
            Err(e) => {
                tracing::error!(error = %e, "workspace init failed");
                let (value, exit_code) = verdict::runner_error(
                    &submission_id,
                    e.phase_token(),
                    0,
                    Some(1),
                    "",
                    false,
                    "",
                    false,
                    self.config.verdict_field_cap_chars,
                );
                return (value, exit_code);
            }
        };

        let result = self.run_phases(&workspace, &submission_id).await;
        WorkspaceManager::cleanup(&workspace.work_dir, keep).await;

        match result {
            Ok(pair) => pair,
            Err(e) => {
                tracing::error!(error = %e, phase = e.phase_token(), "runner error");
                verdict::runner_error(
                    &submission_id,
                    e.phase_token(),
                    exit_code_of(&e),
                    None,
                    "",
                    false,
                    "",
                    false,
                    self.config.verdict_field_cap_chars,
                )
            }
        }
    }

    /// RESTORE → TEST → LOCATE → CONVERT, short-circuiting into a
    /// timeout or resource-limit verdict wherever one of those
    /// conditions is detected. An `Err` here always means a genuine
    /// runner-error condition, never a submission-side failure.
    async fn run_phases(
        &self,
        ws: &WorkspacePaths,
        submission_id: &str,
    ) -> Result<(Value, i32), JudgeError> {
        let builder = SandboxCommandBuilder::new(&self.config);

        let restore_args = builder.restore_args(submission_id, &ws.work_dir, &ws.package_cache_dir);
        let restore_outcome = self
            .executor
            .run(
                CONTAINER_RUNTIME,
                &restore_args,
                &ws.work_dir,
                Duration::from_secs(self.config.restore_timeout_secs),
            )
            .await
            .map_err(|e| JudgeError::Spawn(e.to_string()))?;

        if restore_outcome.timed_out {
            self.kill_and_remove(&builder, Phase::Restore, submission_id).await;
            return Ok(verdict::timed_out(submission_id));
        }
        if restore_outcome.exit_code != 0 {
            // The state table has no resource-limit branch for RESTORE: a
            // failed dependency restore is always a runner error, never
            // escalated by the OOM/crash heuristic (that only applies to
            // an unlocatable test-phase artifact, below).
            return Err(JudgeError::PhaseFailure {
                phase: "restore",
                exit_code: restore_outcome.exit_code,
            });
        }

        let test_args = builder.test_args(submission_id, &ws.work_dir, &ws.package_cache_dir);
        let test_outcome = self
            .executor
            .run(
                CONTAINER_RUNTIME,
                &test_args,
                &ws.work_dir,
                Duration::from_secs(self.config.test_timeout_secs),
            )
            .await
            .map_err(|e| JudgeError::Spawn(e.to_string()))?;

        if test_outcome.timed_out {
            self.kill_and_remove(&builder, Phase::Test, submission_id).await;
            return Ok(verdict::timed_out(submission_id));
        }

        // A non-zero exit from the test phase is not itself a failure —
        // `dotnet test` exits non-zero whenever any test fails, which is
        // a perfectly normal `completed` outcome. The state table sends
        // *any* test-phase exit straight to LOCATE; the resource-limit
        // heuristic only comes into play below, and only when LOCATE
        // can't find an artifact at all.
        let artifact_path = match WorkspaceManager::find_artifact(&ws.work_dir, "results.trx").await {
            Some(path) => path,
            None => {
                if let Some(note) =
                    detect_resource_limit(test_outcome.exit_code, &test_outcome.stdout, &test_outcome.stderr)
                {
                    return Ok(verdict::resource_limit_process(
                        submission_id,
                        &note,
                        test_outcome.exit_code,
                        &test_outcome.stdout,
                        test_outcome.stdout_truncated,
                        &test_outcome.stderr,
                        test_outcome.stderr_truncated,
                        self.config.verdict_field_cap_chars,
                    ));
                }
                return Err(JudgeError::MissingArtifact {
                    search_root: ws.work_dir.clone(),
                    child_exit_code: test_outcome.exit_code,
                });
            }
        };

        let metadata = tokio::fs::metadata(&artifact_path).await?;
        let trx_bytes = metadata.len();
        if trx_bytes > self.config.max_trx_bytes {
            return Ok(verdict::resource_limit_artifact_too_large(
                submission_id,
                "test report exceeds the maximum allowed size",
                trx_bytes,
                self.config.max_trx_bytes,
                test_outcome.exit_code,
            ));
        }

        let xml = tokio::fs::read_to_string(&artifact_path).await?;
        let parsed = report::trx::parse(&xml).map_err(|reason| JudgeError::ParseFailure {
            path: artifact_path.clone(),
            reason,
            child_exit_code: test_outcome.exit_code,
        })?;

        let trx_path = artifact_path.display().to_string();
        let verdict = report::completed_verdict(
            submission_id,
            &parsed,
            &trx_path,
            self.config.verdict_field_cap_chars,
        );
        // `dotnet test` exits non-zero whenever any test in the run
        // failed; that exit code is reported verbatim as the process
        // exit code even though the verdict's own status is `completed`.
        Ok((verdict, test_outcome.exit_code))
    }

    /// Best-effort `kill` then `rm -f` of a phase's container after a
    /// timeout. Failures are logged by the executor and otherwise
    /// ignored — the verdict has already been decided.
    async fn kill_and_remove(&self, builder: &SandboxCommandBuilder<'_>, phase: Phase, submission_id: &str) {
        let (kill_args, rm_args) = builder.kill_and_remove_args(phase, submission_id);
        let budget = Duration::from_secs(self.config.cleanup_kill_budget_secs);
        let cwd = Path::new(".");
        let _ = self.executor.run(CONTAINER_RUNTIME, &kill_args, cwd, budget).await;
        let _ = self.executor.run(CONTAINER_RUNTIME, &rm_args, cwd, budget).await;
    }
}

/// Mints an opaque 32-character hex submission id.
fn mint_submission_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Exit code to report for a runner-error verdict built from `e`, when
/// the caller has no override of its own. `PhaseFailure`,
/// `MissingArtifact`, and `ParseFailure` all carry the test phase's own
/// exit code and report it verbatim when non-zero, per spec §6; each
/// falls back to its own fixed code (2, 3) when the child itself exited
/// cleanly. Everything else is an infrastructure fault with no
/// meaningful child exit code to report, and defaults to 1.
fn exit_code_of(e: &JudgeError) -> i32 {
    match e {
        JudgeError::PhaseFailure { exit_code, .. } => *exit_code,
        JudgeError::MissingArtifact { child_exit_code, .. } => {
            if *child_exit_code != 0 {
                *child_exit_code
            } else {
                2
            }
        }
        JudgeError::ParseFailure { child_exit_code, .. } => {
            if *child_exit_code != 0 {
                *child_exit_code
            } else {
                3
            }
        }
        _ => 1,
    }
}

/// Checks `exit_code` and the combined captured output against the
/// resource-limit signals: an exit code of 137 (SIGKILL), or one of
/// [`RESOURCE_LIMIT_PHRASES`] appearing case-insensitively anywhere in
/// `stdout` or `stderr`. Returns a human-readable note describing
/// whichever signal matched first, for `diagnostics.note`.
fn detect_resource_limit(exit_code: i32, stdout: &str, stderr: &str) -> Option<String> {
    if exit_code == EXIT_SIGKILL {
        return Some(format!("process exited with code {EXIT_SIGKILL} (SIGKILL)"));
    }

    let combined = format!("{stdout}\n{stderr}").to_lowercase();
    RESOURCE_LIMIT_PHRASES
        .iter()
        .find(|phrase| combined.contains(&phrase.to_lowercase()))
        .map(|phrase| format!("matched resource-limit signal \"{phrase}\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_sigkill_exit_code_regardless_of_output() {
        assert!(detect_resource_limit(137, "", "").is_some());
    }

    #[test]
    fn detects_oom_phrase_case_insensitively() {
        let note = detect_resource_limit(1, "", "fatal: out of MEMORY while allocating");
        assert!(note.is_some());
        assert!(note.unwrap().contains("Out of memory"));
    }

    #[test]
    fn detects_dotnet_test_host_crash_phrase() {
        assert!(detect_resource_limit(1, "Test host process crashed : Segmentation fault", "").is_some());
    }

    #[test]
    fn ordinary_nonzero_exit_without_signal_is_not_resource_limited() {
        assert!(detect_resource_limit(1, "1 test failed, 2 passed", "").is_none());
    }

    #[test]
    fn clean_exit_is_never_resource_limited() {
        assert!(detect_resource_limit(0, "all good", "").is_none());
    }

    #[test]
    fn phase_failure_exit_code_is_reported_verbatim() {
        let e = JudgeError::PhaseFailure {
            phase: "restore",
            exit_code: 3,
        };
        assert_eq!(exit_code_of(&e), 3);
    }

    #[test]
    fn infra_errors_default_to_exit_code_one() {
        let e = JudgeError::Spawn("docker not found".to_string());
        assert_eq!(exit_code_of(&e), 1);
    }

    #[test]
    fn missing_artifact_falls_back_to_exit_two_on_clean_child_exit() {
        let e = JudgeError::MissingArtifact {
            search_root: "/work".into(),
            child_exit_code: 0,
        };
        assert_eq!(exit_code_of(&e), 2);
    }

    #[test]
    fn missing_artifact_reports_nonzero_child_exit_verbatim() {
        let e = JudgeError::MissingArtifact {
            search_root: "/work".into(),
            child_exit_code: 5,
        };
        assert_eq!(exit_code_of(&e), 5);
    }

    #[test]
    fn parse_failure_falls_back_to_exit_three_on_clean_child_exit() {
        let e = JudgeError::ParseFailure {
            path: "/work/results.trx".into(),
            reason: "bad xml".to_string(),
            child_exit_code: 0,
        };
        assert_eq!(exit_code_of(&e), 3);
    }

    #[test]
    fn parse_failure_reports_nonzero_child_exit_verbatim() {
        let e = JudgeError::ParseFailure {
            path: "/work/results.trx".into(),
            reason: "bad xml".to_string(),
            child_exit_code: 9,
        };
        assert_eq!(exit_code_of(&e), 9);
    }

    #[test]
    fn mint_submission_id_is_32_hex_chars() {
        let id = mint_submission_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
