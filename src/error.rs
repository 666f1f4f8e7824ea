//! Error taxonomy for the judge-core pipeline.
//!
//! Each variant here is recovered locally by [`crate::runner::Runner`]
//! and mapped to exactly one canonical `runner_error` verdict. Nothing
//! defined here is ever allowed to propagate out of
//! [`crate::runner::Runner::run`] as a bare `Err`. Two kinds from the
//! design's error taxonomy — a phase timeout and an oversized artifact —
//! have no corresponding variant: both already know their own exact
//! verdict shape ([`crate::verdict::timed_out`] /
//! [`crate::verdict::resource_limit_artifact_too_large`]) the moment
//! they're detected, so the runner builds that verdict directly instead
//! of routing through an `Err` only to decode it again here.

use std::path::PathBuf;

/// A phase-scoped error produced while driving a submission through the
/// pipeline.
///
/// Unlike a plain `anyhow::Error`, each variant carries the structured
/// data (phase name, exit code, byte counts) that [`crate::verdict`]
/// needs to build a verdict without re-parsing an error message.
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    /// The fixed template tree could not be located under the repo root.
    #[error("workspace init failed: {0}")]
    WorkspaceInit(String),

    /// The restore phase's child process exited non-zero.
    #[error("phase '{phase}' failed with exit code {exit_code}")]
    PhaseFailure { phase: &'static str, exit_code: i32 },

    /// The test phase completed but no report artifact was found anywhere
    /// in the workspace. `child_exit_code` is the test phase's own exit
    /// code, reported verbatim when non-zero (falls back to 2 otherwise).
    #[error("no test report found under {search_root}")]
    MissingArtifact {
        search_root: PathBuf,
        child_exit_code: i32,
    },

    /// The report artifact exists but could not be parsed as the expected
    /// XML schema. `child_exit_code` is the test phase's own exit code,
    /// reported verbatim when non-zero (falls back to 3 otherwise).
    #[error("failed to parse test report {path}: {reason}")]
    ParseFailure {
        path: PathBuf,
        reason: String,
        child_exit_code: i32,
    },

    /// Transparent filesystem error, usually surfaced alongside one of the
    /// taxonomy kinds above via `.map_err`/`with_context`.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The sandbox command itself could not be spawned (e.g. the
    /// container runtime binary is missing from `PATH`). This is an
    /// infrastructure failure distinct from `PhaseFailure`, which means
    /// the child ran and exited non-zero.
    #[error("failed to spawn sandbox command: {0}")]
    Spawn(String),
}

impl JudgeError {
    /// The `diagnostics.phase` token this error should be reported under,
    /// if it maps to a runner-error verdict.
    pub fn phase_token(&self) -> &'static str {
        match self {
            JudgeError::WorkspaceInit(_) => "workspace_init",
            JudgeError::PhaseFailure { phase, .. } => phase,
            JudgeError::MissingArtifact { .. } => "test_missing_trx",
            JudgeError::ParseFailure { .. } => "trx_parse",
            JudgeError::Spawn(_) => "internal",
            JudgeError::Io(_) => "internal",
        }
    }
}
