//! The verdict JSON document: the single line of output the engine ever
//! writes to stdout.
//!
//! Every non-success path funnels through one of the builders here.
//! Each produces exactly the key set the outcome calls for — a timeout
//! verdict carries no `diagnostics` at all, a resource-limit verdict
//! never carries a `run`/`tests` pair — rather than a single struct with
//! optional fields serialized with `skip_serializing_if`, since the
//! shapes genuinely diverge rather than merely omitting nulls.

use serde_json::{json, Value};

/// Marker appended to a verdict string field the first time it is
/// truncated at [`crate::config::EngineConfig::verdict_field_cap_chars`].
pub const FIELD_TRUNCATION_MARKER: &str = "... [truncated]";

/// Caps `text` at `cap_chars` characters, appending
/// [`FIELD_TRUNCATION_MARKER`] when it overflows. Returns the (possibly
/// unchanged) text and whether truncation occurred.
pub fn truncate_field(text: &str, cap_chars: usize) -> (String, bool) {
    if text.chars().count() <= cap_chars {
        return (text.to_string(), false);
    }
    let mut capped: String = text.chars().take(cap_chars).collect();
    capped.push_str(FIELD_TRUNCATION_MARKER);
    (capped, true)
}

/// Process exit code the engine reports when a sandboxed phase exceeds
/// its wall-clock budget.
pub const EXIT_TIMEOUT: i32 = 124;
/// Conventional "killed by SIGKILL" exit code, used as the reported
/// exit code for a resource-limit verdict when the child's own exit
/// code was zero (e.g. the OOM killer reaped it before it could exit).
pub const EXIT_RESOURCE_LIMIT_DEFAULT: i32 = 137;

/// `{"submissionId", "status": "timed_out"}` — no other keys. Exit 124.
pub fn timed_out(submission_id: &str) -> (Value, i32) {
    (
        json!({
            "submissionId": submission_id,
            "status": "timed_out",
        }),
        EXIT_TIMEOUT,
    )
}

/// A resource-limit verdict triggered by the process-level heuristic
/// (exit code 137, or a recognized OOM/crash phrase in the captured
/// output). `note` names the matched heuristic. Exit code is the
/// child's own exit code when non-zero, else [`EXIT_RESOURCE_LIMIT_DEFAULT`].
#[allow(clippy::too_many_arguments)]
pub fn resource_limit_process(
    submission_id: &str,
    note: &str,
    child_exit_code: i32,
    stdout: &str,
    stdout_truncated: bool,
    stderr: &str,
    stderr_truncated: bool,
    field_cap: usize,
) -> (Value, i32) {
    let (stdout, stdout_truncated) = cap_and_or(stdout, stdout_truncated, field_cap);
    let (stderr, stderr_truncated) = cap_and_or(stderr, stderr_truncated, field_cap);
    let reported_exit = if child_exit_code != 0 {
        child_exit_code
    } else {
        EXIT_RESOURCE_LIMIT_DEFAULT
    };

    (
        json!({
            "submissionId": submission_id,
            "status": "resource_limit",
            "diagnostics": {
                "note": note,
                "exitCode": reported_exit,
                "stdout": stdout,
                "stdoutTruncated": stdout_truncated,
                "stderr": stderr,
                "stderrTruncated": stderr_truncated,
            },
        }),
        reported_exit,
    )
}

/// A resource-limit verdict triggered by the artifact size cap: the
/// TRX file exceeded `max_trx_bytes` and was never parsed.
pub fn resource_limit_artifact_too_large(
    submission_id: &str,
    note: &str,
    trx_bytes: u64,
    max_trx_bytes: u64,
    child_exit_code: i32,
) -> (Value, i32) {
    let reported_exit = if child_exit_code != 0 {
        child_exit_code
    } else {
        EXIT_RESOURCE_LIMIT_DEFAULT
    };

    (
        json!({
            "submissionId": submission_id,
            "status": "resource_limit",
            "diagnostics": {
                "note": note,
                "trxBytes": trx_bytes,
                "maxTrxBytes": max_trx_bytes,
                "exitCode": reported_exit,
            },
        }),
        reported_exit,
    )
}

/// A runner-error verdict: something in the engine's own pipeline
/// failed outside the resource-limit/timeout cases (workspace init,
/// missing artifact with no OOM signal, a TRX the engine couldn't
/// parse, a spawn failure). `phase` is the [`crate::error::JudgeError::phase_token`]
/// the failure occurred in. `exit_override` wins over `child_exit_code`
/// when the caller has a more specific code to report (e.g. 2 for a
/// config error encountered before any child ever ran).
#[allow(clippy::too_many_arguments)]
pub fn runner_error(
    submission_id: &str,
    phase: &str,
    child_exit_code: i32,
    exit_override: Option<i32>,
    stdout: &str,
    stdout_truncated: bool,
    stderr: &str,
    stderr_truncated: bool,
    field_cap: usize,
) -> (Value, i32) {
    let (stdout, stdout_truncated) = cap_and_or(stdout, stdout_truncated, field_cap);
    let (stderr, stderr_truncated) = cap_and_or(stderr, stderr_truncated, field_cap);
    let reported_exit = exit_override.unwrap_or(child_exit_code);

    (
        json!({
            "submissionId": submission_id,
            "status": "runner_error",
            "diagnostics": {
                "phase": phase,
                "exitCode": reported_exit,
                "stdout": stdout,
                "stdoutTruncated": stdout_truncated,
                "stderr": stderr,
                "stderrTruncated": stderr_truncated,
            },
        }),
        reported_exit,
    )
}

/// Applies the field cap on top of an already-known truncation flag
/// (e.g. from [`crate::process::ProcessOutcome`]) — truncated stays
/// truncated even if the field cap itself wouldn't have tripped.
fn cap_and_or(text: &str, already_truncated: bool, cap_chars: usize) -> (String, bool) {
    let (capped, capped_here) = truncate_field(text, cap_chars);
    (capped, already_truncated || capped_here)
}
