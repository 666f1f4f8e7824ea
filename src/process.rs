//! Sandboxed child-process execution with bounded output capture.
//!
//! [`ProcessExecutor`] is the lowest-level component in the pipeline: it
//! knows nothing about containers, workspaces, or verdicts. It spawns one
//! argument vector, drains its two output streams under a character cap,
//! enforces a wall-clock deadline, and returns a [`ProcessOutcome`]. It
//! never retries and never interprets a shell.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::Instant;

/// Literal marker appended to a captured stream the first time it
/// overflows its character cap. Draining continues after the marker is
/// appended so the child is never blocked on a full pipe.
pub const TRUNCATION_MARKER: &str = "\n... [output truncated]";

/// The result of running one child process to completion or timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit code of the child, or `-1` if it timed out.
    pub exit_code: i32,
    /// Captured standard output, capped at the configured character limit.
    pub stdout: String,
    /// Captured standard error, capped at the configured character limit.
    pub stderr: String,
    /// `true` if the wall-clock deadline fired before the child exited.
    pub timed_out: bool,
    /// `true` if `stdout` was truncated (independent of `timed_out`).
    pub stdout_truncated: bool,
    /// `true` if `stderr` was truncated (independent of `timed_out`).
    pub stderr_truncated: bool,
}

impl ProcessOutcome {
    /// Invariant check: a timed-out outcome always reports exit code -1.
    #[cfg(test)]
    fn invariant_holds(&self) -> bool {
        !self.timed_out || self.exit_code == -1
    }
}

/// Spawns child processes and captures their output under a bounded
/// budget, per the design's `ProcessExecutor` contract.
#[derive(Debug, Clone, Copy)]
pub struct ProcessExecutor {
    stdout_cap_chars: usize,
    stderr_cap_chars: usize,
    drain_grace: Duration,
}

impl ProcessExecutor {
    /// Creates an executor with the given per-stream character caps and
    /// post-exit drain grace period.
    pub fn new(stdout_cap_chars: usize, stderr_cap_chars: usize, drain_grace: Duration) -> Self {
        Self {
            stdout_cap_chars,
            stderr_cap_chars,
            drain_grace,
        }
    }

    /// Runs `file` with `args` in `cwd`, enforcing `timeout`.
    ///
    /// Stdin is closed. No shell is invoked — `args` are passed to the
    /// child's argv directly. Spawn errors propagate; everything after a
    /// successful spawn (timeout, non-zero exit, drain failure) is
    /// captured in the returned [`ProcessOutcome`] instead of an `Err`.
    pub async fn run(
        &self,
        file: &str,
        args: &[String],
        cwd: &Path,
        timeout: Duration,
    ) -> std::io::Result<ProcessOutcome> {
        let mut command = Command::new(file);
        command
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn()?;

        let stdout = child
            .stdout
            .take()
            .expect("stdout was requested as piped");
        let stderr = child
            .stderr
            .take()
            .expect("stderr was requested as piped");

        let stdout_task = tokio::spawn(drain(stdout, self.stdout_cap_chars));
        let stderr_task = tokio::spawn(drain(stderr, self.stderr_cap_chars));

        let deadline = Instant::now() + timeout;
        let wait_result = tokio::time::timeout_at(deadline, child.wait()).await;

        let (exit_code, timed_out) = match wait_result {
            Ok(Ok(status)) => (status.code().unwrap_or(-1), false),
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                kill_best_effort(&mut child).await;
                (-1, true)
            }
        };

        let ((stdout_text, stdout_truncated), (stderr_text, stderr_truncated)) =
            join_with_grace(stdout_task, stderr_task, self.drain_grace).await;

        Ok(ProcessOutcome {
            exit_code,
            stdout: stdout_text,
            stderr: stderr_text,
            timed_out,
            stdout_truncated,
            stderr_truncated,
        })
    }
}

/// Best-effort kill of a timed-out child. Failures are logged, never
/// propagated — the caller has already decided this run is a timeout.
async fn kill_best_effort(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::warn!("failed to kill timed-out child: {e}");
        return;
    }
    // kill_on_drop already requested termination; reap it so it doesn't
    // linger as a zombie.
    if let Err(e) = child.wait().await {
        tracing::warn!("failed to reap killed child: {e}");
    }
}

/// Awaits both drain tasks, but no longer than `grace` past whichever
/// finishes last in sequence. Tasks still running at the deadline are
/// abandoned and their stream is substituted with an empty, truncated
/// result rather than blocking the pipeline indefinitely.
async fn join_with_grace(
    stdout_task: tokio::task::JoinHandle<(String, bool)>,
    stderr_task: tokio::task::JoinHandle<(String, bool)>,
    grace: Duration,
) -> ((String, bool), (String, bool)) {
    let combined = async {
        let stdout = stdout_task.await.unwrap_or_else(|e| {
            tracing::warn!("stdout drain task panicked: {e}");
            (String::new(), true)
        });
        let stderr = stderr_task.await.unwrap_or_else(|e| {
            tracing::warn!("stderr drain task panicked: {e}");
            (String::new(), true)
        });
        (stdout, stderr)
    };

    match tokio::time::timeout(grace, combined).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("output drain did not finish within grace period, truncating");
            ((String::new(), true), (String::new(), true))
        }
    }
}

/// Reads `reader` to EOF, accumulating at most `cap_chars` characters.
/// On first overflow, appends [`TRUNCATION_MARKER`] once and keeps
/// reading (discarding further bytes) so the child is never blocked on
/// a full pipe buffer.
async fn drain<R: tokio::io::AsyncRead + Unpin>(mut reader: R, cap_chars: usize) -> (String, bool) {
    let mut text = String::new();
    let mut truncated = false;
    let mut buf = [0u8; 8192];
    let mut pending = Vec::new();

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("error reading child output: {e}");
                break;
            }
        };

        if truncated {
            // Already capped; keep draining the pipe without growing the buffer.
            continue;
        }

        pending.extend_from_slice(&buf[..n]);
        let chunk = String::from_utf8_lossy(&pending);
        let chunk = chunk.into_owned();
        pending.clear();

        for ch in chunk.chars() {
            if text.chars().count() >= cap_chars {
                text.push_str(TRUNCATION_MARKER);
                truncated = true;
                break;
            }
            text.push(ch);
        }
    }

    (text, truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> ProcessExecutor {
        ProcessExecutor::new(64_000, 64_000, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let outcome = executor()
            .run(
                "/bin/sh",
                &["-c".to_string(), "echo hello".to_string()],
                Path::new("."),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.stdout.trim(), "hello");
        assert!(!outcome.timed_out);
        assert!(outcome.invariant_holds());
    }

    #[tokio::test]
    async fn nonzero_exit_code_is_propagated() {
        let outcome = executor()
            .run(
                "/bin/sh",
                &["-c".to_string(), "exit 7".to_string()],
                Path::new("."),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, 7);
        assert!(outcome.invariant_holds());
    }

    #[tokio::test]
    async fn timeout_kills_child_and_reports_minus_one() {
        let outcome = executor()
            .run(
                "/bin/sh",
                &["-c".to_string(), "sleep 30".to_string()],
                Path::new("."),
                Duration::from_millis(100),
            )
            .await
            .unwrap();

        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, -1);
        assert!(outcome.invariant_holds());
    }

    #[tokio::test]
    async fn overflowing_stream_is_capped_and_marked_truncated() {
        let small = ProcessExecutor::new(10, 10, Duration::from_secs(5));
        let outcome = small
            .run(
                "/bin/sh",
                &[
                    "-c".to_string(),
                    "head -c 5000 /dev/zero | tr '\\0' 'A'".to_string(),
                ],
                Path::new("."),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert!(outcome.stdout_truncated);
        assert!(outcome.stdout.contains(TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn stdin_is_closed() {
        // A process that reads from stdin should see immediate EOF, not hang.
        let outcome = executor()
            .run(
                "/bin/sh",
                &["-c".to_string(), "cat".to_string()],
                Path::new("."),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.stdout, "");
    }
}
