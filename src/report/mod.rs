//! TRX report conversion: turns a parsed `results.trx` document into the
//! canonical `run`/`tests`/`diagnostics` shape of a `completed` verdict.
//!
//! Mirrors the split the teacher uses for JUnit: raw XML parsing lives
//! in [`trx`], normalization and JSON assembly live here.

pub mod trx;

use serde_json::{json, Value};

use crate::verdict::truncate_field;

/// Normalizes a raw TRX outcome string to one of the four canonical
/// outcomes the engine ever reports: `Passed`, `Failed`, `Skipped`, or
/// `Unknown`.
///
/// `Timeout` collapses into `Failed` — from the submitter's point of
/// view a test that blew its own time budget failed, full stop, the
/// distinction only matters to the sandbox's own phase timeout. Any
/// string this table doesn't recognize maps to `Unknown` rather than
/// erroring, since a future test host may introduce new outcome
/// strings we haven't seen yet.
fn normalize_outcome(raw: Option<&str>) -> &'static str {
    match raw {
        Some("Passed") | Some("Completed") => "Passed",
        Some("Failed") | Some("Error") | Some("Aborted") | Some("Timeout") => "Failed",
        Some("NotExecuted") | Some("Inconclusive") | Some("NotRunnable") => "Skipped",
        _ => "Unknown",
    }
}

/// Parses a TRX `duration` attribute (`HH:MM:SS.fffffff`, 100ns ticks)
/// into whole milliseconds, rounded to the nearest millisecond.
fn parse_duration_ms(raw: &str) -> Option<i64> {
    let (hms, frac) = raw.split_once('.').unwrap_or((raw, "0"));
    let mut parts = hms.split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds: i64 = parts.next()?.parse().ok()?;

    let frac_padded = format!("{frac:0<7}");
    let ticks: i64 = frac_padded.get(..7)?.parse().ok()?;
    let frac_ms = ticks as f64 / 10_000.0;

    let whole_ms = (hours * 3_600_000) + (minutes * 60_000) + (seconds * 1_000);
    Some(whole_ms + frac_ms.round() as i64)
}

/// Parses an ISO-8601 / RFC-3339 timestamp, returning it re-serialized
/// in the same format (round-tripped rather than passed through
/// verbatim, so an odd source format doesn't leak into the verdict).
fn normalize_timestamp(raw: &str) -> Option<String> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.to_rfc3339())
}

/// `None`/empty/whitespace-only strings become JSON `null`; anything
/// else is field-capped and returned as a JSON string.
fn nullable_capped(value: Option<&str>, field_cap: usize) -> Value {
    match value.map(str::trim) {
        Some(s) if !s.is_empty() => {
            let (capped, _) = truncate_field(s, field_cap);
            Value::String(capped)
        }
        _ => Value::Null,
    }
}

/// Converts a parsed [`trx::RawTrxReport`] into the `run` + `tests`
/// portion of a `completed` verdict. `field_cap` is applied to every
/// free-text field (messages, stack traces, captured stdout).
pub fn convert(report: &trx::RawTrxReport, field_cap: usize) -> (Value, Value) {
    let created_at = report.creation.as_deref().and_then(normalize_timestamp);
    let started_at = report.start.as_deref().and_then(normalize_timestamp);
    let finished_at = report.finish.as_deref().and_then(normalize_timestamp);

    let duration_ms = match (
        report.start.as_deref().and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok()),
        report.finish.as_deref().and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok()),
    ) {
        (Some(start), Some(finish)) => {
            let delta = finish.signed_duration_since(start).num_milliseconds();
            delta.max(0)
        }
        _ => 0,
    };

    let counters = &report.counters;
    let run = json!({
        "testRunId": nullable_capped(report.test_run_id.as_deref(), field_cap),
        "overallOutcome": normalize_outcome(report.overall_outcome.as_deref()),
        "createdAt": created_at,
        "startedAt": started_at,
        "finishedAt": finished_at,
        "durationMs": duration_ms,
        "counters": {
            "total": counters.total,
            "executed": counters.executed,
            "passed": counters.passed,
            "failed": counters.failed,
            "error": counters.error,
            "timeout": counters.timeout,
            "aborted": counters.aborted,
            "inconclusive": counters.inconclusive,
            "skipped": counters.not_executed,
        },
    });

    let tests: Vec<Value> = report
        .results
        .iter()
        .map(|result| {
            let definition = result
                .test_id
                .as_deref()
                .and_then(|id| report.test_definitions.get(id));

            let id = result
                .execution_id
                .clone()
                .or_else(|| result.test_id.clone())
                .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

            let name = result
                .test_name
                .as_deref()
                .or_else(|| definition.and_then(|d| d.fully_qualified_name.as_deref()));

            let duration_ms = result
                .duration
                .as_deref()
                .and_then(parse_duration_ms)
                .unwrap_or(0);

            let started_at = result.start_time.as_deref().and_then(normalize_timestamp);
            let finished_at = result.end_time.as_deref().and_then(normalize_timestamp);

            json!({
                "id": id,
                "name": nullable_capped(name, field_cap),
                "className": nullable_capped(definition.and_then(|d| d.class_name.as_deref()), field_cap),
                "fullyQualifiedName": nullable_capped(definition.and_then(|d| d.fully_qualified_name.as_deref()), field_cap),
                "outcome": normalize_outcome(result.outcome.as_deref()),
                "durationMs": duration_ms,
                "startedAt": started_at,
                "finishedAt": finished_at,
                "message": nullable_capped(result.message.as_deref(), field_cap),
                "stackTrace": nullable_capped(result.stack_trace.as_deref(), field_cap),
            })
        })
        .collect();

    (run, Value::Array(tests))
}

/// Extracts the sandbox's own captured stdout (`<ResultSummary>/<Output>/<StdOut>`),
/// field-capped, or `null` if the TRX carried none.
pub fn extract_stdout(report: &trx::RawTrxReport, field_cap: usize) -> Value {
    nullable_capped(report.stdout.as_deref(), field_cap)
}

/// Assembles a complete `completed` verdict document.
pub fn completed_verdict(submission_id: &str, report: &trx::RawTrxReport, trx_path: &str, field_cap: usize) -> Value {
    let (run, tests) = convert(report, field_cap);
    json!({
        "submissionId": submission_id,
        "status": "completed",
        "run": run,
        "tests": tests,
        "diagnostics": {
            "stdout": extract_stdout(report, field_cap),
            "stderr": Value::Null,
            "trxPath": trx_path,
            "note": Value::Null,
        },
    })
}
