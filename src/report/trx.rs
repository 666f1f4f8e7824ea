//! Low-level parsing of the engine-native TRX (Visual Studio Test Results)
//! XML schema into plain Rust structs.
//!
//! This module only extracts data — outcome remapping, counter renaming,
//! duration rounding, and truncation all live in [`super`]. DTD
//! processing and external entity resolution are never enabled; quick-xml
//! does not support either by default, so a malicious `<!DOCTYPE ...>`
//! in a submission-controlled report simply fails to parse as one of the
//! elements we look for rather than being expanded.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;

/// The raw `<Counters>` attributes from `<ResultSummary>`, before the
/// `notExecuted` → `skipped` rename applied by the converter.
#[derive(Debug, Clone, Default)]
pub struct RawCounters {
    pub total: i64,
    pub executed: i64,
    pub passed: i64,
    pub failed: i64,
    pub error: i64,
    pub timeout: i64,
    pub aborted: i64,
    pub inconclusive: i64,
    pub not_executed: i64,
}

/// `className` / derived fully-qualified name for one `testId`, read
/// from `<TestDefinitions>/<UnitTest>/<TestMethod>`.
#[derive(Debug, Clone, Default)]
pub struct TestDefinition {
    pub class_name: Option<String>,
    pub fully_qualified_name: Option<String>,
}

/// One `<Results>/<UnitTestResult>` entry, with its nested
/// `<Output>/<ErrorInfo>` flattened in.
#[derive(Debug, Clone, Default)]
pub struct RawUnitTestResult {
    pub execution_id: Option<String>,
    pub test_id: Option<String>,
    pub test_name: Option<String>,
    pub outcome: Option<String>,
    pub duration: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub message: Option<String>,
    pub stack_trace: Option<String>,
}

/// Everything extracted from one `results.trx` document.
#[derive(Debug, Clone, Default)]
pub struct RawTrxReport {
    pub test_run_id: Option<String>,
    pub creation: Option<String>,
    pub start: Option<String>,
    pub finish: Option<String>,
    pub overall_outcome: Option<String>,
    pub counters: RawCounters,
    pub stdout: Option<String>,
    pub test_definitions: HashMap<String, TestDefinition>,
    pub results: Vec<RawUnitTestResult>,
}

/// Parses `xml` into a [`RawTrxReport`].
///
/// # Errors
///
/// Returns an error if the document is not well-formed XML. A
/// well-formed document that simply lacks the elements we look for
/// (e.g. an empty `<TestRun/>`) parses successfully into a
/// mostly-default report rather than erroring — schema laxness is
/// deliberate so the converter, not this parser, decides how to
/// normalize missing pieces.
pub fn parse(xml: &str) -> Result<RawTrxReport, String> {
    let mut reader = Reader::from_str(xml);

    let mut report = RawTrxReport::default();

    // Text-accumulation state for elements whose content we need, keyed
    // by which nested context we're currently inside.
    let mut in_stdout = false;
    let mut in_message = false;
    let mut in_stack_trace = false;
    let mut stdout_text = String::new();
    let mut message_text = String::new();
    let mut stack_trace_text = String::new();

    let mut current_result: Option<RawUnitTestResult> = None;
    let mut current_test_id: Option<String> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("XML syntax error: {e}"))?;

        match event {
            Event::Start(e) | Event::Empty(e) => {
                match e.name().as_ref() {
                    b"TestRun" => {
                        report.test_run_id = attr(&e, b"id");
                    }
                    b"Times" => {
                        report.creation = attr(&e, b"creation");
                        report.start = attr(&e, b"start");
                        report.finish = attr(&e, b"finish");
                    }
                    b"ResultSummary" => {
                        report.overall_outcome = attr(&e, b"outcome");
                    }
                    b"Counters" => {
                        report.counters = RawCounters {
                            total: attr_i64(&e, b"total"),
                            executed: attr_i64(&e, b"executed"),
                            passed: attr_i64(&e, b"passed"),
                            failed: attr_i64(&e, b"failed"),
                            error: attr_i64(&e, b"error"),
                            timeout: attr_i64(&e, b"timeout"),
                            aborted: attr_i64(&e, b"aborted"),
                            inconclusive: attr_i64(&e, b"inconclusive"),
                            not_executed: attr_i64(&e, b"notExecuted"),
                        };
                    }
                    b"StdOut" => {
                        in_stdout = true;
                        stdout_text.clear();
                    }
                    b"UnitTest" => {
                        current_test_id = attr(&e, b"id");
                    }
                    b"TestMethod" => {
                        if let Some(test_id) = current_test_id.clone() {
                            let class_name = attr(&e, b"className");
                            let method_name = attr(&e, b"name");
                            let fully_qualified_name = match (&class_name, &method_name) {
                                (Some(c), Some(m)) => Some(format!("{c}.{m}")),
                                (Some(c), None) => Some(c.clone()),
                                _ => None,
                            };
                            report.test_definitions.insert(
                                test_id,
                                TestDefinition {
                                    class_name,
                                    fully_qualified_name,
                                },
                            );
                        }
                    }
                    b"UnitTestResult" => {
                        current_result = Some(RawUnitTestResult {
                            execution_id: attr(&e, b"executionId"),
                            test_id: attr(&e, b"testId"),
                            test_name: attr(&e, b"testName"),
                            outcome: attr(&e, b"outcome"),
                            duration: attr(&e, b"duration"),
                            start_time: attr(&e, b"startTime"),
                            end_time: attr(&e, b"endTime"),
                            message: None,
                            stack_trace: None,
                        });
                    }
                    b"Message" => {
                        in_message = true;
                        message_text.clear();
                    }
                    b"StackTrace" => {
                        in_stack_trace = true;
                        stack_trace_text.clear();
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                let text = e.unescape().unwrap_or_default().into_owned();
                if in_stdout {
                    stdout_text.push_str(&text);
                }
                if in_message {
                    message_text.push_str(&text);
                }
                if in_stack_trace {
                    stack_trace_text.push_str(&text);
                }
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                if in_stdout {
                    stdout_text.push_str(&text);
                }
                if in_message {
                    message_text.push_str(&text);
                }
                if in_stack_trace {
                    stack_trace_text.push_str(&text);
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"StdOut" => {
                    in_stdout = false;
                    report.stdout = Some(std::mem::take(&mut stdout_text));
                }
                b"Message" => {
                    in_message = false;
                    if let Some(r) = current_result.as_mut() {
                        r.message = Some(std::mem::take(&mut message_text));
                    }
                }
                b"StackTrace" => {
                    in_stack_trace = false;
                    if let Some(r) = current_result.as_mut() {
                        r.stack_trace = Some(std::mem::take(&mut stack_trace_text));
                    }
                }
                b"UnitTest" => {
                    current_test_id = None;
                }
                b"UnitTestResult" => {
                    if let Some(r) = current_result.take() {
                        report.results.push(r);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(report)
}

fn attr(e: &quick_xml::events::BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .and_then(|a| String::from_utf8(a.value.to_vec()).ok())
}

fn attr_i64(e: &quick_xml::events::BytesStart, name: &[u8]) -> i64 {
    attr(e, name).and_then(|s| s.parse().ok()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<TestRun id="run-1" xmlns="http://microsoft.com/schemas/VisualStudio/TeamTest/2010">
  <Times creation="2024-01-01T00:00:00.0000000+00:00" start="2024-01-01T00:00:00.0000000+00:00" finish="2024-01-01T00:00:00.0200000+00:00" />
  <TestDefinitions>
    <UnitTest id="t1">
      <TestMethod className="Suite.MathTests" name="AddsTwoNumbers" />
    </UnitTest>
  </TestDefinitions>
  <Results>
    <UnitTestResult executionId="e1" testId="t1" testName="AddsTwoNumbers" outcome="Passed" duration="00:00:00.0200070" startTime="2024-01-01T00:00:00.0000000+00:00" endTime="2024-01-01T00:00:00.0200000+00:00">
      <Output>
        <StdOut>ok</StdOut>
      </Output>
    </UnitTestResult>
  </Results>
  <ResultSummary outcome="Passed">
    <Counters total="1" executed="1" passed="1" failed="0" error="0" timeout="0" aborted="0" inconclusive="0" notExecuted="0" />
    <Output>
      <StdOut>build succeeded</StdOut>
    </Output>
  </ResultSummary>
</TestRun>"#;

    #[test]
    fn parses_run_metadata() {
        let report = parse(SAMPLE).unwrap();
        assert_eq!(report.test_run_id.as_deref(), Some("run-1"));
        assert_eq!(report.overall_outcome.as_deref(), Some("Passed"));
        assert_eq!(report.counters.total, 1);
        assert_eq!(report.counters.passed, 1);
    }

    #[test]
    fn parses_test_definitions_and_results() {
        let report = parse(SAMPLE).unwrap();
        let def = report.test_definitions.get("t1").unwrap();
        assert_eq!(def.class_name.as_deref(), Some("Suite.MathTests"));
        assert_eq!(def.fully_qualified_name.as_deref(), Some("Suite.MathTests.AddsTwoNumbers"));

        assert_eq!(report.results.len(), 1);
        let result = &report.results[0];
        assert_eq!(result.test_id.as_deref(), Some("t1"));
        assert_eq!(result.outcome.as_deref(), Some("Passed"));
        assert_eq!(result.duration.as_deref(), Some("00:00:00.0200070"));
    }

    #[test]
    fn parses_failure_with_stack_trace() {
        let xml = r#"<TestRun id="r">
  <Results>
    <UnitTestResult executionId="e1" testId="t1" testName="Fails" outcome="Failed" duration="00:00:00.0100000">
      <Output>
        <ErrorInfo>
          <Message>Expected 7 but was 1</Message>
          <StackTrace>at Suite.Fails() in /src/tests.cs:line 10</StackTrace>
        </ErrorInfo>
      </Output>
    </UnitTestResult>
  </Results>
</TestRun>"#;
        let report = parse(xml).unwrap();
        let result = &report.results[0];
        assert_eq!(result.message.as_deref(), Some("Expected 7 but was 1"));
        assert!(result.stack_trace.as_deref().unwrap().contains("line 10"));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        let err = parse("<TestRun><unterminated>").unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn empty_testrun_parses_to_defaults() {
        let report = parse("<TestRun/>").unwrap();
        assert_eq!(report.counters.total, 0);
        assert!(report.results.is_empty());
    }
}
