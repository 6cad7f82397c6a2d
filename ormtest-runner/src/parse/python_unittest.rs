// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{DialectParser, ParsedResult, ResultCollector};
use ormtest_metadata::{RawOutcome, TestIdentifier};
use regex::Regex;
use std::sync::LazyLock;

// test_name (module.Class) ... result ['reason']
static RESULT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<name>\S+?)(?: \((?P<class>[^()\s]+)\))? \.\.\. (?P<result>ok|FAIL|FAILED|ERROR|skipped|expected failure|unexpected success)(?P<reason>\s.*)?$",
    )
    .expect("result line regex is valid")
});

// FAIL: test_name (module.Class) [subtest description]
static BLOCK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<kind>FAIL|ERROR): (?P<name>\S+) \((?P<class>[^()\s]+)\)(?:\s.*)?$")
        .expect("block header regex is valid")
});

static SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:={20,}|-{20,})$").expect("separator regex is valid"));

static BLOCK_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^={20,}$").expect("block rule regex is valid"));

/// Names reported in failure blocks for errors outside any single test.
const FIXTURE_NAMES: &[&str] = &["setUpClass", "tearDownClass", "setUpModule", "tearDownModule"];

// Import errors are reported as tests of this class.
const LOADER_FAILURE_CLASS: &str = "unittest.loader._FailedTest";

/// Parser for Python `unittest` verbose output.
///
/// Besides the per-test result lines, the failure and error blocks printed at
/// the end of the run are attached to their tests as diagnostics. A block
/// header is only recognized directly below a `=====` rule. A block for a
/// class or module fixture (for example a failing `setUpClass`) or for a
/// module that failed to import is recorded as a result of its own.
pub(super) struct PythonUnittestParser;

impl DialectParser for PythonUnittestParser {
    fn parse(&self, input: &str, collector: &mut ResultCollector) {
        let lines: Vec<&str> = input.lines().collect();
        let mut idx = 0;
        while idx < lines.len() {
            let after_rule = idx > 0 && BLOCK_RULE.is_match(lines[idx - 1].trim_end());
            let line = lines[idx].trim_end();
            idx += 1;

            if let Some(captures) = RESULT_LINE.captures(line) {
                let id = test_identifier(&captures["name"], captures.name("class").map(|m| m.as_str()));
                let (outcome, reason) = match &captures["result"] {
                    "ok" | "unexpected success" => (RawOutcome::Pass, None),
                    "FAIL" | "FAILED" => (RawOutcome::Fail, None),
                    "ERROR" => (RawOutcome::Error, None),
                    // "skipped" and "expected failure"
                    _ => (
                        RawOutcome::Skip,
                        captures.name("reason").and_then(|m| unquote_reason(m.as_str())),
                    ),
                };
                let mut result = ParsedResult::new(id, outcome);
                result.diagnostic = reason;
                collector.push(result);
                continue;
            }

            if !after_rule {
                continue;
            }
            if let Some(captures) = BLOCK_HEADER.captures(line) {
                let name = &captures["name"];
                let class = &captures["class"];
                let id = test_identifier(name, Some(class));
                // The header is followed by a dashed rule, then the traceback.
                if lines.get(idx).is_some_and(|next| SEPARATOR.is_match(next.trim_end())) {
                    idx += 1;
                }
                let start = idx;
                while idx < lines.len() && !is_block_end(lines[idx]) {
                    idx += 1;
                }
                let body = lines[start..idx].join("\n");
                let body = body.trim();
                let diagnostic = (!body.is_empty()).then(|| body.to_owned());

                let attached = match &diagnostic {
                    Some(text) => collector.attach_diagnostic(id.as_str(), text.as_str()),
                    None => collector.contains(id.as_str()),
                };
                if !attached && !records_own_result(name, class) {
                    tracing::debug!(test = %id, "failure block for a test with no result line, skipping");
                } else if !attached {
                    let outcome = if &captures["kind"] == "FAIL" {
                        RawOutcome::Fail
                    } else {
                        RawOutcome::Error
                    };
                    let mut result = ParsedResult::new(id, outcome);
                    result.diagnostic = diagnostic;
                    collector.push(result);
                }
            }
        }
    }
}

/// Builds the identifier for a test.
///
/// Python 3.11 and later print the fully qualified test name in parentheses,
/// which is used as-is. Older versions print the class, and the method name is
/// appended to it.
fn test_identifier(name: &str, class: Option<&str>) -> TestIdentifier {
    match class {
        Some(class) if class.ends_with(name) && class[..class.len() - name.len()].ends_with('.') => {
            TestIdentifier::new(class)
        }
        Some(class) => TestIdentifier::new(format!("{class}.{name}")),
        None => TestIdentifier::new(name),
    }
}

/// Extracts a skip reason from `'reason'`, `u'reason'` or `"reason"`.
fn unquote_reason(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let raw = raw.strip_prefix('u').filter(|rest| rest.starts_with(['\'', '"'])).unwrap_or(raw);
    let unquoted = ['\'', '"']
        .into_iter()
        .find_map(|quote| raw.strip_prefix(quote)?.strip_suffix(quote))
        .unwrap_or(raw);
    (!unquoted.is_empty()).then(|| unquoted.to_owned())
}

fn records_own_result(name: &str, class: &str) -> bool {
    FIXTURE_NAMES.contains(&name) || class.starts_with(LOADER_FAILURE_CLASS)
}

fn is_block_end(line: &str) -> bool {
    let line = line.trim_end();
    SEPARATOR.is_match(line)
        || RESULT_LINE.is_match(line)
        || (line.starts_with("Ran ") && line.contains(" test"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{OutputDialect, parse_output};
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn parse(input: &str) -> Vec<ParsedResult> {
        parse_output(input, OutputDialect::PythonUnittest)
            .expect("output parsed")
            .into_results()
    }

    #[test]
    fn verbose_run_with_failure_blocks() {
        let input = indoc! {"
            test_copy_from_table_basics (tests.test_copy.TestCopyFrom) ... ok
            test_listen_01 (tests.test_listeners.TestListeners) ... ERROR
            test_pool_01 (tests.test_pool.TestPool) ... FAIL
            test_ssl_connection (tests.test_connect.TestSSL) ... skipped 'no SSL support'
            test_decode (tests.test_codecs.TestCodecs) ... expected failure
            test_encode (tests.test_codecs.TestCodecs) ... unexpected success

            ======================================================================
            ERROR: test_listen_01 (tests.test_listeners.TestListeners)
            ----------------------------------------------------------------------
            Traceback (most recent call last):
              File \"tests/test_listeners.py\", line 31, in test_listen_01
                await con.add_listener('12+\"34', listener1)
            asyncpg.exceptions.FeatureNotSupportedError: unimplemented: LISTEN

            ======================================================================
            FAIL: test_pool_01 (tests.test_pool.TestPool)
            ----------------------------------------------------------------------
            Traceback (most recent call last):
            AssertionError: 1 != 2

            ----------------------------------------------------------------------
            Ran 6 tests in 0.512s

            FAILED (failures=1, errors=1, skipped=1, expected failures=1, unexpected successes=1)
        "};

        assert_eq!(
            parse(input),
            vec![
                ParsedResult::new("tests.test_copy.TestCopyFrom.test_copy_from_table_basics", RawOutcome::Pass),
                ParsedResult::new("tests.test_listeners.TestListeners.test_listen_01", RawOutcome::Error)
                    .with_diagnostic(indoc! {"
                        Traceback (most recent call last):
                          File \"tests/test_listeners.py\", line 31, in test_listen_01
                            await con.add_listener('12+\"34', listener1)
                        asyncpg.exceptions.FeatureNotSupportedError: unimplemented: LISTEN"}),
                ParsedResult::new("tests.test_pool.TestPool.test_pool_01", RawOutcome::Fail)
                    .with_diagnostic("Traceback (most recent call last):\nAssertionError: 1 != 2"),
                ParsedResult::new("tests.test_connect.TestSSL.test_ssl_connection", RawOutcome::Skip)
                    .with_diagnostic("no SSL support"),
                ParsedResult::new("tests.test_codecs.TestCodecs.test_decode", RawOutcome::Skip),
                ParsedResult::new("tests.test_codecs.TestCodecs.test_encode", RawOutcome::Pass),
            ]
        );
    }

    #[test]
    fn bare_names() {
        let input = "test_a ... ok\ntest_b ... FAILED\ntest_c ... skipped\n";
        assert_eq!(
            parse(input),
            vec![
                ParsedResult::new("test_a", RawOutcome::Pass),
                ParsedResult::new("test_b", RawOutcome::Fail),
                ParsedResult::new("test_c", RawOutcome::Skip),
            ]
        );
    }

    #[test]
    fn fully_qualified_names() {
        let input = "test_pool_01 (tests.test_pool.TestPool.test_pool_01) ... ok\n";
        assert_eq!(
            parse(input),
            vec![ParsedResult::new("tests.test_pool.TestPool.test_pool_01", RawOutcome::Pass)]
        );
    }

    #[test]
    fn failing_class_setup_is_recorded() {
        let input = indoc! {"
            test_a (tests.test_x.TestX) ... ok
            ======================================================================
            ERROR: setUpClass (tests.test_y.TestY)
            ----------------------------------------------------------------------
            ConnectionRefusedError: [Errno 111] Connection refused
            ----------------------------------------------------------------------
            Ran 1 test in 0.010s
        "};
        assert_eq!(
            parse(input),
            vec![
                ParsedResult::new("tests.test_x.TestX.test_a", RawOutcome::Pass),
                ParsedResult::new("tests.test_y.TestY.setUpClass", RawOutcome::Error)
                    .with_diagnostic("ConnectionRefusedError: [Errno 111] Connection refused"),
            ]
        );
    }

    #[test_case("'no SSL'", Some("no SSL") ; "single quoted")]
    #[test_case("u'no SSL'", Some("no SSL") ; "unicode prefix")]
    #[test_case("\"no SSL\"", Some("no SSL") ; "double quoted")]
    #[test_case("unquoted reason", Some("unquoted reason") ; "unquoted")]
    #[test_case("''", None ; "empty")]
    fn skip_reasons(raw: &str, expected: Option<&str>) {
        assert_eq!(unquote_reason(raw).as_deref(), expected);
    }

    #[test_case("test_x", Some("m.C"), "m.C.test_x" ; "class form")]
    #[test_case("test_x", Some("m.C.test_x"), "m.C.test_x" ; "qualified form")]
    #[test_case("test_x", Some("m.Ctest_x"), "m.Ctest_x.test_x" ; "suffix without dot")]
    #[test_case("test_x", None, "test_x" ; "bare")]
    fn identifiers(name: &str, class: Option<&str>, expected: &str) {
        assert_eq!(test_identifier(name, class).as_str(), expected);
    }

    #[test]
    fn noise_is_skipped() {
        let input = indoc! {"
            Collecting asyncpg
            test_a (m.C) ... ok
            some log line ... with dots
            OK
        "};
        assert_eq!(parse(input), vec![ParsedResult::new("m.C.test_a", RawOutcome::Pass)]);
    }

    #[test]
    fn log_lines_that_look_like_block_headers() {
        let input = indoc! {"
            test_a (m.C) ... ok
            ERROR: Could not install packages due to an OSError
            test_b (m.C) ... FAIL
            FAIL: test_c (m.C) was retried
            test_c (m.C) ... ok
        "};
        assert_eq!(
            parse(input),
            vec![
                ParsedResult::new("m.C.test_a", RawOutcome::Pass),
                ParsedResult::new("m.C.test_b", RawOutcome::Fail),
                ParsedResult::new("m.C.test_c", RawOutcome::Pass),
            ]
        );
    }

    #[test]
    fn blocks_stop_at_result_lines() {
        let input = indoc! {"
            ======================================================================
            ERROR: test_x (m.C)
            ----------------------------------------------------------------------
            Traceback (most recent call last):
            ValueError: bad
            test_y (m.D) ... ok
        "};
        // No result line for test_x, and it isn't a fixture.
        assert_eq!(parse(input), vec![ParsedResult::new("m.D.test_y", RawOutcome::Pass)]);
    }

    #[test]
    fn import_failures_are_recorded() {
        let input = indoc! {"
            ======================================================================
            ERROR: tests.test_copy (unittest.loader._FailedTest.tests.test_copy)
            ----------------------------------------------------------------------
            ImportError: Failed to import test module: tests.test_copy
            ----------------------------------------------------------------------
            Ran 1 test in 0.001s
        "};
        assert_eq!(
            parse(input),
            vec![
                ParsedResult::new("unittest.loader._FailedTest.tests.test_copy", RawOutcome::Error)
                    .with_diagnostic("ImportError: Failed to import test module: tests.test_copy"),
            ]
        );
    }
}
