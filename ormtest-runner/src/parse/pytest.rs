// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{DialectParser, ParsedResult, ResultCollector};
use ormtest_metadata::RawOutcome;
use regex::Regex;
use std::sync::LazyLock;

// A node ID: a path to a .py file, optionally followed by ::Class::test[params].
const NODE_ID: &str = r"(?P<id>\S+?\.py(?:::[^\s\[]+(?:\[[^\]]*\])?)*)";
const OUTCOME: &str = r"(?P<result>PASSED|FAILED|ERROR|SKIPPED|XFAIL|XPASS)";

// tests/test_x.py::test_y PASSED [ 50%]
// tests/test_x.py::test_z SKIPPED (no interval support) [ 75%]
static VERBOSE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^{NODE_ID} {OUTCOME}(?: \((?P<reason>.*)\)(?:\s+\[\s*\d+%\])?|\s.*)?$"
    ))
    .expect("verbose line regex is valid")
});

// FAILED tests/test_x.py::test_y - AssertionError: ...
static SUMMARY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^{OUTCOME} {NODE_ID}(?: - (?P<message>.*))?$"))
        .expect("summary line regex is valid")
});

// [gw0] [ 10%] PASSED tests/test_x.py::test_y
static XDIST_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[gw\d+\] \[\s*\d+%\] ").expect("xdist prefix regex is valid")
});

/// Parser for verbose pytest output.
///
/// Both the per-test progress lines and the `-rA` short test summary are
/// understood; summary lines carry a message that becomes the diagnostic, as
/// does the parenthesized reason on `SKIPPED` and `XFAIL` progress lines.
/// Collection errors (`ERROR tests/test_x.py - ...`) are reported under the
/// module path.
pub(super) struct PytestParser;

impl DialectParser for PytestParser {
    fn parse(&self, input: &str, collector: &mut ResultCollector) {
        for line in input.lines() {
            let line = line.trim_end();
            let line = match XDIST_PREFIX.find(line) {
                Some(prefix) => &line[prefix.end()..],
                None => line,
            };

            let (captures, from_summary) = if let Some(captures) = SUMMARY_LINE.captures(line) {
                (captures, true)
            } else if let Some(captures) = VERBOSE_LINE.captures(line) {
                (captures, false)
            } else {
                continue;
            };

            let id = &captures["id"];
            let message = captures
                .name("message")
                .or_else(|| captures.name("reason"))
                .map(|m| m.as_str().trim().to_owned())
                .filter(|message| !message.is_empty());

            // The short summary repeats a result already seen in the progress
            // lines; only its message is new.
            if from_summary && collector.contains(id) {
                if let Some(message) = message {
                    collector.attach_diagnostic(id, message);
                }
                continue;
            }

            let outcome = match &captures["result"] {
                "PASSED" | "XPASS" => RawOutcome::Pass,
                "FAILED" => RawOutcome::Fail,
                "ERROR" => RawOutcome::Error,
                // "SKIPPED" and "XFAIL"
                _ => RawOutcome::Skip,
            };
            let mut result = ParsedResult::new(id, outcome);
            result.diagnostic = message;
            collector.push(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{OutputDialect, parse_output};
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> Vec<ParsedResult> {
        parse_output(input, OutputDialect::Pytest)
            .expect("output parsed")
            .into_results()
    }

    #[test]
    fn verbose_run_with_short_summary() {
        let input = indoc! {"
            ============================= test session starts ==============================
            collected 6 items

            tests/test_pool.py::TestPool::test_acquire PASSED                        [ 16%]
            tests/test_pool.py::TestPool::test_release FAILED                        [ 33%]
            tests/test_codecs.py::test_numeric[1.5] PASSED                           [ 50%]
            tests/test_codecs.py::test_interval SKIPPED (no interval support)        [ 66%]
            tests/test_codecs.py::test_money XFAIL (money is lossy)                  [ 83%]
            tests/test_codecs.py::test_point XPASS                                   [100%]

            =========================== short test summary info ============================
            PASSED tests/test_pool.py::TestPool::test_acquire
            FAILED tests/test_pool.py::TestPool::test_release - AssertionError: assert 1 == 0
            ==================== 1 failed, 2 passed, 1 skipped, 1 xfailed, 1 xpassed in 0.12s ====
        "};

        assert_eq!(
            parse(input),
            vec![
                ParsedResult::new("tests/test_pool.py::TestPool::test_acquire", RawOutcome::Pass),
                ParsedResult::new("tests/test_pool.py::TestPool::test_release", RawOutcome::Fail)
                    .with_diagnostic("AssertionError: assert 1 == 0"),
                ParsedResult::new("tests/test_codecs.py::test_numeric[1.5]", RawOutcome::Pass),
                ParsedResult::new("tests/test_codecs.py::test_interval", RawOutcome::Skip)
                    .with_diagnostic("no interval support"),
                ParsedResult::new("tests/test_codecs.py::test_money", RawOutcome::Skip)
                    .with_diagnostic("money is lossy"),
                ParsedResult::new("tests/test_codecs.py::test_point", RawOutcome::Pass),
            ]
        );
    }

    #[test]
    fn skip_reasons_without_progress() {
        let input = indoc! {"
            tests/test_copy.py::test_copy_to SKIPPED (COPY TO (binary) is unsupported)
            tests/test_copy.py::test_copy_from PASSED
        "};

        assert_eq!(
            parse(input),
            vec![
                ParsedResult::new("tests/test_copy.py::test_copy_to", RawOutcome::Skip)
                    .with_diagnostic("COPY TO (binary) is unsupported"),
                ParsedResult::new("tests/test_copy.py::test_copy_from", RawOutcome::Pass),
            ]
        );
    }

    #[test]
    fn xdist_and_collection_errors() {
        let input = indoc! {"
            [gw0] [ 50%] PASSED tests/test_pool.py::test_acquire
            [gw1] [100%] FAILED tests/test_pool.py::test_release
            ERROR tests/test_listen.py - asyncpg.exceptions.FeatureNotSupportedError: LISTEN
        "};

        assert_eq!(
            parse(input),
            vec![
                ParsedResult::new("tests/test_pool.py::test_acquire", RawOutcome::Pass),
                ParsedResult::new("tests/test_pool.py::test_release", RawOutcome::Fail),
                ParsedResult::new("tests/test_listen.py", RawOutcome::Error)
                    .with_diagnostic("asyncpg.exceptions.FeatureNotSupportedError: LISTEN"),
            ]
        );
    }
}
