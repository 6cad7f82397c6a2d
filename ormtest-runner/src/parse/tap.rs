// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{DialectParser, ParsedResult, ResultCollector, collect_indented, indent_of};
use ormtest_metadata::RawOutcome;
use regex::Regex;
use std::sync::LazyLock;

// ok 3 - description # SKIP reason
static TEST_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?P<status>not ok|ok)(?:\s+(?P<number>\d+))?(?:\s+-)?(?:\s+(?P<description>[^#]*?))?\s*(?:#\s*(?P<directive>(?i:skip|todo))\S*(?:\s+(?P<reason>.*))?)?$",
    )
    .expect("test line regex is valid")
});

static SUBTEST_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*# Subtest:\s*(?P<name>.+?)$").expect("subtest comment regex is valid")
});

/// Separates the names of enclosing subtests in a test identifier.
const SUBTEST_SEPARATOR: &str = " > ";

/// Parser for the Test Anything Protocol.
///
/// `# SKIP` directives are skips. `# TODO` tests don't count toward failure
/// in TAP, so a failing TODO is a skip and a passing one is a pass. The YAML
/// diagnostic block (or indented text) following a `not ok` line becomes its
/// diagnostic.
///
/// Test points inside a `# Subtest: name` block are identified by the path of
/// enclosing subtest names, as in `pool > connects`. Both the TAP 14 layout
/// (comment indented with the subtest's children) and node's layout (comment
/// at the parent's indentation, closed by a test point with the same name)
/// are understood.
pub(super) struct TapParser;

impl DialectParser for TapParser {
    fn parse(&self, input: &str, collector: &mut ResultCollector) {
        let lines: Vec<&str> = input.lines().collect();
        let mut subtests = SubtestStack::default();
        let mut idx = 0;
        while idx < lines.len() {
            let line = lines[idx].trim_end();
            idx += 1;

            if let Some(captures) = SUBTEST_COMMENT.captures(line) {
                subtests.open(indent_of(line), &captures["name"]);
                continue;
            }

            let Some(captures) = TEST_LINE.captures(line) else {
                continue;
            };
            let description = captures
                .name("description")
                .map(|m| m.as_str().trim())
                .filter(|description| !description.is_empty());
            let Some(name) = description.or_else(|| captures.name("number").map(|m| m.as_str())) else {
                continue;
            };
            let name = subtests.qualify(indent_of(line), name);

            let passed = &captures["status"] == "ok";
            let directive = captures.name("directive").map(|m| m.as_str().to_ascii_lowercase());
            let reason = captures
                .name("reason")
                .map(|m| m.as_str().trim().to_owned())
                .filter(|reason| !reason.is_empty());

            let mut result = match (directive.as_deref(), passed) {
                (Some("skip"), _) | (Some(_), false) => {
                    let mut result = ParsedResult::new(name, RawOutcome::Skip);
                    result.diagnostic = reason;
                    result
                }
                (_, true) => ParsedResult::new(name, RawOutcome::Pass),
                (None, false) => ParsedResult::new(name, RawOutcome::Fail),
            };

            if result.outcome == RawOutcome::Fail {
                let (diagnostic, next) = collect_diagnostic(&lines, idx, indent_of(line));
                result.diagnostic = diagnostic;
                idx = next;
            }
            collector.push(result);
        }
    }
}

/// The `# Subtest:` blocks enclosing the current line.
#[derive(Debug, Default)]
struct SubtestStack {
    // (comment indentation, subtest name)
    open: Vec<(usize, String)>,
}

impl SubtestStack {
    fn open(&mut self, indent: usize, name: &str) {
        self.open.push((indent, name.to_owned()));
    }

    /// Closes the subtests a test point at `indent` ends and returns its
    /// qualified name.
    fn qualify(&mut self, indent: usize, name: &str) -> String {
        let before = self.open.len();
        while self.open.last().is_some_and(|(open_indent, _)| *open_indent > indent) {
            self.open.pop();
        }
        if self.open.len() == before
            && self
                .open
                .last()
                .is_some_and(|(open_indent, open_name)| *open_indent == indent && open_name == name)
        {
            self.open.pop();
        }

        let mut qualified = String::new();
        for (_, parent) in &self.open {
            qualified.push_str(parent);
            qualified.push_str(SUBTEST_SEPARATOR);
        }
        qualified.push_str(name);
        qualified
    }
}

/// Collects the diagnostic following a failing test line: either a YAML block
/// delimited by `---` and `...`, or more deeply indented text.
fn collect_diagnostic(lines: &[&str], start: usize, test_indent: usize) -> (Option<String>, usize) {
    let Some(first) = lines.get(start) else {
        return (None, start);
    };
    if first.trim() == "---" && indent_of(first) > test_indent {
        let body_start = start + 1;
        let body_end = lines[body_start..]
            .iter()
            .position(|line| line.trim() == "...")
            .map_or(lines.len(), |offset| body_start + offset);
        let (text, _) = collect_indented(&lines[..body_end], body_start, test_indent);
        // Skip the closing `...` as well.
        return (text, (body_end + 1).min(lines.len()));
    }

    let end = lines[start..]
        .iter()
        .position(|line| {
            let line = line.trim_end();
            TEST_LINE.is_match(line) || SUBTEST_COMMENT.is_match(line)
        })
        .map_or(lines.len(), |offset| start + offset);
    collect_indented(&lines[..end], start, test_indent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{OutputDialect, parse_output};
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> Vec<ParsedResult> {
        parse_output(input, OutputDialect::Tap)
            .expect("output parsed")
            .into_results()
    }

    #[test]
    fn tap_with_directives_and_yaml() {
        let input = indoc! {"
            TAP version 13
            1..5
            ok 1 - connects to the server
            not ok 2 - decodes intervals
              ---
              message: 'expected 1 day'
              severity: fail
              ...
            ok 3 - uses SSL # SKIP no certificates
            not ok 4 - listens for notifications # TODO LISTEN is unsupported
            ok 5
            # tests 5
        "};

        assert_eq!(
            parse(input),
            vec![
                ParsedResult::new("connects to the server", RawOutcome::Pass),
                ParsedResult::new("decodes intervals", RawOutcome::Fail)
                    .with_diagnostic("message: 'expected 1 day'\nseverity: fail"),
                ParsedResult::new("uses SSL", RawOutcome::Skip).with_diagnostic("no certificates"),
                ParsedResult::new("listens for notifications", RawOutcome::Skip)
                    .with_diagnostic("LISTEN is unsupported"),
                ParsedResult::new("5", RawOutcome::Pass),
            ]
        );
    }

    #[test]
    fn mocha_style_indented_errors() {
        let input = indoc! {"
            1..2
            not ok 1 pool releases connections
              AssertionError: expected 1 to equal 0
                  at Context.<anonymous> (test/pool.js:20:12)
            ok 2 pool acquires connections
        "};

        assert_eq!(
            parse(input),
            vec![
                ParsedResult::new("pool releases connections", RawOutcome::Fail).with_diagnostic(
                    "AssertionError: expected 1 to equal 0\n    at Context.<anonymous> (test/pool.js:20:12)"
                ),
                ParsedResult::new("pool acquires connections", RawOutcome::Pass),
            ]
        );
    }

    #[test]
    fn tap14_subtests_with_shared_names() {
        let input = indoc! {"
            TAP version 14
                # Subtest: pool
                1..1
                not ok 1 - connects
                  ---
                  message: 'pool exhausted'
                  ...
            not ok 1 - pool
                # Subtest: client
                1..1
                ok 1 - connects
            ok 2 - client
            1..2
        "};

        assert_eq!(
            parse(input),
            vec![
                ParsedResult::new("pool > connects", RawOutcome::Fail)
                    .with_diagnostic("message: 'pool exhausted'"),
                ParsedResult::new("pool", RawOutcome::Fail),
                ParsedResult::new("client > connects", RawOutcome::Pass),
                ParsedResult::new("client", RawOutcome::Pass),
            ]
        );
    }

    #[test]
    fn node_subtests() {
        let input = indoc! {"
            TAP version 13
            # Subtest: pool
                # Subtest: connects
                not ok 1 - connects
                # Subtest: releases
                ok 2 - releases
                1..2
            not ok 1 - pool
            # Subtest: client
                # Subtest: connects
                ok 1 - connects
                1..1
            ok 2 - client
            1..2
        "};

        assert_eq!(
            parse(input),
            vec![
                ParsedResult::new("pool > connects", RawOutcome::Fail),
                ParsedResult::new("pool > releases", RawOutcome::Pass),
                ParsedResult::new("pool", RawOutcome::Fail),
                ParsedResult::new("client > connects", RawOutcome::Pass),
                ParsedResult::new("client", RawOutcome::Pass),
            ]
        );
    }

    #[test]
    fn lowercase_skip_directive() {
        let results = parse("ok 1 - copies rows # skip\n");
        assert_eq!(results, vec![ParsedResult::new("copies rows", RawOutcome::Skip)]);
    }
}
