// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing captured test-runner output into test results.
//!
//! Upstream suites are run with whatever runner they ship with, so their
//! output comes in several textual dialects. Each dialect is handled by a
//! [`DialectParser`]; [`parse_output`] selects the parser for an
//! [`OutputDialect`] and applies the common rules:
//!
//! * ANSI escape sequences are stripped before parsing.
//! * Parsing is line-oriented and tolerant: lines that aren't recognized are
//!   skipped.
//! * If a test is reported more than once, it keeps the position of its first
//!   report and the outcome of its last.
//! * Non-blank output that yields no results at all is a
//!   [`ParseFormatError`].

mod libtest;
mod pytest;
mod python_unittest;
mod tap;

use crate::errors::{OutputDialectParseError, ParseFormatError};
use indexmap::{IndexMap, map::Entry};
use ormtest_metadata::{RawOutcome, TestIdentifier};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The textual format a test runner reports results in.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(test, derive(test_strategy::Arbitrary))]
pub enum OutputDialect {
    /// Verbose output from Python's `unittest` runner, for example
    /// `test_copy (tests.test_copy.TestCopy) ... ok`.
    PythonUnittest,

    /// Output from Rust's libtest harness, for example
    /// `test pool::tests::acquire ... ok`.
    Libtest,

    /// Verbose output from pytest, with or without the `-rA` short summary.
    Pytest,

    /// Verbose output from `go test -v`, for example
    /// `--- FAIL: TestConn (0.01s)`.
    GoTest,

    /// The Test Anything Protocol, as emitted by node-tap, mocha's TAP
    /// reporter and prove.
    Tap,
}

impl OutputDialect {
    /// All known dialects.
    pub const ALL: [OutputDialect; 5] = [
        OutputDialect::PythonUnittest,
        OutputDialect::Libtest,
        OutputDialect::Pytest,
        OutputDialect::GoTest,
        OutputDialect::Tap,
    ];

    /// Returns the names of all known dialects.
    pub fn variants() -> Vec<&'static str> {
        Self::ALL.iter().map(|dialect| dialect.as_str()).collect()
    }

    /// Returns the name of this dialect, as used in configuration and on the
    /// command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PythonUnittest => "python-unittest",
            Self::Libtest => "libtest",
            Self::Pytest => "pytest",
            Self::GoTest => "go-test",
            Self::Tap => "tap",
        }
    }

    /// Returns the parser for this dialect.
    pub fn parser(self) -> &'static dyn DialectParser {
        match self {
            Self::PythonUnittest => &python_unittest::PythonUnittestParser,
            Self::Libtest => &libtest::LibtestParser,
            Self::Pytest => &pytest::PytestParser,
            Self::GoTest => &go_test::GoTestParser,
            Self::Tap => &tap::TapParser,
        }
    }
}

impl fmt::Display for OutputDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputDialect {
    type Err = OutputDialectParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|dialect| dialect.as_str() == s)
            .ok_or_else(|| OutputDialectParseError::new(s))
    }
}

/// A parsing strategy for one [`OutputDialect`].
///
/// Implementations must not fail: lines that aren't understood are skipped.
pub trait DialectParser: Send + Sync {
    /// Parses `input`, reporting every result found to `collector` in the
    /// order it appears.
    ///
    /// `input` has already had ANSI escapes stripped.
    fn parse(&self, input: &str, collector: &mut ResultCollector);
}

/// A single test result extracted from runner output.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParsedResult {
    /// The test identifier.
    pub id: TestIdentifier,

    /// The outcome reported by the runner.
    pub outcome: RawOutcome,

    /// Diagnostic text reported alongside the outcome: a failure message,
    /// a traceback excerpt or a skip reason.
    pub diagnostic: Option<String>,
}

impl ParsedResult {
    /// Creates a new result with no diagnostic.
    pub fn new(id: impl Into<TestIdentifier>, outcome: RawOutcome) -> Self {
        Self {
            id: id.into(),
            outcome,
            diagnostic: None,
        }
    }

    /// Attaches a diagnostic to this result.
    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }
}

/// Accumulates results while a [`DialectParser`] runs.
///
/// Enforces the one-result-per-identifier rule: a repeated identifier updates
/// the existing result in place.
#[derive(Debug, Default)]
pub struct ResultCollector {
    results: IndexMap<TestIdentifier, ParsedResult>,
    duplicates: usize,
}

impl ResultCollector {
    /// Creates a new, empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a result.
    ///
    /// If the test was already reported, the later outcome wins and the
    /// diagnostic is replaced only if a new one is provided.
    pub fn push(&mut self, result: ParsedResult) {
        match self.results.entry(result.id.clone()) {
            Entry::Occupied(mut entry) => {
                self.duplicates += 1;
                let existing = entry.get_mut();
                tracing::debug!(
                    test = %existing.id,
                    previous = %existing.outcome,
                    current = %result.outcome,
                    "test reported more than once, keeping the last outcome",
                );
                existing.outcome = result.outcome;
                if result.diagnostic.is_some() {
                    existing.diagnostic = result.diagnostic;
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(result);
            }
        }
    }

    /// Attaches a diagnostic to an already-reported test.
    ///
    /// Returns false if the test hasn't been reported.
    pub fn attach_diagnostic(&mut self, id: &str, diagnostic: impl Into<String>) -> bool {
        match self.results.get_mut(id) {
            Some(result) => {
                result.diagnostic = Some(diagnostic.into());
                true
            }
            None => false,
        }
    }

    /// Returns true if the test has already been reported.
    pub fn contains(&self, id: &str) -> bool {
        self.results.contains_key(id)
    }

    fn finish(self, dialect: OutputDialect) -> ParsedOutput {
        ParsedOutput {
            dialect,
            results: self.results.into_values().collect(),
            duplicates: self.duplicates,
        }
    }
}

/// The results extracted from one captured output blob.
#[derive(Clone, Debug)]
pub struct ParsedOutput {
    dialect: OutputDialect,
    results: Vec<ParsedResult>,
    duplicates: usize,
}

impl ParsedOutput {
    /// Returns the dialect the output was parsed with.
    pub fn dialect(&self) -> OutputDialect {
        self.dialect
    }

    /// Returns the results, in the order the runner first reported them.
    pub fn results(&self) -> &[ParsedResult] {
        &self.results
    }

    /// Returns the number of distinct tests found.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns true if no tests were found.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Returns the number of result lines that repeated an earlier test.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Consumes self, returning the results.
    pub fn into_results(self) -> Vec<ParsedResult> {
        self.results
    }
}

/// Parses captured runner output in the given dialect.
///
/// Empty or whitespace-only input produces an empty result set. Any other
/// input must produce at least one result.
pub fn parse_output(input: &str, dialect: OutputDialect) -> Result<ParsedOutput, ParseFormatError> {
    let input = strip_ansi_escapes::strip_str(input);
    let mut collector = ResultCollector::new();
    if input.trim().is_empty() {
        return Ok(collector.finish(dialect));
    }

    dialect.parser().parse(&input, &mut collector);
    let output = collector.finish(dialect);
    if output.is_empty() {
        return Err(ParseFormatError::new(dialect, &input));
    }

    tracing::debug!(
        %dialect,
        tests = output.len(),
        duplicates = output.duplicates(),
        "parsed test output",
    );
    Ok(output)
}

/// Collects the lines following `lines[start]` that are indented more deeply
/// than `base_indent`, stopping at the first line that isn't.
///
/// Blank lines are kept if more indented lines follow them. Returns the
/// dedented text (or `None` if there were no such lines) and the index of the
/// first line not consumed.
fn collect_indented(lines: &[&str], start: usize, base_indent: usize) -> (Option<String>, usize) {
    let mut end = start;
    let mut last_content = start;
    while end < lines.len() {
        let line = lines[end];
        if line.trim().is_empty() {
            end += 1;
            continue;
        }
        if indent_of(line) <= base_indent {
            break;
        }
        end += 1;
        last_content = end;
    }

    let block = &lines[start..last_content];
    if block.is_empty() {
        return (None, start);
    }
    let min_indent = block
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| indent_of(line))
        .min()
        .unwrap_or(0);
    let text = block
        .iter()
        .map(|line| line.get(min_indent..).unwrap_or("").trim_end())
        .collect::<Vec<_>>()
        .join("\n");
    (Some(text), last_content)
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}
