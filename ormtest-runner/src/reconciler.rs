// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classifying parsed results against expectations.

use crate::{
    errors::ReconcileError,
    expectations::{Expectation, SuiteExpectations},
    parse::{OutputDialect, ParsedResult, parse_output},
    reporter::RunReport,
};
use ormtest_metadata::{RawOutcome, TestIdentifier, Verdict};
use std::collections::HashSet;

/// The inputs to a single reconciliation.
#[derive(Clone, Copy, Debug)]
pub struct ReconcileInput<'a> {
    /// Captured runner output: stdout and stderr, combined.
    pub raw_output: &'a str,

    /// The dialect to parse the output with. If `None`, the suite's
    /// configured dialect is used.
    pub dialect: Option<OutputDialect>,

    /// The raw database version string.
    pub database_version: &'a str,

    /// The upstream release tag that was tested.
    pub upstream_tag: &'a str,
}

/// One parsed result along with its verdict.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClassifiedResult {
    /// The test identifier.
    pub id: TestIdentifier,

    /// The outcome reported by the runner.
    pub outcome: RawOutcome,

    /// The verdict.
    pub verdict: Verdict,

    /// The blocklist or ignorelist reason that applied, if any.
    pub reason: Option<String>,

    /// Diagnostic text from the runner output.
    pub diagnostic: Option<String>,
}

/// Classifies one outcome against its expectation.
///
/// The ignorelist is checked first and is exclusive. Skips are then excluded
/// from judgment, and finally the blocklist decides between expected and
/// unexpected outcomes.
pub fn classify(outcome: RawOutcome, expectation: Expectation<'_>) -> Verdict {
    match (expectation, outcome) {
        (Expectation::Ignored { .. }, _) => Verdict::Ignored,
        (_, RawOutcome::Skip) => Verdict::Skipped,
        (Expectation::KnownFailure { .. }, RawOutcome::Pass) => Verdict::UnexpectedPass,
        (Expectation::KnownFailure { .. }, RawOutcome::Fail | RawOutcome::Error) => {
            Verdict::ExpectedFailure
        }
        (Expectation::Pass, RawOutcome::Pass) => Verdict::ExpectedPass,
        (Expectation::Pass, RawOutcome::Fail | RawOutcome::Error) => Verdict::Regression,
    }
}

/// Parses captured output for a suite and classifies every result.
///
/// Fails without producing a partial report if the versions can't be
/// resolved to an expectation scope or the output can't be parsed.
pub fn reconcile(
    suite: &SuiteExpectations,
    input: &ReconcileInput<'_>,
) -> Result<RunReport, ReconcileError> {
    let key = suite.resolve_key(input.database_version, input.upstream_tag)?;
    let scope = suite.resolve_scope(&key)?;
    let dialect = input.dialect.unwrap_or(suite.dialect());

    let parsed = parse_output(input.raw_output, dialect)?;
    let parsed_count = parsed.len();

    let mut seen = HashSet::with_capacity(parsed_count);
    let mut results = Vec::with_capacity(parsed_count);
    let mut blocklisted_skips = Vec::new();
    for ParsedResult {
        id,
        outcome,
        diagnostic,
    } in parsed.into_results()
    {
        let expectation = scope.lookup(id.as_str());
        let verdict = classify(outcome, expectation);
        if verdict == Verdict::Skipped && matches!(expectation, Expectation::KnownFailure { .. }) {
            blocklisted_skips.push(id.clone());
        }
        seen.insert(id.clone());
        results.push(ClassifiedResult {
            id,
            outcome,
            verdict,
            reason: expectation.reason().map(ToOwned::to_owned),
            diagnostic,
        });
    }

    let not_run = scope
        .blocklist()
        .filter(|(test, _)| !seen.contains(*test))
        .map(|(test, reason)| (test.clone(), reason.to_owned()))
        .collect();

    let report = RunReport::new(
        key,
        scope.name(),
        dialect,
        parsed_count,
        results,
        blocklisted_skips,
        not_run,
    )?;

    let counts = report.counts();
    tracing::info!(
        "reconciled {} tests for {}: {} regressed, {} passed unexpectedly, {} failed as expected",
        counts.total(),
        report.scope_key(),
        counts.regression,
        counts.unexpected_pass,
        counts.expected_failure,
    );
    if report.is_blocklist_stale() {
        tracing::warn!(
            "the blocklist for scope `{}` is stale: {} unexpected passes, {} blocklisted tests \
             skipped, {} blocklisted tests not run",
            report.scope_name(),
            counts.unexpected_pass,
            report.blocklisted_skips().len(),
            report.not_run().len(),
        );
    }

    Ok(report)
}
