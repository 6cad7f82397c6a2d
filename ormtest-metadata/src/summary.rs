// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{RawOutcome, TestIdentifier, Verdict, VerdictCounts};
use serde::{Deserialize, Serialize};

/// Root element for a serializable reconciliation report.
///
/// This is produced by `ormtest reconcile --message-format json`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunReportSummary {
    /// The name of the upstream suite, for example `asyncpg`.
    pub suite: String,

    /// The expectation scope the results were reconciled against.
    pub scope: ScopeSummary,

    /// The final status of the run.
    pub status: FinalStatusSummary,

    /// True if the run has no regressions.
    pub accepted: bool,

    /// Counts of results per verdict.
    pub counts: VerdictCounts,

    /// Tests that regressed, sorted by identifier.
    pub regressions: Vec<TestIdentifier>,

    /// Blocklisted tests that passed, sorted by identifier.
    pub unexpected_passes: Vec<TestIdentifier>,

    /// Blocklisted tests that the runner skipped, sorted by identifier.
    #[serde(default)]
    pub blocklisted_skips: Vec<TestIdentifier>,

    /// Blocklisted tests that did not appear in the output, sorted by
    /// identifier.
    #[serde(default)]
    pub not_run: Vec<TestIdentifier>,

    /// Every classified result, in the order the runner reported them.
    pub tests: Vec<TestVerdictSummary>,
}

impl RunReportSummary {
    /// Parses JSON output from `ormtest reconcile --message-format json`.
    pub fn parse_json(json: impl AsRef<str>) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json.as_ref())
    }
}

/// The expectation scope a run was reconciled against.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScopeSummary {
    /// The name of the expectation scope, as written in the expectation data.
    pub name: String,

    /// The normalized database version, for example `23.1.4`.
    pub database_version: String,

    /// The upstream release tag, as given.
    pub upstream_tag: String,
}

/// The final status of a reconciled run.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinalStatusSummary {
    /// No regressions were found.
    Accepted,

    /// At least one test regressed.
    Rejected,

    /// The output contained no test results.
    NoTestsRun,
}

/// The verdict for a single test.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestVerdictSummary {
    /// The test identifier.
    pub name: TestIdentifier,

    /// The outcome reported by the upstream runner.
    pub outcome: RawOutcome,

    /// The classification of the outcome.
    pub verdict: Verdict,

    /// The blocklist or ignorelist reason that applied, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
