// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// The outcome of a single test, as reported by the upstream test runner.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RawOutcome {
    /// The test passed.
    Pass,

    /// The test ran and an assertion failed.
    Fail,

    /// The test could not complete: an unexpected exception, a panic outside
    /// the assertion, or a setup failure.
    Error,

    /// The test was skipped by the runner.
    Skip,
}

impl RawOutcome {
    /// Returns true if this outcome is failure-like.
    ///
    /// `Fail` and `Error` are distinguished for diagnostics only: they are
    /// classified identically.
    #[inline]
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Fail | Self::Error)
    }

    /// Returns the string form of this outcome.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Error => "error",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for RawOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The classification of one test result against the expectations in force
/// for a run.
///
/// Only [`Verdict::Regression`] fails a run.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    /// A failure-like outcome for a test that was expected to pass.
    Regression,

    /// A passing outcome for a test on the blocklist. The blocklist entry is
    /// probably stale.
    UnexpectedPass,

    /// A failure-like outcome for a test on the blocklist.
    ExpectedFailure,

    /// The test is on the ignorelist; its outcome is not judged.
    Ignored,

    /// The runner skipped the test.
    Skipped,

    /// A passing outcome for a test that was expected to pass.
    ExpectedPass,
}

impl Verdict {
    /// All verdicts, in the order they are reported.
    ///
    /// The categories that need human attention come first.
    pub const ALL: [Verdict; 6] = [
        Verdict::Regression,
        Verdict::UnexpectedPass,
        Verdict::ExpectedFailure,
        Verdict::Ignored,
        Verdict::Skipped,
        Verdict::ExpectedPass,
    ];

    /// Returns true if this verdict fails the run.
    #[inline]
    pub fn fails_run(self) -> bool {
        matches!(self, Self::Regression)
    }

    /// Returns true if this verdict should be looked at by a human.
    #[inline]
    pub fn needs_attention(self) -> bool {
        matches!(self, Self::Regression | Self::UnexpectedPass)
    }

    /// Returns the machine-readable name of this verdict.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Regression => "regression",
            Self::UnexpectedPass => "unexpected-pass",
            Self::ExpectedFailure => "expected-failure",
            Self::Ignored => "ignored",
            Self::Skipped => "skipped",
            Self::ExpectedPass => "expected-pass",
        }
    }

    /// Returns the human-readable description of this verdict, as used in
    /// summaries.
    pub fn description(self) -> &'static str {
        match self {
            Self::Regression => "regressed",
            Self::UnexpectedPass => "passed unexpectedly",
            Self::ExpectedFailure => "failed as expected",
            Self::Ignored => "ignored",
            Self::Skipped => "skipped",
            Self::ExpectedPass => "passed",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts of results per [`Verdict`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VerdictCounts {
    /// The number of regressions.
    pub regression: usize,

    /// The number of blocklisted tests that passed.
    pub unexpected_pass: usize,

    /// The number of blocklisted tests that failed.
    pub expected_failure: usize,

    /// The number of ignorelisted tests.
    pub ignored: usize,

    /// The number of skipped tests.
    pub skipped: usize,

    /// The number of tests that passed as expected.
    pub expected_pass: usize,
}

impl VerdictCounts {
    /// Records one result with the given verdict.
    pub fn record(&mut self, verdict: Verdict) {
        *self.get_mut(verdict) += 1;
    }

    /// Returns the count for the given verdict.
    pub fn get(&self, verdict: Verdict) -> usize {
        match verdict {
            Verdict::Regression => self.regression,
            Verdict::UnexpectedPass => self.unexpected_pass,
            Verdict::ExpectedFailure => self.expected_failure,
            Verdict::Ignored => self.ignored,
            Verdict::Skipped => self.skipped,
            Verdict::ExpectedPass => self.expected_pass,
        }
    }

    fn get_mut(&mut self, verdict: Verdict) -> &mut usize {
        match verdict {
            Verdict::Regression => &mut self.regression,
            Verdict::UnexpectedPass => &mut self.unexpected_pass,
            Verdict::ExpectedFailure => &mut self.expected_failure,
            Verdict::Ignored => &mut self.ignored,
            Verdict::Skipped => &mut self.skipped,
            Verdict::ExpectedPass => &mut self.expected_pass,
        }
    }

    /// Returns the total number of results counted.
    pub fn total(&self) -> usize {
        Verdict::ALL.iter().map(|&verdict| self.get(verdict)).sum()
    }
}
