// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregating classified results into a run report.
//!
//! A [`RunReport`] holds the verdict for every test and decides whether the
//! run is accepted. It renders deterministically: identical inputs produce
//! byte-identical text.

use crate::{
    errors::InternalConsistencyError,
    helpers::{first_line, last_line, plural, truncate_str},
    parse::OutputDialect,
    reconciler::ClassifiedResult,
    version::ScopeKey,
};
use ormtest_metadata::{
    FinalStatusSummary, RunReportSummary, ScopeSummary, TestIdentifier, TestVerdictSummary,
    Verdict, VerdictCounts,
};
use owo_colors::{OwoColorize, Style};
use std::fmt;
use swrite::{SWrite, swrite, swriteln};
use toml_edit::{Array, DocumentMut, InlineTable, Value};

const DIAGNOSTIC_WIDTH: usize = 160;

/// The final status of a reconciled run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FinalStatus {
    /// No regressions were found.
    Accepted,

    /// At least one test regressed.
    Rejected {
        /// The number of regressions.
        regressions: usize,
    },

    /// The output contained no test results.
    ///
    /// The run is still accepted, since nothing regressed, but this usually
    /// points at a problem with the run itself.
    NoTestsRun,
}

impl FinalStatus {
    fn to_summary(self) -> FinalStatusSummary {
        match self {
            Self::Accepted => FinalStatusSummary::Accepted,
            Self::Rejected { .. } => FinalStatusSummary::Rejected,
            Self::NoTestsRun => FinalStatusSummary::NoTestsRun,
        }
    }
}

/// The result of reconciling one run against its expectations.
#[derive(Clone, Debug)]
pub struct RunReport {
    scope_key: ScopeKey,
    scope_name: String,
    dialect: OutputDialect,
    results: Vec<ClassifiedResult>,
    counts: VerdictCounts,
    blocklisted_skips: Vec<TestIdentifier>,
    not_run: Vec<(TestIdentifier, String)>,
}

impl RunReport {
    /// Builds a report, checking that every parsed result was classified
    /// exactly once.
    pub(crate) fn new(
        scope_key: ScopeKey,
        scope_name: &str,
        dialect: OutputDialect,
        parsed_count: usize,
        results: Vec<ClassifiedResult>,
        mut blocklisted_skips: Vec<TestIdentifier>,
        mut not_run: Vec<(TestIdentifier, String)>,
    ) -> Result<Self, InternalConsistencyError> {
        let mut counts = VerdictCounts::default();
        for result in &results {
            counts.record(result.verdict);
        }
        if counts.total() != parsed_count || results.len() != parsed_count {
            return Err(InternalConsistencyError::new(
                scope_key.to_string(),
                parsed_count,
                counts.total(),
            ));
        }

        blocklisted_skips.sort_unstable();
        not_run.sort_unstable();
        Ok(Self {
            scope_key,
            scope_name: scope_name.to_owned(),
            dialect,
            results,
            counts,
            blocklisted_skips,
            not_run,
        })
    }

    /// Returns the scope key the run was resolved to.
    pub fn scope_key(&self) -> &ScopeKey {
        &self.scope_key
    }

    /// Returns the name of the expectation scope that was applied.
    pub fn scope_name(&self) -> &str {
        &self.scope_name
    }

    /// Returns the dialect the output was parsed with.
    pub fn dialect(&self) -> OutputDialect {
        self.dialect
    }

    /// Returns every classified result, in the order the runner reported
    /// them.
    pub fn results(&self) -> &[ClassifiedResult] {
        &self.results
    }

    /// Returns the number of results per verdict.
    pub fn counts(&self) -> VerdictCounts {
        self.counts
    }

    /// Returns true if no test regressed.
    #[inline]
    pub fn accepted(&self) -> bool {
        self.counts.regression == 0
    }

    /// Returns the final status of the run.
    pub fn final_status(&self) -> FinalStatus {
        if self.results.is_empty() {
            FinalStatus::NoTestsRun
        } else if self.accepted() {
            FinalStatus::Accepted
        } else {
            FinalStatus::Rejected {
                regressions: self.counts.regression,
            }
        }
    }

    /// Returns the results with the given verdict, sorted by identifier.
    pub fn with_verdict(&self, verdict: Verdict) -> Vec<&ClassifiedResult> {
        let mut results: Vec<_> = self
            .results
            .iter()
            .filter(|result| result.verdict == verdict)
            .collect();
        results.sort_unstable_by(|a, b| a.id.cmp(&b.id));
        results
    }

    /// Returns the tests that regressed, sorted by identifier.
    pub fn regressions(&self) -> Vec<&TestIdentifier> {
        self.ids_with_verdict(Verdict::Regression)
    }

    /// Returns the blocklisted tests that passed, sorted by identifier.
    pub fn unexpected_passes(&self) -> Vec<&TestIdentifier> {
        self.ids_with_verdict(Verdict::UnexpectedPass)
    }

    /// Returns the blocklisted tests that the runner skipped, sorted by
    /// identifier.
    pub fn blocklisted_skips(&self) -> &[TestIdentifier] {
        &self.blocklisted_skips
    }

    /// Returns the blocklisted tests that didn't appear in the output, with
    /// their blocklist reasons, sorted by identifier.
    pub fn not_run(&self) -> &[(TestIdentifier, String)] {
        &self.not_run
    }

    /// Returns true if the blocklist no longer reflects reality: some
    /// blocklisted tests passed, were skipped, or didn't run.
    pub fn is_blocklist_stale(&self) -> bool {
        self.counts.unexpected_pass > 0
            || !self.blocklisted_skips.is_empty()
            || !self.not_run.is_empty()
    }

    /// Returns a displayer for the human-readable report.
    pub fn display(&self) -> DisplayRunReport<'_> {
        DisplayRunReport {
            report: self,
            styles: Styles::default(),
            verbose: false,
        }
    }

    /// Returns the uncolored human-readable report.
    pub fn to_text(&self) -> String {
        self.display().to_string()
    }

    /// Returns a TOML `blocklist` that matches the current failures, or
    /// `None` if the existing blocklist is accurate and nothing regressed.
    ///
    /// Every failing test that isn't ignored is listed. Existing reasons are
    /// kept and new entries are marked `"unknown"`.
    pub fn suggested_blocklist(&self) -> Option<String> {
        if self.accepted() && !self.is_blocklist_stale() {
            return None;
        }

        let mut failing: Vec<_> = self
            .results
            .iter()
            .filter(|result| {
                matches!(
                    result.verdict,
                    Verdict::Regression | Verdict::ExpectedFailure
                )
            })
            .collect();
        failing.sort_unstable_by(|a, b| a.id.cmp(&b.id));

        let mut entries = Array::new();
        for result in &failing {
            let mut entry = InlineTable::new();
            entry.insert("test", Value::from(result.id.as_str()));
            entry.insert(
                "reason",
                Value::from(result.reason.as_deref().unwrap_or("unknown")),
            );
            entry.fmt();
            // One entry per line.
            entries.push_formatted(Value::InlineTable(entry).decorated("\n    ", ""));
        }
        if !entries.is_empty() {
            entries.set_trailing_comma(true);
            entries.set_trailing("\n");
        }

        let mut doc = DocumentMut::new();
        doc["blocklist"] = toml_edit::value(entries);
        Some(doc.to_string())
    }

    /// Returns the runner's reason for skipping a test, if it gave one.
    fn skip_reason(&self, test: &TestIdentifier) -> Option<String> {
        self.results
            .iter()
            .find(|result| &result.id == test)
            .and_then(|result| result.diagnostic.as_deref())
            .and_then(first_line)
            .map(ToOwned::to_owned)
    }

    /// Returns the one-line summary of a failure diagnostic.
    ///
    /// Python tracebacks end with the exception, so their last line is used.
    /// Other runners print the failure message first.
    fn failure_summary(&self, diagnostic: &str) -> Option<String> {
        let line = match self.dialect {
            OutputDialect::PythonUnittest => last_line(diagnostic),
            OutputDialect::Libtest
            | OutputDialect::Pytest
            | OutputDialect::GoTest
            | OutputDialect::Tap => first_line(diagnostic),
        }?;
        Some(truncate_str(line, DIAGNOSTIC_WIDTH).into_owned())
    }

    /// Converts this report into its serializable form.
    pub fn to_summary(&self) -> RunReportSummary {
        let ids = |ids: Vec<&TestIdentifier>| ids.into_iter().cloned().collect();
        RunReportSummary {
            suite: self.scope_key.suite().to_owned(),
            scope: ScopeSummary {
                name: self.scope_name.clone(),
                database_version: self.scope_key.database().to_string(),
                upstream_tag: self.scope_key.upstream().to_string(),
            },
            status: self.final_status().to_summary(),
            accepted: self.accepted(),
            counts: self.counts,
            regressions: ids(self.regressions()),
            unexpected_passes: ids(self.unexpected_passes()),
            blocklisted_skips: self.blocklisted_skips.clone(),
            not_run: self.not_run.iter().map(|(test, _)| test.clone()).collect(),
            tests: self
                .results
                .iter()
                .map(|result| TestVerdictSummary {
                    name: result.id.clone(),
                    outcome: result.outcome,
                    verdict: result.verdict,
                    reason: result.reason.clone(),
                })
                .collect(),
        }
    }

    fn ids_with_verdict(&self, verdict: Verdict) -> Vec<&TestIdentifier> {
        self.with_verdict(verdict)
            .into_iter()
            .map(|result| &result.id)
            .collect()
    }
}

/// Displays a [`RunReport`] in human-readable form.
///
/// Created by [`RunReport::display`].
#[derive(Debug)]
pub struct DisplayRunReport<'a> {
    report: &'a RunReport,
    styles: Styles,
    verbose: bool,
}

impl DisplayRunReport<'_> {
    /// Colorizes the output.
    pub fn colorize(mut self) -> Self {
        self.styles.colorize();
        self
    }

    /// If true, also lists tests that passed as expected.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn write_summary_str(&self, out: &mut String) {
        let counts = self.report.counts;
        let styles = &self.styles;
        swrite!(
            out,
            "{}: {} {}",
            "Summary".style(styles.header),
            counts.total().style(styles.count),
            plural::tests_str(counts.total()),
        );

        let parts: Vec<_> = Verdict::ALL
            .into_iter()
            .filter(|&verdict| counts.get(verdict) > 0)
            .map(|verdict| {
                format!(
                    "{} {}",
                    counts.get(verdict).style(styles.count),
                    verdict.description().style(styles.verdict(verdict)),
                )
            })
            .collect();
        if !parts.is_empty() {
            swrite!(out, ": {}", parts.join(", "));
        }
        out.push('\n');
    }

    fn write_section<'b>(
        &self,
        out: &mut String,
        title: &str,
        style: Style,
        lines: impl ExactSizeIterator<Item = (&'b TestIdentifier, Option<String>)>,
    ) {
        if lines.len() == 0 {
            return;
        }
        swriteln!(
            out,
            "\n{} ({}):",
            title.style(style),
            lines.len().style(self.styles.count)
        );
        for (test, detail) in lines {
            match detail {
                Some(detail) => swriteln!(out, "    {}: {detail}", test.style(self.styles.test)),
                None => swriteln!(out, "    {}", test.style(self.styles.test)),
            }
        }
    }

    fn write_verdict_section(&self, out: &mut String, title: &str, verdict: Verdict) {
        let results = self.report.with_verdict(verdict);
        let lines = results.into_iter().map(|result| {
            let detail = match verdict {
                Verdict::Regression => result
                    .diagnostic
                    .as_deref()
                    .and_then(|diagnostic| self.report.failure_summary(diagnostic)),
                Verdict::Skipped => self
                    .report
                    .skip_reason(&result.id)
                    .or_else(|| result.reason.clone()),
                _ => result.reason.clone(),
            };
            (&result.id, detail)
        });
        self.write_section(out, title, self.styles.verdict(verdict), lines);
    }

    fn write_verdict_sections(&self, out: &mut String, needs_attention: bool) {
        for verdict in Verdict::ALL {
            if verdict.needs_attention() != needs_attention
                || (verdict == Verdict::ExpectedPass && !self.verbose)
            {
                continue;
            }
            self.write_verdict_section(out, section_title(verdict), verdict);
        }
    }

    fn write_result_line(&self, out: &mut String) {
        let styles = &self.styles;
        swrite!(out, "\n{}: ", "Result".style(styles.header));
        match self.report.final_status() {
            FinalStatus::Accepted => {
                swrite!(out, "{}", "ACCEPTED".style(styles.pass));
                if self.report.is_blocklist_stale() {
                    swrite!(out, " (blocklist is {})", "stale".style(styles.skip));
                }
            }
            FinalStatus::Rejected { regressions } => {
                swrite!(
                    out,
                    "{} ({} {})",
                    "REJECTED".style(styles.fail),
                    regressions.style(styles.count),
                    plural::regressions_str(regressions),
                );
            }
            FinalStatus::NoTestsRun => {
                swrite!(out, "{}", "NO TESTS RUN".style(styles.skip));
            }
        }
        out.push('\n');
    }
}

impl fmt::Display for DisplayRunReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.report;
        let mut out = String::new();
        swriteln!(
            out,
            "Reconciled {} against scope {}",
            report.scope_key.style(self.styles.header),
            report.scope_name.style(self.styles.header),
        );
        self.write_summary_str(&mut out);

        self.write_verdict_sections(&mut out, true);
        self.write_section(
            &mut out,
            "EXPECTED TO FAIL BUT SKIPPED",
            self.styles.skip,
            report
                .blocklisted_skips
                .iter()
                .map(|test| (test, report.skip_reason(test))),
        );
        self.write_section(
            &mut out,
            "EXPECTED TO FAIL BUT NOT RUN",
            self.styles.skip,
            report
                .not_run
                .iter()
                .map(|(test, reason)| (test, Some(reason.clone()))),
        );
        self.write_verdict_sections(&mut out, false);

        self.write_result_line(&mut out);
        f.write_str(&out)
    }
}

#[derive(Clone, Debug, Default)]
struct Styles {
    header: Style,
    count: Style,
    test: Style,
    pass: Style,
    expected: Style,
    fail: Style,
    skip: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.header = Style::new().bold();
        self.count = Style::new().bold();
        self.test = Style::new().blue().bold();
        self.pass = Style::new().green().bold();
        self.expected = Style::new().magenta().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().yellow().bold();
    }

    fn verdict(&self, verdict: Verdict) -> Style {
        match verdict {
            Verdict::Regression => self.fail,
            Verdict::UnexpectedPass | Verdict::Ignored | Verdict::Skipped => self.skip,
            Verdict::ExpectedFailure => self.expected,
            Verdict::ExpectedPass => self.pass,
        }
    }
}

fn section_title(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Regression => "REGRESSED",
        Verdict::UnexpectedPass => "PASSED UNEXPECTEDLY",
        Verdict::ExpectedFailure => "FAILED AS EXPECTED",
        Verdict::Ignored => "IGNORED",
        Verdict::Skipped => "SKIPPED",
        Verdict::ExpectedPass => "PASSED",
    }
}
