// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by ormtest.

use crate::{parse::OutputDialect, version::ScopeKey};
use camino::Utf8PathBuf;
use config::ConfigError;
use itertools::Itertools;
use ormtest_metadata::TestIdentifier;
use std::{error, fmt};
use thiserror::Error;

/// An error that aborts [`reconcile`](crate::reconciler::reconcile).
///
/// No partial report is produced when any of these occur: a partially
/// classified report could misrepresent the health of the run.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The captured output did not contain any test results.
    #[error(transparent)]
    ParseFormat(#[from] ParseFormatError),

    /// The database version could not be parsed.
    #[error(transparent)]
    DatabaseVersion(#[from] DatabaseVersionParseError),

    /// The upstream release tag did not match the suite's tag pattern.
    #[error(transparent)]
    TagParse(#[from] TagParseError),

    /// No expectation data exists for the resolved scope.
    #[error(transparent)]
    MissingExpectationScope(#[from] MissingExpectationScopeError),

    /// The report failed its internal consistency check.
    #[error(transparent)]
    InternalConsistency(#[from] InternalConsistencyError),
}

/// No test results could be extracted from non-empty output.
///
/// This usually means the output was produced in a different dialect than the
/// one requested, or that the upstream suite crashed before running any tests.
/// It is an infrastructure failure, not a regression.
#[derive(Clone, Debug, Error)]
#[error(
    "no test results found in {line_count} lines of output using the `{dialect}` dialect\n\
     (first line: {first_line:?})"
)]
pub struct ParseFormatError {
    dialect: OutputDialect,
    line_count: usize,
    first_line: String,
}

impl ParseFormatError {
    pub(crate) fn new(dialect: OutputDialect, input: &str) -> Self {
        let first_line = input
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default();
        Self {
            dialect,
            line_count: input.lines().count(),
            first_line: crate::helpers::truncate_str(first_line, 120).into_owned(),
        }
    }

    /// Returns the dialect that was used to parse the output.
    pub fn dialect(&self) -> OutputDialect {
        self.dialect
    }

    /// Returns the number of lines in the output.
    pub fn line_count(&self) -> usize {
        self.line_count
    }
}

/// Error returned while parsing an [`OutputDialect`] value from a string.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized value for output dialect: {input}\n(known values: {})",
    OutputDialect::variants().join(", "),
)]
pub struct OutputDialectParseError {
    input: String,
}

impl OutputDialectParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// A database version string could not be parsed.
#[derive(Clone, Debug, Error)]
#[error("database version `{input}` does not contain a MAJOR.MINOR[.POINT] version")]
pub struct DatabaseVersionParseError {
    input: String,
}

impl DatabaseVersionParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }

    /// Returns the version string that failed to parse.
    pub fn input(&self) -> &str {
        &self.input
    }
}

/// A release tag pattern is invalid.
#[derive(Clone, Debug, Error)]
#[error("invalid tag pattern `{pattern}`")]
pub struct TagPatternError {
    pattern: String,
    #[source]
    kind: TagPatternErrorKind,
}

impl TagPatternError {
    pub(crate) fn new(pattern: impl Into<String>, kind: TagPatternErrorKind) -> Self {
        Self {
            pattern: pattern.into(),
            kind,
        }
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> &TagPatternErrorKind {
        &self.kind
    }
}

/// The kind of [`TagPatternError`].
#[derive(Clone, Debug, Error)]
pub enum TagPatternErrorKind {
    /// The pattern is not a valid regular expression.
    #[error("pattern failed to compile")]
    Regex(#[source] regex::Error),

    /// The pattern does not define a required named capture group.
    #[error("pattern is missing the named capture group `{0}`")]
    MissingGroup(&'static str),
}

/// An upstream release tag did not match the suite's tag pattern.
#[derive(Clone, Debug, Error)]
#[error("release tag `{tag}` does not match the tag pattern `{pattern}`")]
pub struct TagParseError {
    tag: String,
    pattern: String,
}

impl TagParseError {
    pub(crate) fn new(tag: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            pattern: pattern.into(),
        }
    }

    /// Returns the tag that failed to parse.
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

/// No expectation data exists for a resolved scope.
///
/// This always stops the run. Treating every test as expected to pass would
/// turn known, accepted failures into regressions.
#[derive(Clone, Debug, Error)]
#[error(
    "no expectation scope matches {scope}\n(known scopes: {})",
    display_known(.known_scopes.as_slice()),
)]
pub struct MissingExpectationScopeError {
    scope: ScopeKey,
    known_scopes: Vec<String>,
}

impl MissingExpectationScopeError {
    pub(crate) fn new(scope: ScopeKey, known_scopes: Vec<String>) -> Self {
        Self {
            scope,
            known_scopes,
        }
    }

    /// Returns the scope key that could not be found.
    pub fn scope(&self) -> &ScopeKey {
        &self.scope
    }
}

/// A suite was requested but is not defined in the expectation data.
#[derive(Clone, Debug, Error)]
#[error(
    "suite `{suite}` not found (known suites: {})",
    display_known(.known_suites.as_slice()),
)]
pub struct UnknownSuiteError {
    suite: String,
    known_suites: Vec<String>,
}

impl UnknownSuiteError {
    pub(crate) fn new(
        suite: impl Into<String>,
        known_suites: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut known_suites: Vec<_> = known_suites.into_iter().map(|s| s.into()).collect();
        known_suites.sort_unstable();
        Self {
            suite: suite.into(),
            known_suites,
        }
    }
}

/// The number of classified verdicts did not match the number of parsed
/// results.
///
/// This indicates a bug in the reconciler and is never corrected silently.
#[derive(Clone, Debug, Error)]
#[error(
    "internal error: {classified} verdicts were produced for {parsed} parsed results \
     (scope: {scope})"
)]
pub struct InternalConsistencyError {
    scope: String,
    parsed: usize,
    classified: usize,
}

impl InternalConsistencyError {
    pub(crate) fn new(scope: impl Into<String>, parsed: usize, classified: usize) -> Self {
        Self {
            scope: scope.into(),
            parsed,
            classified,
        }
    }
}

/// An error that occurred while loading expectation data.
#[derive(Debug, Error)]
#[error("failed to load expectations from {}", display_source(.config_file.as_ref()))]
pub struct ExpectationsParseError {
    config_file: Option<Utf8PathBuf>,
    #[source]
    kind: ExpectationsParseErrorKind,
}

impl ExpectationsParseError {
    pub(crate) fn new(config_file: Option<Utf8PathBuf>, kind: ExpectationsParseErrorKind) -> Self {
        Self { config_file, kind }
    }

    /// Returns the file the error occurred in, or `None` for the built-in
    /// expectations or combined layers.
    pub fn config_file(&self) -> Option<&Utf8PathBuf> {
        self.config_file.as_ref()
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> &ExpectationsParseErrorKind {
        &self.kind
    }
}

/// The kind of [`ExpectationsParseError`].
#[derive(Debug, Error)]
pub enum ExpectationsParseErrorKind {
    /// The layered configuration could not be built.
    #[error("error reading expectation sources")]
    BuildError(#[source] Box<ConfigError>),

    /// The configuration did not match the expected shape.
    #[error("error deserializing expectations at `{}`", .0.path())]
    DeserializeError(#[source] Box<serde_path_to_error::Error<ConfigError>>),

    /// A suite's tag pattern is invalid.
    #[error("suite `{suite}` has an invalid tag pattern")]
    InvalidTagPattern {
        /// The suite name.
        suite: String,

        /// The underlying error.
        #[source]
        err: TagPatternError,
    },

    /// A test is listed twice in the same list.
    #[error("suite `{suite}`, scope `{scope}`: test `{test}` is listed more than once in the {list}")]
    DuplicateEntry {
        /// The suite name.
        suite: String,

        /// The scope name.
        scope: String,

        /// Either `"blocklist"` or `"ignorelist"`.
        list: &'static str,

        /// The duplicated test.
        test: TestIdentifier,
    },

    /// An entry in a run plan's `env` list is not of the form `KEY=VALUE`.
    #[error("suite `{suite}`: env entry `{entry}` is not of the form KEY=VALUE")]
    InvalidEnvEntry {
        /// The suite name.
        suite: String,

        /// The invalid entry.
        entry: String,
    },
}

/// An error that occurred while driving a full ORM test run.
///
/// `E` is the error type of the [`SuiteEnvironment`](crate::orchestrate::SuiteEnvironment)
/// in use.
#[derive(Debug, Error)]
pub enum SuiteRunError<E: error::Error + 'static> {
    /// The suite has no `run` section in its expectation data.
    #[error("suite `{suite}` does not define a run plan")]
    NoRunPlan {
        /// The suite name.
        suite: String,
    },

    /// Provisioning the database environment failed.
    #[error("failed to provision node `{node}`")]
    Provisioning {
        /// The target node.
        node: String,

        /// The underlying error.
        #[source]
        err: E,
    },

    /// Fetching the database version failed.
    #[error("failed to fetch the database version from node `{node}`")]
    FetchVersion {
        /// The target node.
        node: String,

        /// The underlying error.
        #[source]
        err: E,
    },

    /// Looking up the latest upstream release failed.
    #[error("failed to look up the latest release of {org}/{repo}")]
    LookupTag {
        /// The source organization.
        org: String,

        /// The source repository.
        repo: String,

        /// The underlying error.
        #[source]
        err: E,
    },

    /// The suite pins no supported tag and no release tag could be found.
    #[error("suite `{suite}` has no supported tag and no release matching `{pattern}` was found")]
    NoReleaseTag {
        /// The suite name.
        suite: String,

        /// The suite's tag pattern.
        pattern: String,
    },

    /// Cloning the upstream repository failed.
    #[error("failed to clone {repository} at `{tag}`")]
    Clone {
        /// The repository URL.
        repository: String,

        /// The tag that was requested.
        tag: String,

        /// The underlying error.
        #[source]
        err: E,
    },

    /// An install step failed on every attempt.
    #[error("install step `{step}` failed after {attempts} attempts")]
    Install {
        /// The name of the install step.
        step: String,

        /// The number of attempts made.
        attempts: u32,

        /// The error from the last attempt.
        #[source]
        err: E,
    },

    /// Executing the upstream suite failed outright.
    #[error("failed to execute the {suite} suite")]
    Execute {
        /// The suite name.
        suite: String,

        /// The underlying error.
        #[source]
        err: E,
    },

    /// Reconciling the captured output failed.
    #[error("failed to reconcile the {suite} suite")]
    Reconcile {
        /// The suite name.
        suite: String,

        /// The underlying error.
        #[source]
        err: ReconcileError,
    },
}

/// Displays an error along with its chain of sources, one per line.
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: error::Error> DisplayErrorChain<E> {
    /// Creates a new chain displayer.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: error::Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        let mut next = self.error.source();
        while let Some(err) = next {
            write!(f, "\n  caused by: {err}")?;
            next = err.source();
        }
        Ok(())
    }
}

fn display_known(known: &[String]) -> String {
    if known.is_empty() {
        "(none)".to_owned()
    } else {
        known.iter().join(", ")
    }
}

fn display_source(config_file: Option<&Utf8PathBuf>) -> String {
    match config_file {
        Some(path) => format!("`{path}`"),
        None => "the layered expectation sources".to_owned(),
    }
}
