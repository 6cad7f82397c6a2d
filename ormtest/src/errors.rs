// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use camino::Utf8PathBuf;
use ormtest_metadata::OrmTestExitCode;
use ormtest_runner::errors::{ExpectationsParseError, ReconcileError, UnknownSuiteError};
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// The #[error()] strings are placeholders: errors are meant to be printed with
// display_to_stderr, which colorizes them.

/// An error that ormtest knows how to report.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("expectation parse error")]
    ExpectationsParseError {
        #[from]
        err: ExpectationsParseError,
    },
    #[error("unknown suite")]
    UnknownSuite {
        #[from]
        err: UnknownSuiteError,
    },
    #[error("failed to read input")]
    InputReadError {
        path: Option<Utf8PathBuf>,
        #[source]
        err: std::io::Error,
    },
    #[error("reconcile error")]
    ReconcileError {
        suite: String,
        #[source]
        err: ReconcileError,
    },
    #[error("failed to serialize report")]
    SerializeError {
        #[source]
        err: serde_json::Error,
    },
    #[error("failed to write output")]
    WriteError {
        #[source]
        err: std::io::Error,
    },
}

impl ExpectedError {
    pub(crate) fn input_read_error(path: Option<Utf8PathBuf>, err: std::io::Error) -> Self {
        Self::InputReadError { path, err }
    }

    pub(crate) fn reconcile_error(suite: impl Into<String>, err: ReconcileError) -> Self {
        Self::ReconcileError {
            suite: suite.into(),
            err,
        }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::ExpectationsParseError { .. } | Self::UnknownSuite { .. } => {
                OrmTestExitCode::SETUP_ERROR
            }
            Self::InputReadError { .. } => OrmTestExitCode::INPUT_READ_ERROR,
            Self::ReconcileError { err, .. } => match err {
                ReconcileError::ParseFormat(_) => OrmTestExitCode::PARSE_FORMAT_FAILED,
                ReconcileError::InternalConsistency(_) => OrmTestExitCode::INTERNAL_ERROR,
                ReconcileError::DatabaseVersion(_)
                | ReconcileError::TagParse(_)
                | ReconcileError::MissingExpectationScope(_) => OrmTestExitCode::SETUP_ERROR,
            },
            Self::SerializeError { .. } | Self::WriteError { .. } => {
                OrmTestExitCode::WRITE_OUTPUT_ERROR
            }
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::ExpectationsParseError { err } => {
                tracing::error!("{err}");
                err.source()
            }
            Self::UnknownSuite { err } => {
                tracing::error!("{err}");
                err.source()
            }
            Self::InputReadError { path, err } => {
                match path {
                    Some(path) => {
                        tracing::error!("failed to read test output from `{}`", path.style(styles.bold));
                    }
                    None => tracing::error!("failed to read test output from standard input"),
                }
                Some(err as &dyn Error)
            }
            Self::ReconcileError { suite, err } => {
                tracing::error!("failed to reconcile results for suite `{}`", suite.style(styles.bold));
                if let ReconcileError::ParseFormat(_) = err {
                    tracing::info!(
                        target: NO_HEADING_TARGET,
                        "{}",
                        "(hint: check that the suite actually ran, or pass --dialect)"
                            .style(styles.warning_text)
                    );
                }
                Some(err as &dyn Error)
            }
            Self::SerializeError { err } => {
                tracing::error!("failed to serialize report to JSON");
                Some(err as &dyn Error)
            }
            Self::WriteError { err } => {
                tracing::error!("failed to write output");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            tracing::error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
