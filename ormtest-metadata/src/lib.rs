// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Machine-readable vocabulary for ormtest.
//!
//! ormtest runs the upstream test suites of third-party database drivers and
//! ORMs against a database under test, then reconciles the results against
//! curated, version-scoped expectations. This crate contains the types shared
//! by every consumer of that process:
//!
//! * [`TestIdentifier`] and [`RawOutcome`], the normalized form of one test
//!   result as reported by an upstream test runner.
//! * [`Verdict`] and [`VerdictCounts`], the classification of those results.
//! * [`RunReportSummary`], the serializable form of a finished report, as
//!   produced by `ormtest reconcile --message-format json`.
//! * [`OrmTestExitCode`], the documented exit codes of the `ormtest` binary.

mod exit_codes;
mod outcome;
mod summary;
mod test_id;

pub use exit_codes::*;
pub use outcome::*;
pub use summary::*;
pub use test_id::*;
