// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for ormtest.
//!
//! ormtest runs the upstream test suites of third-party database drivers and
//! ORMs against a database under test, and decides whether the run is
//! acceptable. Raw runner output goes through these stages:
//!
//! 1. [`parse`] turns the output into normalized results, using one of
//!    several [`OutputDialect`](parse::OutputDialect)s.
//! 2. [`version`] resolves the database version and upstream tag into a
//!    [`ScopeKey`](version::ScopeKey).
//! 3. [`expectations`] looks up the blocklist and ignorelist for that key.
//! 4. [`reconciler`] classifies every result into a
//!    [`Verdict`](ormtest_metadata::Verdict).
//! 5. [`reporter`] aggregates the verdicts into a
//!    [`RunReport`](reporter::RunReport).
//!
//! [`orchestrate`] drives a complete run, from provisioning the database to
//! reconciling the captured output, and [`show_suites`] lists the loaded
//! expectation data.

pub mod errors;
pub mod expectations;
pub mod helpers;
pub mod orchestrate;
pub mod parse;
pub mod reconciler;
pub mod reporter;
pub mod retry_policy;
pub mod show_suites;
pub mod version;
