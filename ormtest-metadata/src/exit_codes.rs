// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `ormtest` failures.
///
/// A reconciliation may fail for a variety of reasons. This structure
/// documents the exit codes that may occur in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum OrmTestExitCode {}

impl OrmTestExitCode {
    /// The run was accepted: no regressions were found.
    pub const OK: i32 = 0;

    /// The captured output contained no test results at all.
    pub const NO_TESTS_RUN: i32 = 4;

    /// A user issue happened while setting up the reconciliation: invalid
    /// expectation data, an unknown suite, an unparseable version or tag, or
    /// no expectation scope for the resolved versions.
    pub const SETUP_ERROR: i32 = 96;

    /// One or more tests regressed.
    pub const REGRESSIONS_FOUND: i32 = 100;

    /// The reconciler produced an inconsistent report. This indicates a bug in
    /// ormtest.
    pub const INTERNAL_ERROR: i32 = 101;

    /// The captured output could not be parsed in the requested dialect.
    pub const PARSE_FORMAT_FAILED: i32 = 104;

    /// Reading the captured output failed.
    pub const INPUT_READ_ERROR: i32 = 105;

    /// Writing data to stdout or stderr produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}
