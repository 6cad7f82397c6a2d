// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for ormtest-runner.

mod layered_expectations;
mod suite_run;
