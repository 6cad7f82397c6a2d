// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs the upstream test suites of database drivers and ORMs, and reconciles
//! their results against curated expectations.
//!
//! This crate is the `ormtest` command-line interface. The reconciliation
//! engine lives in `ormtest-runner`, and machine-readable output is described
//! by `ormtest-metadata`.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{Color, OutputContext, OutputWriter, StderrStyles};
