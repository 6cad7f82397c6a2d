// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{borrow::Borrow, fmt};

/// The name of a single test case in an upstream test suite.
///
/// The exact shape depends on the suite: Python suites use
/// `module.Class.test_name`, Go suites use `TestName/subtest`, pytest uses
/// node IDs such as `tests/test_x.py::TestX::test_y`. Identifiers are compared
/// as plain strings.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestIdentifier(SmolStr);

impl TestIdentifier {
    /// Creates a new test identifier.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(SmolStr::new(name))
    }

    /// Returns the identifier as a string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TestIdentifier {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TestIdentifier {
    fn from(s: String) -> Self {
        Self(SmolStr::from(s))
    }
}

impl AsRef<str> for TestIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// SmolStr's Eq, Ord and Hash all agree with str's, so lookups by &str are sound.
impl Borrow<str> for TestIdentifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}
