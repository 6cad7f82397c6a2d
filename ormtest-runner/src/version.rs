// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resolving database versions and upstream release tags into scope keys.

use crate::errors::{
    DatabaseVersionParseError, ReconcileError, TagParseError, TagPatternError, TagPatternErrorKind,
};
use regex::Regex;
use semver::{BuildMetadata, Prerelease, Version};
use std::{fmt, sync::LazyLock};

static DATABASE_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\bv?(?P<major>\d+)\.(?P<minor>\d+)(?:\.(?P<point>\d+))?(?:-(?P<pre>[0-9A-Za-z][0-9A-Za-z.-]*))?(?:\+(?P<build>[0-9A-Za-z][0-9A-Za-z.-]*))?",
    )
    .expect("database version regex is valid")
});

/// A database version, normalized to `MAJOR.MINOR.POINT[-PRERELEASE]`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DatabaseVersion {
    raw: String,
    version: Version,
}

impl DatabaseVersion {
    /// Parses a database version.
    ///
    /// Accepts `v23.1.4`, `23.1.4` and `v23.1` (the point release defaults to
    /// 0), optionally with prerelease and build suffixes. The version may also
    /// be embedded in a longer build-info string such as
    /// `CockroachDB CCL v23.1.4 (x86_64-pc-linux-gnu)`; the first version
    /// found is used.
    pub fn parse(input: &str) -> Result<Self, DatabaseVersionParseError> {
        let err = || DatabaseVersionParseError::new(input);
        let captures = DATABASE_VERSION.captures(input).ok_or_else(err)?;

        let component = |name: &str| -> Result<u64, DatabaseVersionParseError> {
            match captures.name(name) {
                Some(m) => m.as_str().parse().map_err(|_| err()),
                None => Ok(0),
            }
        };
        let mut version = Version::new(component("major")?, component("minor")?, component("point")?);
        if let Some(pre) = captures.name("pre") {
            version.pre = Prerelease::new(pre.as_str()).map_err(|_| err())?;
        }
        if let Some(build) = captures.name("build") {
            version.build = BuildMetadata::new(build.as_str()).map_err(|_| err())?;
        }

        Ok(Self {
            raw: input.to_owned(),
            version,
        })
    }

    /// Returns the string this version was parsed from.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Returns the parsed version.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Returns the version used to match expectation scopes: prerelease and
    /// build metadata are dropped, so `v23.2.0-alpha.1` matches `>=23.2.0`.
    pub fn for_matching(&self) -> Version {
        Version::new(self.version.major, self.version.minor, self.version.patch)
    }
}

impl fmt::Display for DatabaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Build metadata isn't meaningful to readers.
        write!(f, "{}.{}.{}", self.version.major, self.version.minor, self.version.patch)?;
        if !self.version.pre.is_empty() {
            write!(f, "-{}", self.version.pre)?;
        }
        Ok(())
    }
}

/// A regular expression that recognizes a suite's release tags.
///
/// The pattern must define the named capture groups `major`, `minor` and
/// `point`. Captured text may carry a non-numeric prefix (for example a
/// pattern that captures `v0` as the major version); leading non-digits are
/// ignored.
#[derive(Clone, Debug)]
pub struct TagPattern {
    regex: Regex,
}

impl TagPattern {
    const GROUPS: [&'static str; 3] = ["major", "minor", "point"];

    /// Compiles a new tag pattern.
    pub fn new(pattern: &str) -> Result<Self, TagPatternError> {
        let regex = Regex::new(pattern)
            .map_err(|err| TagPatternError::new(pattern, TagPatternErrorKind::Regex(err)))?;
        for group in Self::GROUPS {
            if !regex.capture_names().flatten().any(|name| name == group) {
                return Err(TagPatternError::new(
                    pattern,
                    TagPatternErrorKind::MissingGroup(group),
                ));
            }
        }
        Ok(Self { regex })
    }

    /// Returns the pattern as written.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Parses a release tag.
    pub fn parse(&self, tag: &str) -> Result<UpstreamTag, TagParseError> {
        self.try_parse(tag)
            .ok_or_else(|| TagParseError::new(tag, self.as_str()))
    }

    /// Returns the greatest of `tags` that matches this pattern.
    ///
    /// Tags that don't match are ignored. If two tags parse to the same
    /// version, the first one wins.
    pub fn latest<'a>(&self, tags: impl IntoIterator<Item = &'a str>) -> Option<UpstreamTag> {
        tags.into_iter()
            .filter_map(|tag| self.try_parse(tag))
            .fold(None, |latest: Option<UpstreamTag>, tag| match latest {
                Some(latest) if latest.version >= tag.version => Some(latest),
                _ => Some(tag),
            })
    }

    fn try_parse(&self, tag: &str) -> Option<UpstreamTag> {
        let captures = self.regex.captures(tag)?;
        let component = |name: &str| -> Option<u64> {
            let text = captures.name(name)?.as_str();
            text.trim_start_matches(|c: char| !c.is_ascii_digit())
                .parse()
                .ok()
        };
        Some(UpstreamTag {
            raw: tag.to_owned(),
            version: Version::new(component("major")?, component("minor")?, component("point")?),
        })
    }
}

/// An upstream release tag, along with the version parsed from it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UpstreamTag {
    raw: String,
    version: Version,
}

impl UpstreamTag {
    /// Returns the tag as given.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the version parsed from the tag.
    pub fn version(&self) -> &Version {
        &self.version
    }
}

impl fmt::Display for UpstreamTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// The key used to select expectation data for a run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScopeKey {
    suite: String,
    database: DatabaseVersion,
    upstream: UpstreamTag,
}

impl ScopeKey {
    /// Resolves a scope key from raw version strings.
    ///
    /// Never guesses: a version or tag that can't be parsed is an error.
    pub fn resolve(
        suite: impl Into<String>,
        tag_pattern: &TagPattern,
        database_version: &str,
        upstream_tag: &str,
    ) -> Result<Self, ReconcileError> {
        let database = DatabaseVersion::parse(database_version)?;
        let upstream = tag_pattern.parse(upstream_tag)?;
        Ok(Self::new(suite, database, upstream))
    }

    /// Creates a scope key from already-parsed parts.
    pub fn new(suite: impl Into<String>, database: DatabaseVersion, upstream: UpstreamTag) -> Self {
        Self {
            suite: suite.into(),
            database,
            upstream,
        }
    }

    /// Returns the suite name.
    pub fn suite(&self) -> &str {
        &self.suite
    }

    /// Returns the database version.
    pub fn database(&self) -> &DatabaseVersion {
        &self.database
    }

    /// Returns the upstream release tag.
    pub fn upstream(&self) -> &UpstreamTag {
        &self.upstream
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (database {}, upstream {})",
            self.suite, self.database, self.upstream
        )
    }
}
