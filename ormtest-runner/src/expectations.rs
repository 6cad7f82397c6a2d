// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Version-scoped expectation data: which tests are known to fail and which
//! are ignored.
//!
//! Expectations are read from TOML. The built-in data in
//! `default-expectations.toml` is always loaded first, and any files passed to
//! [`ExpectationStore::from_sources`] are layered on top of it.

use crate::{
    errors::{
        ExpectationsParseError, ExpectationsParseErrorKind, MissingExpectationScopeError,
        ReconcileError, UnknownSuiteError,
    },
    parse::OutputDialect,
    retry_policy::{RetryPolicy, deserialize_retry_policy},
    version::{DatabaseVersion, ScopeKey, TagPattern, UpstreamTag},
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use indexmap::{IndexMap, map::Entry};
use itertools::Itertools;
use ormtest_metadata::TestIdentifier;
use semver::VersionReq;
use serde::Deserialize;
use std::{collections::BTreeSet, fmt};

/// Expectation data for every known suite.
///
/// Immutable once loaded, and safe to share between concurrent runs.
#[derive(Clone, Debug)]
pub struct ExpectationStore {
    suites: IndexMap<String, SuiteExpectations>,
}

impl ExpectationStore {
    /// The built-in expectation data.
    pub const DEFAULT_EXPECTATIONS: &'static str = include_str!("../default-expectations.toml");

    /// Loads the built-in expectations, with each of `files` layered on top in
    /// order.
    ///
    /// Each file is also checked on its own (on top of the built-in data), so
    /// that errors are attributed to the file that caused them. Unknown keys
    /// are logged as warnings.
    pub fn from_sources<I>(files: I) -> Result<Self, ExpectationsParseError>
    where
        I: IntoIterator,
        I::Item: AsRef<Utf8Path>,
    {
        let mut composite_builder = Self::make_default_config();
        for file in files {
            let file = file.as_ref();
            let source = File::new(file.as_str(), FileFormat::Toml);

            let this_builder = Self::make_default_config().add_source(source.clone());
            let (this_config, unknown) = Self::build_and_deserialize(&this_builder)
                .map_err(|kind| ExpectationsParseError::new(Some(file.to_owned()), kind))?;
            if !unknown.is_empty() {
                warn_unknown_keys(file, &unknown);
            }
            Self::from_deserialized(this_config, false)
                .map_err(|kind| ExpectationsParseError::new(Some(file.to_owned()), kind))?;

            composite_builder = composite_builder.add_source(source);
        }

        // Unknown keys have already been reported for each file.
        let (config, _unknown) = Self::build_and_deserialize(&composite_builder)
            .map_err(|kind| ExpectationsParseError::new(None, kind))?;
        Self::from_deserialized(config, true).map_err(|kind| ExpectationsParseError::new(None, kind))
    }

    /// Loads expectations from a TOML string alone, without the built-in data.
    pub fn from_toml_str(toml: &str) -> Result<Self, ExpectationsParseError> {
        let builder = Config::builder().add_source(File::from_str(toml, FileFormat::Toml));
        let (config, unknown) = Self::build_and_deserialize(&builder)
            .map_err(|kind| ExpectationsParseError::new(None, kind))?;
        if !unknown.is_empty() {
            warn_unknown_keys(Utf8Path::new("<string>"), &unknown);
        }
        Self::from_deserialized(config, true).map_err(|kind| ExpectationsParseError::new(None, kind))
    }

    /// Returns the expectations for the named suite.
    pub fn suite(&self, name: &str) -> Result<&SuiteExpectations, UnknownSuiteError> {
        self.suites
            .get(name)
            .ok_or_else(|| UnknownSuiteError::new(name, self.suites.keys()))
    }

    /// Iterates over all suites, in the order they were declared.
    pub fn suites(&self) -> impl ExactSizeIterator<Item = &SuiteExpectations> {
        self.suites.values()
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_EXPECTATIONS, FileFormat::Toml))
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(ExpectationsDeserialize, BTreeSet<String>), ExpectationsParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ExpectationsParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: ExpectationsDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // The config crate reports the key as well. Drop it so the path
                // is only shown once.
                let path = error.path().clone();
                let error = match error.into_inner() {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ExpectationsParseErrorKind::DeserializeError(Box::new(
                    serde_path_to_error::Error::new(path, error),
                ))
            })?;

        Ok((config, ignored))
    }

    fn from_deserialized(
        de: ExpectationsDeserialize,
        warn_overlaps: bool,
    ) -> Result<Self, ExpectationsParseErrorKind> {
        let mut suites = IndexMap::with_capacity(de.suites.len());
        for (name, suite) in de.suites {
            let tag_pattern = TagPattern::new(&suite.tag_pattern).map_err(|err| {
                ExpectationsParseErrorKind::InvalidTagPattern {
                    suite: name.clone(),
                    err,
                }
            })?;

            let mut scopes = Vec::with_capacity(suite.scopes.len());
            for (scope_name, scope) in suite.scopes {
                let blocklist = collect_list(&name, &scope_name, "blocklist", scope.blocklist)?;
                let ignorelist = collect_list(&name, &scope_name, "ignorelist", scope.ignorelist)?;
                if warn_overlaps {
                    for test in blocklist.keys().filter(|test| ignorelist.contains_key(*test)) {
                        tracing::warn!(
                            "suite `{name}`, scope `{scope_name}`: test `{test}` is in both the \
                             blocklist and the ignorelist (the ignorelist takes precedence)"
                        );
                    }
                }
                scopes.push(ExpectationScope {
                    name: scope_name,
                    database: scope.database,
                    upstream: scope.upstream,
                    blocklist,
                    ignorelist,
                });
            }

            let run = suite
                .run
                .map(|run| RunPlan::from_deserialized(&name, run))
                .transpose()?;

            suites.insert(
                name.clone(),
                SuiteExpectations {
                    name,
                    dialect: suite.dialect,
                    tag_pattern,
                    supported_tag: suite.supported_tag,
                    scopes,
                    run,
                },
            );
        }

        Ok(Self { suites })
    }
}

fn collect_list(
    suite: &str,
    scope: &str,
    list: &'static str,
    entries: Vec<ExpectationEntry>,
) -> Result<IndexMap<TestIdentifier, String>, ExpectationsParseErrorKind> {
    let mut out = IndexMap::with_capacity(entries.len());
    for ExpectationEntry { test, reason } in entries {
        match out.entry(test) {
            Entry::Occupied(entry) => {
                return Err(ExpectationsParseErrorKind::DuplicateEntry {
                    suite: suite.to_owned(),
                    scope: scope.to_owned(),
                    list,
                    test: entry.key().clone(),
                });
            }
            Entry::Vacant(entry) => {
                entry.insert(reason);
            }
        }
    }
    Ok(out)
}

fn warn_unknown_keys(file: &Utf8Path, unknown: &BTreeSet<String>) {
    let unknown_str = if unknown.len() == 1 {
        format!("key: {}", unknown.iter().join(", "))
    } else {
        format!(
            "keys:\n{}",
            unknown.iter().map(|key| format!("  - {key}")).join("\n")
        )
    };
    tracing::warn!("in expectation file {file}, ignoring unknown {unknown_str}");
}

/// Expectations for one upstream suite.
#[derive(Clone, Debug)]
pub struct SuiteExpectations {
    name: String,
    dialect: OutputDialect,
    tag_pattern: TagPattern,
    supported_tag: Option<String>,
    scopes: Vec<ExpectationScope>,
    run: Option<RunPlan>,
}

impl SuiteExpectations {
    /// Returns the suite name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the dialect the suite's runner emits.
    pub fn dialect(&self) -> OutputDialect {
        self.dialect
    }

    /// Returns the pattern that recognizes the suite's release tags.
    pub fn tag_pattern(&self) -> &TagPattern {
        &self.tag_pattern
    }

    /// Returns the release tag that is pinned for testing, if any.
    pub fn supported_tag(&self) -> Option<&str> {
        self.supported_tag.as_deref()
    }

    /// Returns the expectation scopes, in declaration order.
    pub fn scopes(&self) -> &[ExpectationScope] {
        &self.scopes
    }

    /// Returns the plan for running this suite, if one is defined.
    pub fn run_plan(&self) -> Option<&RunPlan> {
        self.run.as_ref()
    }

    /// Parses raw version strings into a scope key for this suite.
    pub fn resolve_key(
        &self,
        database_version: &str,
        upstream_tag: &str,
    ) -> Result<ScopeKey, ReconcileError> {
        ScopeKey::resolve(&self.name, &self.tag_pattern, database_version, upstream_tag)
    }

    /// Returns the first scope, in declaration order, that applies to `key`.
    pub fn resolve_scope(
        &self,
        key: &ScopeKey,
    ) -> Result<&ExpectationScope, MissingExpectationScopeError> {
        let scope = self
            .scopes
            .iter()
            .find(|scope| scope.matches(key.database(), key.upstream()));
        match scope {
            Some(scope) => {
                tracing::debug!(scope = %scope.name, "resolved expectation scope for {key}");
                Ok(scope)
            }
            None => Err(MissingExpectationScopeError::new(
                key.clone(),
                self.scopes.iter().map(|scope| scope.to_string()).collect(),
            )),
        }
    }
}

/// The expectations that apply to a range of database (and optionally
/// upstream) versions.
#[derive(Clone, Debug)]
pub struct ExpectationScope {
    name: String,
    database: VersionReq,
    upstream: Option<VersionReq>,
    blocklist: IndexMap<TestIdentifier, String>,
    ignorelist: IndexMap<TestIdentifier, String>,
}

impl ExpectationScope {
    /// Returns the scope name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the requirement on the database version.
    pub fn database_req(&self) -> &VersionReq {
        &self.database
    }

    /// Returns the requirement on the upstream release, if any.
    pub fn upstream_req(&self) -> Option<&VersionReq> {
        self.upstream.as_ref()
    }

    /// Returns true if this scope applies to the given versions.
    pub fn matches(&self, database: &DatabaseVersion, upstream: &UpstreamTag) -> bool {
        self.database.matches(&database.for_matching())
            && self
                .upstream
                .as_ref()
                .is_none_or(|req| req.matches(upstream.version()))
    }

    /// Looks up the expectation for a test.
    ///
    /// The ignorelist takes precedence over the blocklist.
    pub fn lookup(&self, test: &str) -> Expectation<'_> {
        if let Some(reason) = self.ignorelist.get(test) {
            Expectation::Ignored { reason }
        } else if let Some(reason) = self.blocklist.get(test) {
            Expectation::KnownFailure { reason }
        } else {
            Expectation::Pass
        }
    }

    /// Iterates over blocklisted tests and their reasons, in declaration
    /// order.
    pub fn blocklist(&self) -> impl ExactSizeIterator<Item = (&TestIdentifier, &str)> {
        self.blocklist.iter().map(|(test, reason)| (test, reason.as_str()))
    }

    /// Iterates over ignorelisted tests and their reasons, in declaration
    /// order.
    pub fn ignorelist(&self) -> impl ExactSizeIterator<Item = (&TestIdentifier, &str)> {
        self.ignorelist.iter().map(|(test, reason)| (test, reason.as_str()))
    }
}

impl fmt::Display for ExpectationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (database {}", self.name, self.database)?;
        if let Some(upstream) = &self.upstream {
            write!(f, ", upstream {upstream}")?;
        }
        f.write_str(")")
    }
}

/// What is expected of a single test.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Expectation<'a> {
    /// The test is expected to pass.
    Pass,

    /// The test is on the blocklist: it is known to fail.
    KnownFailure {
        /// Why the test fails, typically an issue link.
        reason: &'a str,
    },

    /// The test is on the ignorelist: its outcome is not judged.
    Ignored {
        /// Why the test is ignored.
        reason: &'a str,
    },
}

impl<'a> Expectation<'a> {
    /// Returns the reason attached to the blocklist or ignorelist entry.
    pub fn reason(&self) -> Option<&'a str> {
        match *self {
            Self::Pass => None,
            Self::KnownFailure { reason } | Self::Ignored { reason } => Some(reason),
        }
    }
}

/// How to run an upstream suite.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunPlan {
    repository: String,
    checkout_dir: Utf8PathBuf,
    command: String,
    env: Vec<(String, String)>,
    install_steps: Vec<InstallStep>,
    install_retries: RetryPolicy,
}

impl RunPlan {
    fn from_deserialized(
        suite: &str,
        de: RunPlanDeserialize,
    ) -> Result<Self, ExpectationsParseErrorKind> {
        let env = de
            .env
            .into_iter()
            .map(|entry| match entry.split_once('=') {
                Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
                _ => Err(ExpectationsParseErrorKind::InvalidEnvEntry {
                    suite: suite.to_owned(),
                    entry,
                }),
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            repository: de.repository,
            checkout_dir: de.checkout_dir,
            command: de.command,
            env,
            install_steps: de.install_steps,
            install_retries: de.install_retries,
        })
    }

    /// Returns the URL of the upstream repository.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Returns the organization and repository names, derived from the last
    /// two path segments of the repository URL.
    pub fn source_org_repo(&self) -> Option<(&str, &str)> {
        let trimmed = self.repository.trim_end_matches('/');
        let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
        let (rest, repo) = trimmed.rsplit_once('/')?;
        let org = rest.rsplit(['/', ':']).next()?;
        (!org.is_empty() && !repo.is_empty()).then_some((org, repo))
    }

    /// Returns the directory the repository is cloned into.
    pub fn checkout_dir(&self) -> &Utf8Path {
        &self.checkout_dir
    }

    /// Returns the command that runs the suite.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns the environment the database is provisioned with.
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Returns the dependency install steps, in order.
    pub fn install_steps(&self) -> &[InstallStep] {
        &self.install_steps
    }

    /// Returns the retry policy for install steps.
    pub fn install_retries(&self) -> RetryPolicy {
        self.install_retries
    }
}

/// A single dependency install step.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InstallStep {
    /// A short description of the step, used in logs.
    pub name: String,

    /// The shell command to run.
    pub command: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ExpectationsDeserialize {
    #[serde(default)]
    suites: IndexMap<String, SuiteDeserialize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SuiteDeserialize {
    dialect: OutputDialect,
    tag_pattern: String,
    #[serde(default)]
    supported_tag: Option<String>,
    #[serde(default)]
    scopes: IndexMap<String, ScopeDeserialize>,
    #[serde(default)]
    run: Option<RunPlanDeserialize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ScopeDeserialize {
    database: VersionReq,
    #[serde(default)]
    upstream: Option<VersionReq>,
    #[serde(default)]
    blocklist: Vec<ExpectationEntry>,
    #[serde(default)]
    ignorelist: Vec<ExpectationEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ExpectationEntry {
    test: TestIdentifier,
    reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RunPlanDeserialize {
    repository: String,
    checkout_dir: Utf8PathBuf,
    command: String,
    #[serde(default)]
    env: Vec<String>,
    #[serde(default)]
    install_steps: Vec<InstallStep>,
    #[serde(default, deserialize_with = "deserialize_retry_policy")]
    install_retries: RetryPolicy,
}
