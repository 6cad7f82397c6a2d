// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Driving a complete ORM test run.
//!
//! Everything that touches the outside world (provisioning, source control,
//! process execution) goes through a [`SuiteEnvironment`]. [`SuiteRun`]
//! sequences those calls and hands the captured output to the reconciler.

use crate::{
    errors::{DisplayErrorChain, SuiteRunError},
    expectations::{InstallStep, RunPlan, SuiteExpectations},
    helpers::plural,
    reconciler::{ReconcileInput, reconcile},
    reporter::RunReport,
    version::UpstreamTag,
};
use camino::Utf8Path;
use std::{borrow::Cow, error, time::Duration};
use tracing::{debug, info, warn};

/// The collaborators a suite run depends on.
///
/// Implementations are expected to be idempotent per call: install steps in
/// particular may be retried.
pub trait SuiteEnvironment {
    /// The error type returned by every operation.
    type Error: error::Error + 'static;

    /// Provisions the database on `node` with the given settings.
    fn provision(&mut self, node: &str, settings: &[(String, String)]) -> Result<(), Self::Error>;

    /// Queries the database on `node` for its version string.
    fn fetch_database_version(&mut self, node: &str) -> Result<String, Self::Error>;

    /// Lists the release tags of `org/repo`.
    fn list_release_tags(&mut self, org: &str, repo: &str) -> Result<Vec<String>, Self::Error>;

    /// Clones `repository` at `tag` into `dest` on `node`.
    fn clone_at_tag(
        &mut self,
        repository: &str,
        dest: &Utf8Path,
        tag: &str,
        node: &str,
    ) -> Result<(), Self::Error>;

    /// Runs a single dependency install step on `node`.
    fn install(&mut self, node: &str, step: &InstallStep) -> Result<(), Self::Error>;

    /// Runs the suite command on `node`, capturing its output.
    ///
    /// A command that runs and exits non-zero is not an error.
    fn execute_suite(&mut self, node: &str, command: &str) -> Result<SuiteOutput, Self::Error>;

    /// Waits before retrying a failed install step.
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Output captured from running a suite.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SuiteOutput {
    /// Standard output.
    pub stdout: String,

    /// Standard error.
    pub stderr: String,

    /// The exit code, or `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl SuiteOutput {
    /// Returns stdout and stderr combined, in that order.
    pub fn combined(&self) -> Cow<'_, str> {
        if self.stderr.is_empty() {
            Cow::Borrowed(&self.stdout)
        } else if self.stdout.is_empty() || self.stdout.ends_with('\n') {
            Cow::Owned(format!("{}{}", self.stdout, self.stderr))
        } else {
            Cow::Owned(format!("{}\n{}", self.stdout, self.stderr))
        }
    }
}

/// The result of a successful [`SuiteRun`].
#[derive(Clone, Debug)]
pub struct SuiteRunOutcome {
    /// The reconciled report.
    pub report: RunReport,

    /// The tag the suite was run at.
    pub tested_tag: String,

    /// The latest upstream release, if it could be determined.
    pub latest_tag: Option<UpstreamTag>,

    /// The suite's exit code.
    pub exit_code: Option<i32>,
}

/// A single ORM test run against one node.
#[derive(Clone, Debug)]
pub struct SuiteRun<'a> {
    suite: &'a SuiteExpectations,
    node: String,
}

impl<'a> SuiteRun<'a> {
    /// Creates a new run of `suite` against `node`.
    pub fn new(suite: &'a SuiteExpectations, node: impl Into<String>) -> Self {
        Self {
            suite,
            node: node.into(),
        }
    }

    /// Runs the suite end to end and reconciles its output.
    pub fn run<E: SuiteEnvironment>(
        &self,
        env: &mut E,
    ) -> Result<SuiteRunOutcome, SuiteRunError<E::Error>> {
        let suite = self.suite;
        let node = self.node.as_str();
        let plan = suite.run_plan().ok_or_else(|| SuiteRunError::NoRunPlan {
            suite: suite.name().to_owned(),
        })?;

        info!(suite = suite.name(), node, "provisioning database");
        env.provision(node, plan.env())
            .map_err(|err| SuiteRunError::Provisioning {
                node: node.to_owned(),
                err,
            })?;

        let database_version =
            env.fetch_database_version(node)
                .map_err(|err| SuiteRunError::FetchVersion {
                    node: node.to_owned(),
                    err,
                })?;
        info!("database version: {}", database_version.trim());

        let latest_tag = self.resolve_latest_tag(env, plan)?;
        let tested_tag = match (suite.supported_tag(), &latest_tag) {
            (Some(supported), latest) => {
                if let Some(latest) = latest {
                    info!("latest {} release is {latest}", suite.name());
                }
                info!("supported {} release is {supported}", suite.name());
                supported.to_owned()
            }
            (None, Some(latest)) => {
                info!(
                    "no supported {} release is pinned, using latest release {latest}",
                    suite.name()
                );
                latest.as_str().to_owned()
            }
            (None, None) => {
                return Err(SuiteRunError::NoReleaseTag {
                    suite: suite.name().to_owned(),
                    pattern: suite.tag_pattern().as_str().to_owned(),
                });
            }
        };

        info!(
            "cloning {} at {tested_tag} into {}",
            plan.repository(),
            plan.checkout_dir()
        );
        env.clone_at_tag(plan.repository(), plan.checkout_dir(), &tested_tag, node)
            .map_err(|err| SuiteRunError::Clone {
                repository: plan.repository().to_owned(),
                tag: tested_tag.clone(),
                err,
            })?;

        for step in plan.install_steps() {
            self.install_step(env, plan, step)?;
        }

        info!("running {} test suite", suite.name());
        let output = env
            .execute_suite(node, plan.command())
            .map_err(|err| SuiteRunError::Execute {
                suite: suite.name().to_owned(),
                err,
            })?;
        match output.exit_code {
            Some(0) => {}
            // Failing tests make the runner exit non-zero.
            Some(code) => warn!("{} suite exited with code {code}", suite.name()),
            None => warn!("{} suite was terminated by a signal", suite.name()),
        }

        let combined = output.combined();
        let input = ReconcileInput {
            raw_output: &combined,
            dialect: None,
            database_version: &database_version,
            upstream_tag: &tested_tag,
        };
        let report = reconcile(suite, &input).map_err(|err| SuiteRunError::Reconcile {
            suite: suite.name().to_owned(),
            err,
        })?;

        Ok(SuiteRunOutcome {
            report,
            tested_tag,
            latest_tag,
            exit_code: output.exit_code,
        })
    }

    fn resolve_latest_tag<E: SuiteEnvironment>(
        &self,
        env: &mut E,
        plan: &RunPlan,
    ) -> Result<Option<UpstreamTag>, SuiteRunError<E::Error>> {
        let Some((org, repo)) = plan.source_org_repo() else {
            debug!(
                "cannot derive org/repo from {}, skipping latest release lookup",
                plan.repository()
            );
            return Ok(None);
        };

        let tags = env
            .list_release_tags(org, repo)
            .map_err(|err| SuiteRunError::LookupTag {
                org: org.to_owned(),
                repo: repo.to_owned(),
                err,
            })?;
        let latest = self
            .suite
            .tag_pattern()
            .latest(tags.iter().map(String::as_str));
        if latest.is_none() {
            debug!(
                "none of the {} tags of {org}/{repo} match `{}`",
                tags.len(),
                self.suite.tag_pattern().as_str()
            );
        }
        Ok(latest)
    }

    fn install_step<E: SuiteEnvironment>(
        &self,
        env: &mut E,
        plan: &RunPlan,
        step: &InstallStep,
    ) -> Result<(), SuiteRunError<E::Error>> {
        let policy = plan.install_retries();
        let total_attempts = policy.total_attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            if attempt > 1 {
                info!(
                    "retrying install step `{}` (attempt {attempt}/{total_attempts})",
                    step.name
                );
            } else {
                info!("install step: {}", step.name);
            }

            match env.install(&self.node, step) {
                Ok(()) => return Ok(()),
                Err(err) if attempt < total_attempts => {
                    let delay = policy.delay_for_retry(attempt);
                    warn!(
                        "install step `{}` failed, retrying in {delay:?}: {}",
                        step.name,
                        DisplayErrorChain::new(&err),
                    );
                    env.sleep(delay);
                }
                Err(err) => {
                    debug!(
                        "install step `{}` failed after {attempt} {}",
                        step.name,
                        plural::attempts_str(attempt)
                    );
                    return Err(SuiteRunError::Install {
                        step: step.name.clone(),
                        attempts: attempt,
                        err,
                    });
                }
            }
        }
    }
}
