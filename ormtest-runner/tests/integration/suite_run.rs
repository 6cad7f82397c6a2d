// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8Path;
use color_eyre::eyre::{Result, ensure};
use indoc::indoc;
use ormtest_metadata::{FinalStatusSummary, TestIdentifier, Verdict};
use ormtest_runner::{
    expectations::{ExpectationStore, InstallStep},
    orchestrate::{SuiteEnvironment, SuiteOutput, SuiteRun},
};
use pretty_assertions::assert_eq;
use std::{convert::Infallible, time::Duration};

/// An environment that succeeds at everything and replays canned output.
struct ReplayEnvironment {
    output: &'static str,
    provisioned_with: Vec<(String, String)>,
    cloned: Option<(String, String)>,
    installed: Vec<String>,
}

impl ReplayEnvironment {
    fn new(output: &'static str) -> Self {
        Self {
            output,
            provisioned_with: Vec::new(),
            cloned: None,
            installed: Vec::new(),
        }
    }
}

impl SuiteEnvironment for ReplayEnvironment {
    type Error = Infallible;

    fn provision(&mut self, _node: &str, settings: &[(String, String)]) -> Result<(), Infallible> {
        self.provisioned_with = settings.to_vec();
        Ok(())
    }

    fn fetch_database_version(&mut self, _node: &str) -> Result<String, Infallible> {
        Ok("CockroachDB CCL v23.1.11 (x86_64-pc-linux-gnu, built 2023/09/27)".to_owned())
    }

    fn list_release_tags(&mut self, org: &str, repo: &str) -> Result<Vec<String>, Infallible> {
        assert_eq!((org, repo), ("MagicStack", "asyncpg"));
        Ok(vec!["v0.24.0".to_owned(), "v0.29.0".to_owned(), "v0.30.0rc1".to_owned()])
    }

    fn clone_at_tag(
        &mut self,
        repository: &str,
        _dest: &Utf8Path,
        tag: &str,
        _node: &str,
    ) -> Result<(), Infallible> {
        self.cloned = Some((repository.to_owned(), tag.to_owned()));
        Ok(())
    }

    fn install(&mut self, _node: &str, step: &InstallStep) -> Result<(), Infallible> {
        self.installed.push(step.name.clone());
        Ok(())
    }

    fn execute_suite(&mut self, _node: &str, _command: &str) -> Result<SuiteOutput, Infallible> {
        Ok(SuiteOutput {
            stdout: String::new(),
            stderr: self.output.to_owned(),
            exit_code: Some(1),
        })
    }

    fn sleep(&mut self, _duration: Duration) {
        panic!("no install step fails, so nothing should be retried");
    }
}

const ASYNCPG_OUTPUT: &str = indoc! {"
    test_copy_from_query_basics (tests.test_copy.TestCopyFrom) ... ok
    test_listen_01 (tests.test_listeners.TestListeners) ... ERROR
    test_listen_02 (tests.test_listeners.TestListeners) ... ok
    test_pool_01 (tests.test_pool.TestPool) ... FAIL
    test_pool_handles_inactive_connection_errors (tests.test_pool.TestPool) ... FAIL
    test_ssl_connection (tests.test_connect.TestSSLConnection) ... skipped 'SSL is not configured'

    ======================================================================
    ERROR: test_listen_01 (tests.test_listeners.TestListeners)
    ----------------------------------------------------------------------
    Traceback (most recent call last):
      File \"/mnt/data1/asyncpg/tests/test_listeners.py\", line 22, in test_listen_01
    asyncpg.exceptions.FeatureNotSupportedError: unimplemented: LISTEN

    ======================================================================
    FAIL: test_pool_01 (tests.test_pool.TestPool)
    ----------------------------------------------------------------------
    Traceback (most recent call last):
      File \"/mnt/data1/asyncpg/tests/test_pool.py\", line 57, in test_pool_01
    AssertionError: 1 != 2

    ----------------------------------------------------------------------
    Ran 6 tests in 4.210s

    FAILED (failures=2, errors=1, skipped=1)
"};

#[test]
fn asyncpg_run_with_builtin_expectations() -> Result<()> {
    let store = ExpectationStore::from_sources(Vec::<&Utf8Path>::new())?;
    let suite = store.suite("asyncpg")?;
    let mut env = ReplayEnvironment::new(ASYNCPG_OUTPUT);

    let outcome = SuiteRun::new(suite, "n1").run(&mut env)?;

    // The pinned tag is tested even though newer releases exist.
    assert_eq!(outcome.tested_tag, "v0.24.0");
    assert_eq!(
        outcome.latest_tag.as_ref().map(|tag| tag.as_str()),
        Some("v0.29.0")
    );
    assert_eq!(
        env.cloned,
        Some((
            "https://github.com/MagicStack/asyncpg.git".to_owned(),
            "v0.24.0".to_owned()
        ))
    );
    assert_eq!(env.installed.len(), 5);
    ensure!(
        env.provisioned_with.iter().any(|(key, value)| key
            == "COCKROACH_INTERNAL_DISABLE_METAMORPHIC_TESTING"
            && value == "true"),
        "metamorphic testing is disabled"
    );

    let report = &outcome.report;
    assert_eq!(report.scope_name(), "crdb");
    let counts = report.counts();
    assert_eq!(counts.total(), 6);
    assert_eq!(counts.get(Verdict::ExpectedPass), 1);
    assert_eq!(counts.get(Verdict::ExpectedFailure), 1);
    assert_eq!(counts.get(Verdict::UnexpectedPass), 1);
    assert_eq!(counts.get(Verdict::Regression), 1);
    assert_eq!(counts.get(Verdict::Ignored), 1);
    assert_eq!(counts.get(Verdict::Skipped), 1);

    assert!(!report.accepted());
    assert_eq!(
        report.regressions(),
        [&TestIdentifier::new("tests.test_pool.TestPool.test_pool_01")]
    );
    assert_eq!(
        report.unexpected_passes(),
        [&TestIdentifier::new("tests.test_listeners.TestListeners.test_listen_02")]
    );
    let not_run: Vec<_> = report.not_run().iter().map(|(test, _)| test.as_str()).collect();
    assert_eq!(
        not_run,
        ["tests.test_adversarial.TestAdvisoryLocks.test_pg_advisory_lock"]
    );

    let text = report.to_text();
    ensure!(
        text.contains("    tests.test_pool.TestPool.test_pool_01: AssertionError: 1 != 2\n"),
        "regression is listed with its exception:\n{text}"
    );
    ensure!(
        text.contains(
            "    tests.test_connect.TestSSLConnection.test_ssl_connection: SSL is not configured\n"
        ),
        "skip is listed with its reason:\n{text}"
    );
    ensure!(text.ends_with("Result: REJECTED (1 regression)\n"), "{text}");

    let suggested = report
        .suggested_blocklist()
        .expect("a rejected run suggests a blocklist");
    assert_eq!(
        suggested,
        indoc! {r#"
            blocklist = [
                { test = "tests.test_listeners.TestListeners.test_listen_01", reason = "https://github.com/cockroachdb/cockroach/issues/41522" },
                { test = "tests.test_pool.TestPool.test_pool_01", reason = "unknown" },
            ]
        "#}
    );

    let summary = report.to_summary();
    assert_eq!(summary.status, FinalStatusSummary::Rejected);
    assert_eq!(summary.scope.upstream_tag, "v0.24.0");
    assert_eq!(summary.scope.database_version, "23.1.11");

    Ok(())
}
