// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8PathBuf;
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::{Result, ensure};
use indoc::indoc;
use maplit::btreemap;
use ormtest_metadata::{TestIdentifier, Verdict};
use ormtest_runner::{
    errors::ExpectationsParseErrorKind,
    expectations::{Expectation, ExpectationStore},
    parse::OutputDialect,
    reconciler::{ReconcileInput, reconcile},
};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;

const PGX_SUITE: &str = indoc! {r#"
    [suites.pgx]
    dialect = "go-test"
    tag-pattern = '^v(?P<major>\d+)\.(?P<minor>\d+)\.(?P<point>\d+)$'

    [suites.pgx.scopes.current]
    database = ">=23.1.0"
    blocklist = [
        { test = "github.com/jackc/pgx/v5.TestConnectTLS", reason = "TLS setup" },
        { test = "github.com/jackc/pgx/v5.TestListenNotify", reason = "LISTEN is unsupported" },
    ]

    [suites.pgx.scopes.legacy]
    database = "*"
    blocklist = []
"#};

const ASYNCPG_OVERRIDE: &str = indoc! {r#"
    [suites.asyncpg.scopes.crdb]
    blocklist = [
        { test = "tests.test_copy.TestCopy.test_copy_to_table", reason = "COPY TO" },
    ]
"#};

fn write_files(files: &[(&str, &str)]) -> Result<(Utf8TempDir, Vec<Utf8PathBuf>)> {
    let dir = camino_tempfile::Builder::new()
        .prefix("ormtest-expectations-")
        .tempdir()?;
    let mut paths = Vec::with_capacity(files.len());
    for (name, contents) in files {
        let path = dir.path().join(name);
        std::fs::write(&path, contents)?;
        paths.push(path);
    }
    Ok((dir, paths))
}

#[test]
fn later_files_layer_on_top() -> Result<()> {
    let (_dir, paths) = write_files(&[("pgx.toml", PGX_SUITE), ("asyncpg.toml", ASYNCPG_OVERRIDE)])?;
    let store = ExpectationStore::from_sources(&paths)?;

    let names: Vec<_> = store.suites().map(|suite| suite.name()).collect();
    assert_eq!(names, ["asyncpg", "pgx"]);

    // The redefined list replaces the built-in one outright, while the rest of
    // the scope is kept.
    let asyncpg = store.suite("asyncpg")?;
    let crdb = &asyncpg.scopes()[0];
    assert_eq!(crdb.name(), "crdb");
    assert_eq!(crdb.blocklist().len(), 1);
    assert_eq!(crdb.ignorelist().len(), 1);
    assert_eq!(
        crdb.lookup("tests.test_listeners.TestListeners.test_listen_01"),
        Expectation::Pass
    );
    ensure!(asyncpg.run_plan().is_some(), "run plan is kept from the built-in data");

    let pgx = store.suite("pgx")?;
    assert_eq!(pgx.dialect(), OutputDialect::GoTest);
    let scope_names: Vec<_> = pgx.scopes().iter().map(|scope| scope.name()).collect();
    assert_eq!(scope_names, ["current", "legacy"]);

    Ok(())
}

#[test]
fn reconcile_with_layered_suite() -> Result<()> {
    let (_dir, paths) = write_files(&[("pgx.toml", PGX_SUITE)])?;
    let store = ExpectationStore::from_sources(&paths)?;
    let pgx = store.suite("pgx")?;

    let output = indoc! {"
        === RUN   TestConnect
        --- PASS: TestConnect (0.01s)
        === RUN   TestConnectTLS
        --- FAIL: TestConnectTLS (0.02s)
            connect_test.go:88: x509: certificate signed by unknown authority
        === RUN   TestQueryRow
        --- FAIL: TestQueryRow (0.00s)
            query_test.go:12: unexpected row count
        FAIL
        FAIL	github.com/jackc/pgx/v5	0.112s
    "};
    let input = ReconcileInput {
        raw_output: output,
        dialect: None,
        database_version: "v23.2.0",
        upstream_tag: "v5.4.3",
    };
    let report = reconcile(pgx, &input)?;

    assert_eq!(report.scope_name(), "current");
    let verdicts: BTreeMap<_, _> = report
        .results()
        .iter()
        .map(|result| (result.id.as_str(), result.verdict))
        .collect();
    assert_eq!(
        verdicts,
        btreemap! {
            "github.com/jackc/pgx/v5.TestConnect" => Verdict::ExpectedPass,
            "github.com/jackc/pgx/v5.TestConnectTLS" => Verdict::ExpectedFailure,
            "github.com/jackc/pgx/v5.TestQueryRow" => Verdict::Regression,
        }
    );
    assert!(!report.accepted());
    assert_eq!(report.regressions(), [&TestIdentifier::new("github.com/jackc/pgx/v5.TestQueryRow")]);
    assert_eq!(
        report.results()[2].diagnostic.as_deref(),
        Some("query_test.go:12: unexpected row count")
    );
    assert_eq!(
        report.not_run(),
        [(TestIdentifier::new("github.com/jackc/pgx/v5.TestListenNotify"), "LISTEN is unsupported".to_owned())]
    );

    // An older database falls through to the second scope.
    let input = ReconcileInput {
        database_version: "v22.2.9",
        ..input
    };
    let report = reconcile(pgx, &input)?;
    assert_eq!(report.scope_name(), "legacy");
    assert_eq!(report.counts().regression, 2);

    Ok(())
}

#[test]
fn errors_are_attributed_to_their_file() -> Result<()> {
    let broken = indoc! {r#"
        [suites.asyncpg.scopes.crdb]
        ignorelist = [
            { test = "tests.test_pool.TestPool.test_pool_01", reason = "flaky" },
            { test = "tests.test_pool.TestPool.test_pool_01", reason = "flaky" },
        ]
    "#};
    let (_dir, paths) = write_files(&[("pgx.toml", PGX_SUITE), ("broken.toml", broken)])?;

    let error = ExpectationStore::from_sources(&paths).expect_err("duplicate entries are rejected");
    assert_eq!(error.config_file(), Some(&paths[1]));
    ensure!(
        matches!(
            error.kind(),
            ExpectationsParseErrorKind::DuplicateEntry { list: "ignorelist", .. }
        ),
        "unexpected error kind: {:?}",
        error.kind()
    );

    Ok(())
}
