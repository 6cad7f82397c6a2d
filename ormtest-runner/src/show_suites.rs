// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    expectations::{ExpectationScope, ExpectationStore, SuiteExpectations},
    helpers::plural,
};
use ormtest_metadata::TestIdentifier;
use owo_colors::{OwoColorize, Style};
use std::io::{self, Write};

/// Shows the suites and expectation scopes in an [`ExpectationStore`].
#[derive(Debug)]
pub struct ShowSuites<'a> {
    store: &'a ExpectationStore,
    verbose: bool,
}

impl<'a> ShowSuites<'a> {
    /// Creates a new `ShowSuites`. If `verbose` is true, every list entry is
    /// shown along with its reason.
    pub fn new(store: &'a ExpectationStore, verbose: bool) -> Self {
        Self { store, verbose }
    }

    /// Writes the suites in a human-friendly format.
    pub fn write_human(&self, writer: &mut dyn Write, colorize: bool) -> io::Result<()> {
        static INDENT: &str = "    ";

        let mut styles = Styles::default();
        if colorize {
            styles.colorize();
        }

        for suite in self.store.suites() {
            writeln!(
                writer,
                "suite: {} (dialect: {})",
                suite.name().style(styles.suite),
                suite.dialect().style(styles.dialect),
            )?;
            writeln!(writer, "{INDENT}tag pattern: {}", suite.tag_pattern().as_str())?;
            match suite.supported_tag() {
                Some(tag) => writeln!(writer, "{INDENT}supported tag: {}", tag.style(styles.tag))?,
                None => writeln!(writer, "{INDENT}supported tag: (latest release)")?,
            }
            write_run_plan(suite, &styles, writer)?;

            if suite.scopes().is_empty() {
                writeln!(writer, "{INDENT}(no scopes)")?;
                continue;
            }
            writeln!(writer, "{INDENT}scopes:")?;
            for scope in suite.scopes() {
                self.write_scope(scope, &styles, writer)?;
            }
        }

        Ok(())
    }

    fn write_scope(
        &self,
        scope: &ExpectationScope,
        styles: &Styles,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        static INDENT: &str = "      ";

        writeln!(
            writer,
            "{INDENT}- {}: {} blocklisted, {} ignored",
            scope.style(styles.scope),
            scope.blocklist().len().style(styles.count),
            scope.ignorelist().len().style(styles.count),
        )?;
        if !self.verbose {
            return Ok(());
        }

        write_list("blocklist", scope.blocklist(), styles, writer)?;
        write_list("ignorelist", scope.ignorelist(), styles, writer)
    }
}

fn write_list<'b>(
    name: &str,
    list: impl ExactSizeIterator<Item = (&'b TestIdentifier, &'b str)>,
    styles: &Styles,
    writer: &mut dyn Write,
) -> io::Result<()> {
    static INDENT: &str = "        ";

    if list.len() == 0 {
        return Ok(());
    }
    writeln!(writer, "{INDENT}{name}:")?;
    for (test, reason) in list {
        writeln!(writer, "{INDENT}  {}: {reason}", test.style(styles.test))?;
    }
    Ok(())
}

fn write_run_plan(
    suite: &SuiteExpectations,
    styles: &Styles,
    writer: &mut dyn Write,
) -> io::Result<()> {
    let Some(plan) = suite.run_plan() else {
        return writeln!(writer, "    run plan: (none)");
    };
    let steps = plan.install_steps().len();
    writeln!(
        writer,
        "    run plan: {} ({} install {}, up to {} {} each)",
        plan.repository(),
        steps.style(styles.count),
        if steps == 1 { "step" } else { "steps" },
        plan.install_retries().total_attempts().style(styles.count),
        plural::attempts_str(plan.install_retries().total_attempts()),
    )
}

#[derive(Clone, Debug, Default)]
struct Styles {
    suite: Style,
    dialect: Style,
    tag: Style,
    scope: Style,
    count: Style,
    test: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.suite = Style::new().blue().bold();
        self.dialect = Style::new().magenta().bold();
        self.tag = Style::new().green().bold();
        self.scope = Style::new().bold();
        self.count = Style::new().bold();
        self.test = Style::new().cyan();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    const EXPECTATIONS: &str = indoc! {r#"
        [suites.demo]
        dialect = "tap"
        tag-pattern = '^v(?P<major>\d+)\.(?P<minor>\d+)\.(?P<point>\d+)$'

        [suites.demo.scopes.new]
        database = ">=23.1.0"
        upstream = ">=2.0.0"
        blocklist = [{ test = "3", reason = "savepoints" }]

        [suites.demo.scopes.old]
        database = "<23.1.0"
        ignorelist = [{ test = "7", reason = "flaky" }]

        [suites.bare]
        dialect = "libtest"
        tag-pattern = '^(?P<major>\d+)\.(?P<minor>\d+)\.(?P<point>\d+)$'
        supported-tag = "1.0.0"

        [suites.bare.run]
        repository = "https://example.com/bare.git"
        checkout-dir = "/tmp/bare"
        command = "cargo test"
        install-retries = 2
        install-steps = [{ name = "fetch", command = "cargo fetch" }]
    "#};

    fn show(verbose: bool) -> String {
        let store = ExpectationStore::from_toml_str(EXPECTATIONS).unwrap();
        let mut out = Vec::new();
        ShowSuites::new(&store, verbose)
            .write_human(&mut out, false)
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn show_suites() {
        insta::assert_snapshot!(show(false), @r"
        suite: demo (dialect: tap)
            tag pattern: ^v(?P<major>\d+)\.(?P<minor>\d+)\.(?P<point>\d+)$
            supported tag: (latest release)
            run plan: (none)
            scopes:
              - new (database >=23.1.0, upstream >=2.0.0): 1 blocklisted, 0 ignored
              - old (database <23.1.0): 0 blocklisted, 1 ignored
        suite: bare (dialect: libtest)
            tag pattern: ^(?P<major>\d+)\.(?P<minor>\d+)\.(?P<point>\d+)$
            supported tag: 1.0.0
            run plan: https://example.com/bare.git (1 install step, up to 3 attempts each)
            (no scopes)
        ");
    }

    #[test]
    fn show_suites_verbose() {
        let out = show(true);
        let expected = [
            "      - new (database >=23.1.0, upstream >=2.0.0): 1 blocklisted, 0 ignored",
            "        blocklist:",
            "          3: savepoints",
            "      - old (database <23.1.0): 0 blocklisted, 1 ignored",
            "        ignorelist:",
            "          7: flaky",
        ]
        .join("\n");
        assert!(
            out.contains(&expected),
            "verbose output lists entries:\n{out}"
        );
    }
}
