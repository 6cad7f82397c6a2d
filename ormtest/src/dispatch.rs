// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command-line parsing and command execution.

use crate::{
    ExpectedError, Result,
    output::{NO_HEADING_TARGET, OutputContext, OutputOpts, OutputWriter, clap_styles},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ormtest_metadata::OrmTestExitCode;
use ormtest_runner::{
    expectations::ExpectationStore,
    parse::OutputDialect,
    reconciler::{ReconcileInput, reconcile},
    reporter::{FinalStatus, RunReport},
    show_suites::ShowSuites,
};
use std::io::{self, Read, Write};

/// Reconciles ORM and driver test suite output against curated expectations.
///
/// Upstream test suites are run against the database under test, and their
/// output is compared with per-suite blocklists and ignorelists to decide
/// whether anything regressed.
#[derive(Debug, Parser)]
#[command(
    version,
    bin_name = "ormtest",
    styles = clap_styles::style(),
    max_term_width = 100
)]
pub struct OrmTestApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(flatten)]
    expectation_opts: ExpectationOpts,

    #[clap(subcommand)]
    command: Command,
}

impl OrmTestApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app.
    ///
    /// Returns the exit code.
    pub fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        let store = self.expectation_opts.make_store()?;
        match self.command {
            Command::Reconcile(opts) => opts.exec(&store, output, output_writer),
            Command::ShowSuites => {
                let mut writer = output_writer.stdout_writer();
                ShowSuites::new(&store, output.verbose)
                    .write_human(&mut writer, output.colorize_stdout())
                    .and_then(|()| writer.flush())
                    .map_err(|err| ExpectedError::WriteError { err })?;
                Ok(OrmTestExitCode::OK)
            }
        }
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Expectation options")]
struct ExpectationOpts {
    /// Expectation file to layer on top of the built-in data
    ///
    /// May be specified multiple times. Later files take precedence.
    #[arg(long = "expectations", global = true, value_name = "PATH")]
    expectations: Vec<Utf8PathBuf>,
}

impl ExpectationOpts {
    fn make_store(&self) -> Result<ExpectationStore> {
        Ok(ExpectationStore::from_sources(&self.expectations)?)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconcile captured test output against expectations
    ///
    /// Reads the combined stdout and stderr of an upstream test run, classifies
    /// every test against the expectation scope for the given database version
    /// and upstream tag, and prints a report.
    ///
    /// Exits with 0 if nothing regressed, 100 if there are regressions and 4 if
    /// the output contained no tests.
    Reconcile(ReconcileOpts),

    /// Show the known suites and their expectation scopes
    ShowSuites,
}

#[derive(Debug, Args)]
struct ReconcileOpts {
    /// Name of the suite that produced the output
    #[arg(long, value_name = "NAME", env = "ORMTEST_SUITE")]
    suite: String,

    /// Version string reported by the database under test
    #[arg(long, value_name = "VERSION")]
    database_version: String,

    /// Upstream release tag that was tested
    #[arg(long, value_name = "TAG")]
    upstream_tag: String,

    /// Dialect of the captured output [default: the suite's dialect]
    #[arg(long, value_name = "DIALECT")]
    dialect: Option<OutputDialect>,

    /// File containing the captured output, or `-` for standard input
    #[arg(long, short, value_name = "PATH", default_value = "-")]
    input: Utf8PathBuf,

    /// Output format
    #[arg(
        long,
        short = 'T',
        value_enum,
        default_value_t,
        help_heading = "Output options",
        value_name = "FMT"
    )]
    message_format: MessageFormat,

    /// Also print a blocklist that matches the current failures
    #[arg(long, help_heading = "Output options")]
    suggest_blocklist: bool,
}

impl ReconcileOpts {
    fn exec(
        self,
        store: &ExpectationStore,
        output: OutputContext,
        output_writer: &mut OutputWriter,
    ) -> Result<i32> {
        let suite = store.suite(&self.suite)?;
        let raw_output = read_input(&self.input)?;

        let input = ReconcileInput {
            raw_output: &raw_output,
            dialect: self.dialect,
            database_version: &self.database_version,
            upstream_tag: &self.upstream_tag,
        };
        let report = reconcile(suite, &input)
            .map_err(|err| ExpectedError::reconcile_error(suite.name(), err))?;

        let mut writer = output_writer.stdout_writer();
        match self.message_format {
            MessageFormat::Human => {
                let mut display = report.display().verbose(output.verbose);
                if output.colorize_stdout() {
                    display = display.colorize();
                }
                write!(writer, "{display}").map_err(|err| ExpectedError::WriteError { err })?;
                if self.suggest_blocklist
                    && let Some(suggested) = report.suggested_blocklist()
                {
                    write!(
                        writer,
                        "\nSuggested blocklist for scope `{}`:\n{suggested}",
                        report.scope_name()
                    )
                    .map_err(|err| ExpectedError::WriteError { err })?;
                }
            }
            MessageFormat::Json => {
                serde_json::to_writer_pretty(&mut writer, &report.to_summary())
                    .map_err(|err| ExpectedError::SerializeError { err })?;
                writeln!(writer).map_err(|err| ExpectedError::WriteError { err })?;
                if self.suggest_blocklist {
                    log_suggested_blocklist(&report);
                }
            }
        }
        writer
            .flush()
            .map_err(|err| ExpectedError::WriteError { err })?;

        Ok(exit_code(&report))
    }
}

/// Output formats for `ormtest reconcile`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
enum MessageFormat {
    /// A human-readable report.
    #[default]
    Human,
    /// A machine-readable JSON summary.
    Json,
}

/// Reads captured output, replacing invalid UTF-8 sequences.
fn read_input(path: &Utf8Path) -> Result<String> {
    let bytes = if path.as_str() == "-" {
        let mut bytes = Vec::new();
        io::stdin()
            .read_to_end(&mut bytes)
            .map_err(|err| ExpectedError::input_read_error(None, err))?;
        bytes
    } else {
        std::fs::read(path).map_err(|err| ExpectedError::input_read_error(Some(path.to_owned()), err))?
    };
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn log_suggested_blocklist(report: &RunReport) {
    // stdout holds the JSON summary.
    if let Some(suggested) = report.suggested_blocklist() {
        tracing::info!(
            target: NO_HEADING_TARGET,
            "suggested blocklist for scope `{}`:\n{suggested}",
            report.scope_name()
        );
    }
}

fn exit_code(report: &RunReport) -> i32 {
    match report.final_status() {
        FinalStatus::Accepted => OrmTestExitCode::OK,
        FinalStatus::Rejected { .. } => OrmTestExitCode::REGRESSIONS_FOUND,
        FinalStatus::NoTestsRun => OrmTestExitCode::NO_TESTS_RUN,
    }
}
