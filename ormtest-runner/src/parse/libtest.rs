// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{DialectParser, ParsedResult, ResultCollector};
use camino::Utf8Path;
use ormtest_metadata::RawOutcome;
use regex::Regex;
use std::sync::LazyLock;

static RESULT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^test (?P<name>.+?) \.\.\. (?P<result>ok|FAILED|ignored|bench:)(?:,? (?P<reason>.*))?$")
        .expect("result line regex is valid")
});

static STDOUT_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^---- (?P<name>.+?) stdout ----$").expect("stdout header regex is valid")
});

// Running unittests src/lib.rs (target/debug/deps/tokio_postgres-5d0f2c1a9b8e7f60)
// Running target/debug/deps/conn-0a1b2c3d4e5f6789
static RUNNING_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*Running (?:.*\((?P<paren>[^()]+)\)|(?P<bare>\S+))$")
        .expect("running header regex is valid")
});

static DOC_TESTS_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*Doc-tests (?P<crate_name>\S+)$").expect("doc-tests header regex is valid")
});

/// Parser for the output of Rust's libtest harness.
///
/// `cargo test` runs one binary per target, and test paths are only unique
/// within a binary. Once a `Running` or `Doc-tests` header has been seen,
/// tests are identified as `<binary> <test path>`, where the binary name is
/// the executable's file stem without cargo's hash suffix. Output from a
/// single binary run directly has no header and keeps bare test paths.
///
/// Captured stdout sections (`---- name stdout ----`) are attached to their
/// failing tests as diagnostics.
pub(super) struct LibtestParser;

impl DialectParser for LibtestParser {
    fn parse(&self, input: &str, collector: &mut ResultCollector) {
        let lines: Vec<&str> = input.lines().collect();
        let mut binary: Option<String> = None;
        let mut idx = 0;
        while idx < lines.len() {
            let line = lines[idx].trim_end();
            idx += 1;

            if let Some(captures) = RUNNING_HEADER.captures(line) {
                let path = captures
                    .name("paren")
                    .or_else(|| captures.name("bare"))
                    .map_or("", |m| m.as_str());
                binary = Some(binary_name(path).to_owned());
                continue;
            }
            if let Some(captures) = DOC_TESTS_HEADER.captures(line) {
                binary = Some(captures["crate_name"].to_owned());
                continue;
            }

            if let Some(captures) = RESULT_LINE.captures(line) {
                let name = scoped_id(binary.as_deref(), test_name(&captures["name"]));
                let mut result = match &captures["result"] {
                    "ok" | "bench:" => ParsedResult::new(name, RawOutcome::Pass),
                    "FAILED" => ParsedResult::new(name, RawOutcome::Fail),
                    // "ignored"
                    _ => ParsedResult::new(name, RawOutcome::Skip),
                };
                if result.outcome == RawOutcome::Skip {
                    result.diagnostic = captures
                        .name("reason")
                        .map(|m| m.as_str().trim().to_owned())
                        .filter(|reason| !reason.is_empty());
                }
                collector.push(result);
                continue;
            }

            if let Some(captures) = STDOUT_HEADER.captures(line) {
                let start = idx;
                while idx < lines.len() && !is_section_end(lines[idx]) {
                    idx += 1;
                }
                let body = lines[start..idx].join("\n");
                let body = body.trim();
                if !body.is_empty() {
                    let id = scoped_id(binary.as_deref(), test_name(&captures["name"]));
                    collector.attach_diagnostic(&id, body);
                }
            }
        }
    }
}

fn scoped_id(binary: Option<&str>, name: &str) -> String {
    match binary {
        Some(binary) => format!("{binary} {name}"),
        None => name.to_owned(),
    }
}

/// Returns the target name for a test executable path, dropping cargo's
/// `-<hash>` suffix.
fn binary_name(path: &str) -> &str {
    let stem = Utf8Path::new(path).file_stem().unwrap_or(path);
    match stem.rsplit_once('-') {
        Some((name, hash))
            if !name.is_empty() && hash.len() >= 8 && hash.bytes().all(|b| b.is_ascii_hexdigit()) =>
        {
            name
        }
        _ => stem,
    }
}

/// Strips annotations libtest appends to test names.
fn test_name(raw: &str) -> &str {
    raw.strip_suffix(" - should panic").unwrap_or(raw)
}

fn is_section_end(line: &str) -> bool {
    let line = line.trim_end();
    STDOUT_HEADER.is_match(line)
        || line == "failures:"
        || line == "successes:"
        || line.starts_with("test result:")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{OutputDialect, parse_output};
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn libtest_run() {
        let input = indoc! {"
            running 5 tests
            test pool::tests::acquire ... ok
            test pool::tests::release ... FAILED
            test codec::tests::decode_numeric ... ignored, numeric is unsupported
            test codec::tests::overflow - should panic ... ok
            test src/lib.rs - Connection::query (line 42) ... ok

            failures:

            ---- pool::tests::release stdout ----
            thread 'pool::tests::release' panicked at src/pool.rs:88:9:
            assertion `left == right` failed
              left: 1
             right: 0

            failures:
                pool::tests::release

            test result: FAILED. 3 passed; 1 failed; 1 ignored; 0 measured; 0 filtered out
        "};

        let results = parse_output(input, OutputDialect::Libtest)
            .expect("output parsed")
            .into_results();
        assert_eq!(
            results,
            vec![
                ParsedResult::new("pool::tests::acquire", RawOutcome::Pass),
                ParsedResult::new("pool::tests::release", RawOutcome::Fail).with_diagnostic(
                    "thread 'pool::tests::release' panicked at src/pool.rs:88:9:\n\
                     assertion `left == right` failed\n  left: 1\n right: 0"
                ),
                ParsedResult::new("codec::tests::decode_numeric", RawOutcome::Skip)
                    .with_diagnostic("numeric is unsupported"),
                ParsedResult::new("codec::tests::overflow", RawOutcome::Pass),
                ParsedResult::new("src/lib.rs - Connection::query (line 42)", RawOutcome::Pass),
            ]
        );
    }

    #[test]
    fn bench_lines_count_as_passes() {
        let input = "test bench_parse ... bench:       1,234 ns/iter (+/- 56)\n";
        let results = parse_output(input, OutputDialect::Libtest).unwrap().into_results();
        assert_eq!(results, vec![ParsedResult::new("bench_parse", RawOutcome::Pass)]);
    }

    #[test]
    fn same_path_in_different_binaries() {
        let input = indoc! {"
                 Running unittests src/lib.rs (target/debug/deps/tokio_postgres-5d0f2c1a9b8e7f60)

            running 1 test
            test tests::connect ... FAILED

            failures:

            ---- tests::connect stdout ----
            connection refused

            failures:
                tests::connect

            test result: FAILED. 0 passed; 1 failed; 0 ignored; 0 measured; 0 filtered out

                 Running tests/runtime.rs (target/debug/deps/runtime-0a1b2c3d4e5f6789)

            running 1 test
            test tests::connect ... ok

            test result: ok. 1 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out

               Doc-tests tokio_postgres

            running 1 test
            test src/lib.rs - Client::connect (line 12) ... ok
        "};

        let results = parse_output(input, OutputDialect::Libtest)
            .expect("output parsed")
            .into_results();
        assert_eq!(
            results,
            vec![
                ParsedResult::new("tokio_postgres tests::connect", RawOutcome::Fail)
                    .with_diagnostic("connection refused"),
                ParsedResult::new("runtime tests::connect", RawOutcome::Pass),
                ParsedResult::new(
                    "tokio_postgres src/lib.rs - Client::connect (line 12)",
                    RawOutcome::Pass
                ),
            ]
        );
    }

    #[test]
    fn binary_names_drop_hash_suffix() {
        assert_eq!(binary_name("target/debug/deps/tokio_postgres-5d0f2c1a9b8e7f60"), "tokio_postgres");
        assert_eq!(binary_name("target/debug/deps/conn-0a1b2c3d4e5f6789.exe"), "conn");
        assert_eq!(binary_name("target/debug/examples/pg-bench"), "pg-bench");
    }
}
