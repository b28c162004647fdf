// Copyright 2021 - 2025 Martin Pool

//! End-to-end tests driving the built binary against the reference
//! file-backed `MutationSource`/`TestDiscovery`/`TestHarness` adapters, the
//! only way to exercise the whole pipeline without a real build tool wired
//! in (`src/harness.rs`).

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;

const BIN_NAME: &str = "mutation-matrix";

/// A tiny "project": one text file standing in for a class, one shell
/// script standing in for the test suite, wired through the reference
/// adapters (`FileMutationSource`, `FileTestDiscovery`, `CommandTestHarness`).
///
/// The one test, `test_value`, passes exactly when `calc.txt` still
/// contains `VALUE=2`; the one mutation replaces that line with
/// `VALUE=3`, so the test kills it.
struct Project {
    dir: tempfile::TempDir,
}

impl Project {
    fn new() -> Project {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("calc.txt"), "START\nVALUE=2\n").unwrap();
        fs::write(
            dir.path().join("check.sh"),
            "#!/bin/sh\ngrep -q VALUE=2 calc.txt\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("tests.index"),
            "# one test, asserting VALUE=2\ncalc.txt test_value\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("mutations.toml"),
            r#"
            [[mutations]]
            line = 2
            covering_tests = ["test_value"]
            [mutations.id]
            class_name = "calc.txt"
            method = "m()->()"
            mutator_tag = "line_replace:VALUE=3"
            ordinal = 0
            "#,
        )
        .unwrap();
        Project { dir }
    }

    fn path(&self) -> &std::path::Path {
        self.dir.path()
    }

    fn command(&self, out: &std::path::Path) -> Command {
        let mut cmd = Command::cargo_bin(BIN_NAME).unwrap();
        cmd.arg("--dir")
            .arg(self.path())
            .arg("--out")
            .arg(out)
            .arg("--test-command")
            .arg("sh check.sh {test}");
        cmd
    }
}

#[test]
fn full_matrix_research_mode_kills_the_mutant_and_writes_the_csv() {
    let project = Project::new();
    let out = project.path().join("out");

    project
        .command(&out)
        .arg("--full-matrix-research-mode")
        .arg("--quiet")
        .assert()
        .success(); // the one mutation is killed, so nothing survived

    let csv = fs::read_to_string(out.join("mutation-matrix.csv")).unwrap();
    let mut lines = csv.lines();
    let header = lines.next().unwrap();
    assert!(header.contains("mutationId"));
    assert!(header.contains("killer"));
    let row = lines.next().expect("one data row");
    assert!(row.contains("calc.txt"));
    assert!(row.contains("test_value"));
    assert!(row.contains("true")); // killer
    assert!(lines.next().is_none());
}

#[test]
fn list_flag_prints_candidates_without_running_them() {
    let project = Project::new();
    let out = project.path().join("out");

    project
        .command(&out)
        .arg("--list")
        .assert()
        .success()
        .stdout(predicate::str::contains("calc.txt"));

    assert!(!out.join("mutation-matrix.csv").exists());
}

#[test]
fn list_json_emits_the_mutator_tag_field() {
    let project = Project::new();
    let out = project.path().join("out");

    project
        .command(&out)
        .arg("--list")
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("mutator_tag"));
}

#[test]
fn require_clean_baseline_aborts_when_a_test_already_fails() {
    let project = Project::new();
    // Make the one test fail from the start.
    fs::write(project.path().join("calc.txt"), "START\nVALUE=999\n").unwrap();
    let out = project.path().join("out");

    project
        .command(&out)
        .arg("--require-clean-baseline")
        .assert()
        .code(4); // exit_code::BASELINE_FAILED
}
