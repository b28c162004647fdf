// Copyright 2021 - 2025 Martin Pool

//! The research-mode matrix CSV (spec.md §6 "On-disk output"): one row per
//! `(mutation, test)`, with every field CSV-escaped by the `csv` crate and
//! missing values written as the literal `"None"` (spec.md §3).
//!
//! Report formats beyond this one matrix (HTML, etc.) are out of scope
//! (spec.md §1).
//!
//! [`MatrixWriter`] appends each work unit's rows to disk as soon as that
//! unit finishes, rather than holding the whole run's per-test detail in
//! memory until the end (spec.md §4.4 "Memory discipline": materialize into
//! the report record and drop from in-memory maps before the next unit).

use anyhow::{Context, Result};
use camino::Utf8Path;
use serde::Serialize;

use crate::mutation::MutationDetails;
use crate::outcome::{MutationStatusTestPair, NONE_PLACEHOLDER};

/// One row of the matrix CSV.
#[derive(Debug, Serialize)]
struct MatrixRow<'a> {
    mutation_id: String,
    class_name: &'a str,
    method: &'a str,
    line_number: u32,
    mutator: &'a str,
    test_name: &'a str,
    originally_passed: &'a str,
    mutant_passed: &'a str,
    killer: &'a str,
    elapsed_ms: &'a str,
    exception_type: &'a str,
    exception_message: &'a str,
    stack_trace: &'a str,
}

/// An open matrix CSV, appended to one work unit's worth of rows at a time.
///
/// Rows within a unit are written in `(line, mutatorTag, ordinal)` order;
/// across units, rows land in whatever order the controller's worker pool
/// finishes them, since each unit's detail is dropped once its rows are on
/// disk (spec.md §5: "across units, no ordering is guaranteed").
pub struct MatrixWriter {
    writer: csv::Writer<std::fs::File>,
}

impl MatrixWriter {
    pub fn create(path: &Utf8Path) -> Result<MatrixWriter> {
        let writer = csv::Writer::from_path(path.as_std_path())
            .with_context(|| format!("create matrix CSV {path}"))?;
        Ok(MatrixWriter { writer })
    }

    /// Append one work unit's rows and flush, so the rows are durable (and
    /// the unit's `MutationStatusTestPair`s, including their `test_outcomes`,
    /// can be dropped by the caller) before the next unit is processed.
    pub fn write_unit(
        &mut self,
        unit_results: &[(MutationDetails, MutationStatusTestPair)],
    ) -> Result<()> {
        let mut ordered: Vec<&(MutationDetails, MutationStatusTestPair)> =
            unit_results.iter().collect();
        ordered.sort_by_key(|(details, _)| {
            (
                details.line,
                details.id.mutator_tag.clone(),
                details.id.ordinal,
            )
        });
        for (details, outcome) in ordered {
            self.write_mutation(details, outcome)?;
        }
        self.writer
            .flush()
            .context("flush matrix CSV after work unit")?;
        Ok(())
    }

    fn write_mutation(
        &mut self,
        details: &MutationDetails,
        outcome: &MutationStatusTestPair,
    ) -> Result<()> {
        let mutation_id = details.id.to_string();
        let class_name = details.id.dotted_class();
        if outcome.test_outcomes.is_empty() {
            self.writer
                .serialize(MatrixRow {
                    mutation_id: mutation_id.clone(),
                    class_name: &class_name,
                    method: &details.id.method,
                    line_number: details.line,
                    mutator: &details.id.mutator_tag,
                    test_name: NONE_PLACEHOLDER,
                    originally_passed: NONE_PLACEHOLDER,
                    mutant_passed: NONE_PLACEHOLDER,
                    killer: NONE_PLACEHOLDER,
                    elapsed_ms: NONE_PLACEHOLDER,
                    exception_type: NONE_PLACEHOLDER,
                    exception_message: NONE_PLACEHOLDER,
                    stack_trace: NONE_PLACEHOLDER,
                })
                .with_context(|| format!("write matrix row for {mutation_id}"))?;
            return Ok(());
        }
        for test_outcome in &outcome.test_outcomes {
            let is_killer = outcome
                .killing_tests
                .iter()
                .any(|t| t == &test_outcome.test_name);
            // The baseline value isn't itself transmitted per test; it's
            // recoverable from the detection rule's own definition of a
            // killer (spec.md §4.6: `B[test] != M[test]` iff killer).
            let originally_passed = if is_killer {
                !test_outcome.passed
            } else {
                test_outcome.passed
            };
            self.writer
                .serialize(MatrixRow {
                    mutation_id: mutation_id.clone(),
                    class_name: &class_name,
                    method: &details.id.method,
                    line_number: details.line,
                    mutator: &details.id.mutator_tag,
                    test_name: &test_outcome.test_name,
                    originally_passed: bool_str(originally_passed),
                    mutant_passed: bool_str(test_outcome.passed),
                    killer: bool_str(is_killer),
                    elapsed_ms: &test_outcome.elapsed_ms.to_string(),
                    exception_type: test_outcome.exception_type_or_none(),
                    exception_message: test_outcome.exception_message_or_none(),
                    stack_trace: test_outcome.stack_trace_or_none(),
                })
                .with_context(|| format!("write matrix row for {mutation_id}"))?;
        }
        Ok(())
    }
}

fn bool_str(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mutation::MutationId;
    use crate::outcome::TestOutcome;
    use crate::status::DetectionStatus;

    fn mutation() -> MutationDetails {
        MutationDetails {
            id: MutationId {
                class_name: "pkg/Arith".into(),
                method: "add(i32,i32)->i32".into(),
                mutator_tag: "replace_binary_operator".into(),
                ordinal: 0,
            },
            line: 42,
            covering_tests: vec!["pkg::tests::add_two".into()],
        }
    }

    #[test]
    fn writes_one_row_per_test_outcome() {
        let tmp = tempfile::tempdir().unwrap();
        let path = Utf8Path::from_path(tmp.path()).unwrap().join("matrix.csv");
        let outcome = MutationStatusTestPair {
            tests_run: 1,
            status: Some(DetectionStatus::Killed),
            killing_tests: vec!["pkg::tests::add_two".into()],
            succeeding_tests: vec![],
            covering_tests: vec!["pkg::tests::add_two".into()],
            test_outcomes: vec![TestOutcome::failed(
                "pkg::tests::add_two",
                1.5,
                "AssertionError",
                "2 != -1",
                "at add_two",
            )],
        };
        let mut writer = MatrixWriter::create(&path).unwrap();
        writer.write_unit(&[(mutation(), outcome)]).unwrap();
        let content = std::fs::read_to_string(path.as_std_path()).unwrap();
        let mut lines = content.lines();
        lines.next().unwrap(); // header
        let row = lines.next().unwrap();
        assert!(row.contains("pkg::tests::add_two"));
        assert!(row.contains("true")); // killer
        assert!(row.contains("AssertionError"));
    }

    #[test]
    fn mutation_with_no_outcomes_still_gets_one_row() {
        let tmp = tempfile::tempdir().unwrap();
        let path = Utf8Path::from_path(tmp.path()).unwrap().join("matrix.csv");
        let outcome = MutationStatusTestPair {
            status: Some(DetectionStatus::NonViable),
            ..Default::default()
        };
        let mut writer = MatrixWriter::create(&path).unwrap();
        writer.write_unit(&[(mutation(), outcome)]).unwrap();
        let content = std::fs::read_to_string(path.as_std_path()).unwrap();
        let mut lines = content.lines();
        lines.next().unwrap();
        let row = lines.next().unwrap();
        assert_eq!(row.matches(NONE_PLACEHOLDER).count(), 7);
    }

    #[test]
    fn successive_units_append_rather_than_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let path = Utf8Path::from_path(tmp.path()).unwrap().join("matrix.csv");
        let mut writer = MatrixWriter::create(&path).unwrap();
        let non_viable = MutationStatusTestPair {
            status: Some(DetectionStatus::NonViable),
            ..Default::default()
        };
        writer.write_unit(&[(mutation(), non_viable.clone())]).unwrap();
        writer.write_unit(&[(mutation(), non_viable)]).unwrap();
        let content = std::fs::read_to_string(path.as_std_path()).unwrap();
        assert_eq!(content.lines().count(), 3); // header + two unit rows
    }
}
