// Copyright 2021 - 2025 Martin Pool

//! The worker ("minion") subprocess main loop (spec.md §4.5): bootstrap,
//! optional in-worker baseline for research mode, then the per-mutation
//! loop that installs a transformed image, runs tests, and streams results
//! back over stdout.
//!
//! Run via the hidden `--internal-worker` re-exec of this same binary
//! (see `src/main.rs`); never invoked directly by a user.

use std::collections::HashMap;
use std::io::{self, Write};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::exit_code;
use crate::harness::{CodeTransformer, LineReplaceTransformer, TestDiscovery, TestHarness};
use crate::harness::{CommandTestHarness, FileTestDiscovery, TestUnit};
use crate::interrupt::check_interrupted;
use crate::mutation::MutationDetails;
use crate::protocol::{read_framed, Frame, WorkUnitHeader};
use crate::{detection, status::DetectionStatus};

/// Entry point for `--internal-worker`: read one [`WorkUnitHeader`] from
/// stdin, process it, write result frames to stdout, and return the
/// process exit code the controller should interpret (spec.md §6, §7).
pub fn main() -> i32 {
    let stdin = io::stdin();
    let mut stdin = stdin.lock();
    let header: WorkUnitHeader = match read_framed(&mut stdin) {
        Ok(Some(header)) => header,
        Ok(None) => {
            warn!("worker stdin closed before a unit header arrived");
            return exit_code::worker::UNKNOWN_ERROR;
        }
        Err(e) => {
            warn!("worker failed to read unit header: {e:#}");
            return exit_code::worker::UNKNOWN_ERROR;
        }
    };

    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    match run_unit(&header, &mut stdout) {
        Ok(()) => exit_code::worker::OK,
        Err(e) if e.to_string() == "interrupted" => {
            info!("worker interrupted");
            exit_code::worker::MINION_DIED
        }
        Err(e) => {
            warn!("worker failed: {e:#}");
            exit_code::worker::UNKNOWN_ERROR
        }
    }
}

fn run_unit<W: Write>(header: &WorkUnitHeader, out: &mut W) -> Result<()> {
    // Step 1: bootstrap — discover all tests, then narrow to this unit's
    // candidate classes (spec.md §4.5 step 1).
    let discovery = FileTestDiscovery::new(header.test_index_path.clone());
    let all_tests = discovery.discover().context("worker test discovery")?;
    let unit_tests: Vec<TestUnit> = all_tests
        .into_iter()
        .filter(|t| header.test_classes.contains(&t.defining_class))
        .collect();

    let mut harness = CommandTestHarness::new(header.work_dir.clone(), header.command_template.clone());
    let transformer = LineReplaceTransformer;

    // Step 2: research-mode-only local baseline (spec.md §4.5 step 2).
    let baseline_passed: HashMap<String, bool> = if header.research_mode {
        let mut map = HashMap::with_capacity(unit_tests.len());
        for test in &unit_tests {
            let run = harness.run_test(test, header.timeout_per_mutation())?;
            map.insert(test.name.clone(), run.passed);
        }
        map
    } else {
        // Normal mode: B[test] = true for every test (spec.md §4.6).
        HashMap::new()
    };

    for mutation in &header.mutations {
        check_interrupted()?;
        crate::protocol::write_framed(out, &Frame::MutationStarted(mutation.id.clone()))?;
        run_one_mutation(
            mutation,
            &unit_tests,
            &mut harness,
            &transformer,
            header,
            &baseline_passed,
            out,
        )?;
    }
    crate::protocol::write_framed(out, &Frame::StreamTerminator)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_one_mutation<W: Write>(
    mutation: &MutationDetails,
    unit_tests: &[TestUnit],
    harness: &mut CommandTestHarness,
    transformer: &LineReplaceTransformer,
    header: &WorkUnitHeader,
    baseline_passed: &HashMap<String, bool>,
    out: &mut W,
) -> Result<()> {
    let class_file = header.work_dir.join(&mutation.id.class_name);
    let original = match std::fs::read(class_file.as_std_path()) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("cannot read original image for {}: {e}", mutation.id);
            return emit_non_viable(mutation, out);
        }
    };

    let transformed = match transformer.transform(&original, mutation) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("transform rejected for {}: {e}", mutation.id);
            return emit_non_viable(mutation, out);
        }
    };

    if let Err(e) = harness.install(&mutation.id.class_name, transformed) {
        debug!("install rejected for {}: {e}", mutation.id);
        return emit_non_viable(mutation, out);
    }

    // In research mode every test runs to completion; in normal mode only
    // the mutation's statically-covering tests run, and execution may stop
    // at the first killer (spec.md §4.5).
    let candidate_tests: Vec<&TestUnit> = if header.research_mode {
        unit_tests.iter().collect()
    } else {
        unit_tests
            .iter()
            .filter(|t| mutation.covering_tests.iter().any(|name| name == &t.name))
            .collect()
    };

    let mutation_deadline = Instant::now() + header.timeout_per_mutation();
    let mut outcomes = Vec::with_capacity(candidate_tests.len());
    let mut timed_out = false;
    for test in candidate_tests {
        if Instant::now() >= mutation_deadline {
            timed_out = true;
            break;
        }
        let remaining = mutation_deadline.saturating_duration_since(Instant::now());
        let run = harness.run_test(test, remaining)?;
        if run.timed_out {
            // The test itself ran past its deadline: stop running further
            // tests for this mutation and finalize it as TIMED_OUT below,
            // same as the "deadline already passed" case above, rather than
            // aborting the whole unit (spec.md §4.5).
            timed_out = true;
            break;
        }
        crate::protocol::write_framed(
            out,
            &Frame::TestOutcome {
                mutation: mutation.id.clone(),
                outcome: run.clone().into_test_outcome(test.name.clone()),
            },
        )?;
        let was_killer = baseline_passed.get(&test.name).copied().unwrap_or(true) != run.passed;
        outcomes.push(run.into_test_outcome(test.name.clone()));
        if !header.research_mode && was_killer {
            // Normal mode may short-circuit on the first killer.
            break;
        }
    }

    harness.revert_all()?;

    if timed_out {
        let mut result = detection::detect(&outcomes, baseline_passed);
        result.status = Some(DetectionStatus::TimedOut);
        crate::protocol::write_framed(
            out,
            &Frame::MutationResult {
                mutation: mutation.id.clone(),
                result,
            },
        )?;
        return Ok(());
    }

    let result = detection::detect(&outcomes, baseline_passed);
    crate::protocol::write_framed(
        out,
        &Frame::MutationResult {
            mutation: mutation.id.clone(),
            result,
        },
    )
}

fn emit_non_viable<W: Write>(mutation: &MutationDetails, out: &mut W) -> Result<()> {
    crate::protocol::write_framed(
        out,
        &Frame::MutationResult {
            mutation: mutation.id.clone(),
            result: crate::outcome::MutationStatusTestPair {
                tests_run: 0,
                status: Some(DetectionStatus::NonViable),
                killing_tests: vec![],
                succeeding_tests: vec![],
                covering_tests: vec![],
                test_outcomes: vec![],
            },
        },
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn header_timeout_round_trips_to_a_duration() {
        let header = WorkUnitHeader {
            mutations: vec![],
            test_classes: Default::default(),
            timeout_per_mutation_millis: 5_000,
            research_mode: true,
            work_dir: "/tmp".into(),
            test_index_path: "/tmp/tests.index".into(),
            command_template: "true {test}".into(),
        };
        assert_eq!(header.timeout_per_mutation(), Duration::from_secs(5));
    }

    #[test]
    fn run_unit_emits_non_viable_when_class_file_is_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let work_dir = camino::Utf8Path::from_path(tmp.path()).unwrap().to_owned();
        let index_path = work_dir.join("tests.index");
        std::fs::write(index_path.as_std_path(), "pkg/Tests t1\n").unwrap();
        let mutation = MutationDetails {
            id: crate::mutation::MutationId {
                class_name: "pkg/Missing".into(),
                method: "m()->()".into(),
                mutator_tag: "line_replace:x".into(),
                ordinal: 0,
            },
            line: 1,
            covering_tests: vec![],
        };
        let header = WorkUnitHeader {
            mutations: vec![mutation],
            test_classes: ["pkg/Tests".to_string()].into_iter().collect(),
            timeout_per_mutation_millis: 5_000,
            research_mode: false,
            work_dir,
            test_index_path: index_path,
            command_template: "true".into(),
        };
        let mut out = Vec::new();
        run_unit(&header, &mut out).unwrap();
        let mut cursor = std::io::Cursor::new(out);
        let first = crate::protocol::read_framed::<Frame, _>(&mut cursor)
            .unwrap()
            .unwrap();
        assert!(matches!(first, Frame::MutationStarted(_)));
        let second = crate::protocol::read_framed::<Frame, _>(&mut cursor)
            .unwrap()
            .unwrap();
        match second {
            Frame::MutationResult { result, .. } => {
                assert_eq!(result.status, Some(DetectionStatus::NonViable));
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }
}
