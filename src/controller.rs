// Copyright 2021 - 2025 Martin Pool

//! The worker controller (spec.md §4.4): per work unit, spawns a worker
//! subprocess, streams it the unit header, consumes result frames, and
//! reconciles the exit code against whatever mutations the worker never
//! got to.

use std::io::{BufReader, Write};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use subprocess::{Popen, PopenConfig, Redirection};
use sysinfo::System;
use tracing::{info, warn};

use crate::console::Progress;
use crate::error::EngineError;
use crate::exit_code;
use crate::interrupt::check_interrupted;
use crate::memory::{self, Phase};
use crate::outcome::MutationStatusTestPair;
use crate::partition::WorkUnit;
use crate::protocol::{read_framed, write_framed, Frame, WorkUnitHeader};
use crate::status::{DetectionStatus, StatusMap};

/// Everything the controller needs to spawn a worker and make sense of its
/// output, independent of any one unit.
pub struct Controller {
    pub exe_path: Utf8PathBuf,
    pub work_dir: Utf8PathBuf,
    pub test_index_path: Utf8PathBuf,
    pub command_template: String,
    pub research_mode: bool,
    /// How long to let one unit run, end to end, before the watchdog kills
    /// the worker and any still-unfinished mutation is treated as
    /// `TIMED_OUT` (spec.md §5 "Suspension / blocking").
    pub unit_watchdog: Duration,
}

impl Controller {
    /// Drive one work unit to completion, respawning workers as needed
    /// until every mutation has a terminal status (spec.md §4.4).
    ///
    /// Each loop iteration either makes progress (at least one mutation
    /// gets a terminal status) or assigns an error status to everything
    /// still unfinished, so the loop always terminates.
    pub fn run_unit(
        &self,
        unit: &WorkUnit,
        unit_index: usize,
        progress: &Progress,
    ) -> Result<Vec<(crate::mutation::MutationDetails, MutationStatusTestPair)>> {
        let mut system = System::new();
        memory::log_usage(&mut system, unit_index, Phase::BeforeUnit);

        let mut status_map = StatusMap::new(&unit.mutations);
        if !self.research_mode {
            status_map.mark_uncovered();
        }

        let mut attempts = 0;
        loop {
            check_interrupted()?;
            let unrun = status_map.get_unrun();
            if unrun.is_empty() {
                break;
            }
            attempts += 1;
            if attempts > unit.mutations.len() + 2 {
                // Defensive backstop: should be unreachable, since every
                // iteration below either completes work or assigns a
                // terminal status to everything unfinished.
                warn!("worker controller made no progress after {attempts} spawns; aborting unit");
                status_map.set_status_many(status_map.get_unfinished().iter(), DetectionStatus::RunError);
                break;
            }

            let pending: Vec<_> = unrun
                .iter()
                .map(|id| status_map.details(id).clone())
                .collect();
            // Mark the first unrun mutation STARTED so a crash before any
            // result frame arrives is still attributable (spec.md §4.4 step 3).
            status_map.set_status(&pending[0].id, DetectionStatus::Started);

            match self.run_worker_once(unit, &pending, &mut status_map, progress) {
                Ok(exit_status) => self.reconcile_exit_status(&mut status_map, exit_status),
                Err(e) => {
                    warn!("worker spawn/communication failed: {e:#}");
                    status_map.set_status_many(status_map.get_unfinished().iter(), DetectionStatus::RunError);
                }
            }
        }

        memory::log_usage(&mut system, unit_index, Phase::AfterExecution);
        let results = status_map.create_results();
        memory::log_usage(&mut system, unit_index, Phase::AfterReporting);
        memory::log_usage(&mut system, unit_index, Phase::AfterClearing);
        Ok(results)
    }

    fn run_worker_once(
        &self,
        unit: &WorkUnit,
        pending: &[crate::mutation::MutationDetails],
        status_map: &mut StatusMap,
        progress: &Progress,
    ) -> Result<WorkerExitStatus> {
        let header = WorkUnitHeader {
            mutations: pending.to_vec(),
            test_classes: unit.test_classes.clone(),
            timeout_per_mutation_millis: unit.timeout_per_mutation.as_millis() as u64,
            research_mode: self.research_mode,
            work_dir: self.work_dir.clone(),
            test_index_path: self.test_index_path.clone(),
            command_template: self.command_template.clone(),
        };

        let mut child = Popen::create(
            &[self.exe_path.as_str(), "--internal-worker"],
            PopenConfig {
                stdin: Redirection::Pipe,
                stdout: Redirection::Pipe,
                stderr: Redirection::Merge,
                ..Default::default()
            },
        )
        .map_err(|e| EngineError::WorkerSpawn(e.to_string()))
        .context("failed to spawn worker subprocess")?;

        {
            let stdin = child.stdin.as_mut().expect("worker has a stdin pipe");
            write_framed(stdin, &header).context("failed to send unit header to worker")?;
        }

        let mut stdout = BufReader::new(child.stdout.take().expect("worker has a stdout pipe"));
        let deadline = Instant::now() + self.unit_watchdog;

        loop {
            if Instant::now() >= deadline {
                let _ = child.terminate();
                let _ = child.wait_timeout(Duration::from_secs(5));
                return Ok(WorkerExitStatus::Code(exit_code::worker::TIMEOUT));
            }
            match read_framed::<Frame, _>(&mut stdout) {
                Ok(Some(Frame::MutationStarted(id))) => {
                    status_map.set_status(&id, DetectionStatus::Started);
                    progress.set_active_units(vec![format!("unit: {}", id)]);
                }
                Ok(Some(Frame::TestOutcome { .. })) => {
                    // Research-mode detail; the final MutationResult carries
                    // the full set, so there's nothing to record per-frame
                    // beyond progress feedback.
                }
                Ok(Some(Frame::MutationResult { mutation, result })) => {
                    let status = result.status.unwrap_or(DetectionStatus::RunError);
                    progress.record_status(status);
                    status_map.record_result(&mutation, result);
                }
                Ok(Some(Frame::StreamTerminator)) => {
                    let exit_status = child
                        .wait_timeout(Duration::from_secs(10))
                        .context("waiting for worker to exit after stream terminator")?;
                    return Ok(match exit_status {
                        Some(s) if s.success() => WorkerExitStatus::Code(exit_code::worker::OK),
                        Some(_) => WorkerExitStatus::Code(exit_code::worker::UNKNOWN_ERROR),
                        None => {
                            let _ = child.terminate();
                            WorkerExitStatus::Code(exit_code::worker::MINION_DIED)
                        }
                    });
                }
                Ok(None) => {
                    // Pipe closed without a terminator: the worker died.
                    let exit_status = child.wait_timeout(Duration::from_secs(5))?;
                    return Ok(match exit_status {
                        Some(s) => WorkerExitStatus::Code(
                            s.success()
                                .then_some(exit_code::worker::OK)
                                .unwrap_or(exit_code::worker::MINION_DIED),
                        ),
                        None => WorkerExitStatus::Code(exit_code::worker::MINION_DIED),
                    });
                }
                Err(e) => {
                    let violation = EngineError::ProtocolViolation(e.to_string());
                    warn!("{violation}");
                    let _ = child.terminate();
                    return Ok(WorkerExitStatus::ProtocolViolation);
                }
            }
        }
    }

    /// Assign a status derived from the worker's exit code to the mutation
    /// it was actually running when it stopped (spec.md §4.4 step 5, §7).
    ///
    /// Only the `Started` mutation, if any, is finalized this way; anything
    /// still `NotStarted` is left alone so the outer loop in `run_unit`
    /// respawns a fresh worker for it (spec.md §8 Boundary Scenario 5).
    fn reconcile_exit_status(&self, status_map: &mut StatusMap, exit_status: WorkerExitStatus) {
        let started = status_map.get_started();
        if started.is_empty() {
            return;
        }
        let status = match exit_status {
            WorkerExitStatus::Code(code) if code == exit_code::worker::TIMEOUT => {
                DetectionStatus::TimedOut
            }
            WorkerExitStatus::Code(code) if code == exit_code::worker::OUT_OF_MEMORY => {
                DetectionStatus::MemoryError
            }
            WorkerExitStatus::Code(code) if code == exit_code::worker::MINION_DIED => {
                DetectionStatus::RunError
            }
            WorkerExitStatus::Code(code) if code == exit_code::worker::OK => {
                // The worker finished its stream cleanly but the mutation it
                // was running is still marked `Started` — shouldn't
                // normally happen, but leave it alone so the outer loop
                // respawns.
                info!(
                    "worker exited cleanly with {} mutation(s) still started; respawning",
                    started.len()
                );
                return;
            }
            WorkerExitStatus::Code(_) => DetectionStatus::RunError,
            WorkerExitStatus::ProtocolViolation => DetectionStatus::RunError,
        };
        info!(
            count = started.len(),
            status = status.name(),
            "reconciling the in-flight mutation after worker exit"
        );
        status_map.set_status_many(started.iter(), status);
    }
}

enum WorkerExitStatus {
    Code(i32),
    ProtocolViolation,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mutation::{MutationDetails, MutationId};

    fn mutation(n: u32) -> MutationDetails {
        MutationDetails {
            id: MutationId {
                class_name: "pkg/Thing".into(),
                method: "go()->()".into(),
                mutator_tag: "delete".into(),
                ordinal: n,
            },
            line: n,
            covering_tests: vec!["t1".into()],
        }
    }

    fn controller() -> Controller {
        Controller {
            exe_path: Utf8PathBuf::from("mutation-matrix"),
            work_dir: Utf8PathBuf::from("."),
            test_index_path: Utf8PathBuf::from("tests.json"),
            command_template: "{test}".into(),
            research_mode: false,
            unit_watchdog: Duration::from_secs(60),
        }
    }

    /// The watchdog-killed-worker case (spec.md §8 Boundary Scenario 5): the
    /// in-flight mutation is finalized as `TIMED_OUT`; siblings that never
    /// started stay `NotStarted` so `run_unit`'s loop respawns a worker for
    /// them instead of fabricating a result.
    #[test]
    fn timeout_only_finalizes_the_started_mutation() {
        let mutations = vec![mutation(1), mutation(2), mutation(3)];
        let mut status_map = StatusMap::new(&mutations);
        status_map.set_status(&mutations[0].id, DetectionStatus::Started);

        controller().reconcile_exit_status(
            &mut status_map,
            WorkerExitStatus::Code(exit_code::worker::TIMEOUT),
        );

        assert_eq!(status_map.status(&mutations[0].id), DetectionStatus::TimedOut);
        assert_eq!(status_map.status(&mutations[1].id), DetectionStatus::NotStarted);
        assert_eq!(status_map.status(&mutations[2].id), DetectionStatus::NotStarted);
        assert_eq!(status_map.get_unrun().len(), 2);
    }

    /// A worker that dies outright (segfault, panic, kill -9) before it ever
    /// sends `MutationStarted` leaves the unit's mutations all `NotStarted`;
    /// reconciliation has nothing to finalize and the outer loop just
    /// respawns.
    #[test]
    fn crash_before_any_mutation_started_finalizes_nothing() {
        let mutations = vec![mutation(1), mutation(2)];
        let mut status_map = StatusMap::new(&mutations);

        controller().reconcile_exit_status(
            &mut status_map,
            WorkerExitStatus::Code(exit_code::worker::MINION_DIED),
        );

        assert_eq!(status_map.status(&mutations[0].id), DetectionStatus::NotStarted);
        assert_eq!(status_map.status(&mutations[1].id), DetectionStatus::NotStarted);
    }

    /// A worker that dies mid-mutation (after `MutationStarted`, before a
    /// result frame) gets that one mutation marked `RunError`; its
    /// not-yet-attempted siblings are retried by a fresh worker.
    #[test]
    fn crash_mid_mutation_finalizes_only_that_mutation_as_run_error() {
        let mutations = vec![mutation(1), mutation(2)];
        let mut status_map = StatusMap::new(&mutations);
        status_map.set_status(&mutations[0].id, DetectionStatus::Started);

        controller().reconcile_exit_status(
            &mut status_map,
            WorkerExitStatus::Code(exit_code::worker::MINION_DIED),
        );

        assert_eq!(status_map.status(&mutations[0].id), DetectionStatus::RunError);
        assert_eq!(status_map.status(&mutations[1].id), DetectionStatus::NotStarted);
    }

    #[test]
    fn out_of_memory_exit_code_finalizes_started_mutation_as_memory_error() {
        let mutations = vec![mutation(1)];
        let mut status_map = StatusMap::new(&mutations);
        status_map.set_status(&mutations[0].id, DetectionStatus::Started);

        controller().reconcile_exit_status(
            &mut status_map,
            WorkerExitStatus::Code(exit_code::worker::OUT_OF_MEMORY),
        );

        assert_eq!(status_map.status(&mutations[0].id), DetectionStatus::MemoryError);
    }

    /// A clean exit (`OK`) with a mutation still `Started` means the worker
    /// reported its result and then exited before the final
    /// `StreamTerminator` was observed as such, or some other benign race;
    /// reconciliation must not fabricate a terminal status, so the mutation
    /// stays `Started` and is retried by a fresh worker.
    #[test]
    fn clean_exit_with_started_mutation_leaves_it_alone_for_respawn() {
        let mutations = vec![mutation(1)];
        let mut status_map = StatusMap::new(&mutations);
        status_map.set_status(&mutations[0].id, DetectionStatus::Started);

        controller().reconcile_exit_status(
            &mut status_map,
            WorkerExitStatus::Code(exit_code::worker::OK),
        );

        assert_eq!(status_map.status(&mutations[0].id), DetectionStatus::Started);
    }

    #[test]
    fn protocol_violation_finalizes_started_mutation_as_run_error() {
        let mutations = vec![mutation(1)];
        let mut status_map = StatusMap::new(&mutations);
        status_map.set_status(&mutations[0].id, DetectionStatus::Started);

        controller().reconcile_exit_status(&mut status_map, WorkerExitStatus::ProtocolViolation);

        assert_eq!(status_map.status(&mutations[0].id), DetectionStatus::RunError);
    }
}
