// Copyright 2021 - 2025 Martin Pool

//! [`DetectionStatus`] and the [`StatusMap`] that tracks every mutation in
//! one work unit from `NOT_STARTED` through to a terminal status
//! (spec.md §3, §4.7).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::mutation::{MutationDetails, MutationId};
use crate::outcome::MutationStatusTestPair;

/// Tagged status of one mutation (spec.md §3).
///
/// Every mutation passes through `NotStarted`, and ends in exactly one of
/// the terminal variants (spec.md §8 quantified invariant).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum DetectionStatus {
    NotStarted,
    Started,
    Killed,
    Survived,
    NoCoverage,
    TimedOut,
    MemoryError,
    RunError,
    NonViable,
}

impl DetectionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, DetectionStatus::NotStarted | DetectionStatus::Started)
    }

    pub fn name(self) -> &'static str {
        match self {
            DetectionStatus::NotStarted => "NOT_STARTED",
            DetectionStatus::Started => "STARTED",
            DetectionStatus::Killed => "KILLED",
            DetectionStatus::Survived => "SURVIVED",
            DetectionStatus::NoCoverage => "NO_COVERAGE",
            DetectionStatus::TimedOut => "TIMED_OUT",
            DetectionStatus::MemoryError => "MEMORY_ERROR",
            DetectionStatus::RunError => "RUN_ERROR",
            DetectionStatus::NonViable => "NON_VIABLE",
        }
    }
}

impl std::fmt::Display for DetectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Mutable per-unit table of `mutation -> status` (and, once finished,
/// `mutation -> MutationStatusTestPair`) (spec.md §4.7).
///
/// Every mutation in the owning work unit is present from construction,
/// marked `NotStarted`; the controller drives it to a terminal status one
/// way or another before the unit is considered done.
#[derive(Debug)]
pub struct StatusMap {
    details: HashMap<MutationId, MutationDetails>,
    /// Preserves the unit's original ordering, for deterministic reporting
    /// (spec.md §4.5: "Determinism... insertion order").
    order: Vec<MutationId>,
    statuses: HashMap<MutationId, DetectionStatus>,
    results: HashMap<MutationId, MutationStatusTestPair>,
}

impl StatusMap {
    pub fn new(mutations: &[MutationDetails]) -> StatusMap {
        let mut details = HashMap::with_capacity(mutations.len());
        let mut order = Vec::with_capacity(mutations.len());
        let mut statuses = HashMap::with_capacity(mutations.len());
        for m in mutations {
            order.push(m.id.clone());
            statuses.insert(m.id.clone(), DetectionStatus::NotStarted);
            details.insert(m.id.clone(), m.clone());
        }
        StatusMap {
            details,
            order,
            statuses,
            results: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn details(&self, id: &MutationId) -> &MutationDetails {
        self.details.get(id).expect("mutation id is in this unit")
    }

    pub fn status(&self, id: &MutationId) -> DetectionStatus {
        self.statuses
            .get(id)
            .copied()
            .expect("mutation id is in this unit")
    }

    pub fn set_status(&mut self, id: &MutationId, status: DetectionStatus) {
        self.statuses.insert(id.clone(), status);
    }

    /// Set the same status on many mutations at once (spec.md §4.7: "set-status
    /// for many mutations at once") — used by the controller to reconcile
    /// exit-code-derived statuses across all still-unfinished mutations.
    pub fn set_status_many<'a>(
        &mut self,
        ids: impl IntoIterator<Item = &'a MutationId>,
        status: DetectionStatus,
    ) {
        for id in ids {
            self.set_status(id, status);
        }
    }

    /// Mutations never yet attempted, in unit order.
    pub fn get_unrun(&self) -> Vec<MutationId> {
        self.order
            .iter()
            .filter(|id| self.statuses[*id] == DetectionStatus::NotStarted)
            .cloned()
            .collect()
    }

    /// Mutations without a terminal status, in unit order (spec.md §4.4:
    /// "for unfinished mutations, assign a status derived from the exit
    /// code").
    pub fn get_unfinished(&self) -> Vec<MutationId> {
        self.order
            .iter()
            .filter(|id| !self.statuses[*id].is_terminal())
            .cloned()
            .collect()
    }

    /// Mutations currently `Started` — the one the worker was executing (or
    /// had just begun) when it stopped producing result frames. At most one
    /// mutation is ever `Started` at a time (spec.md §4.4 step 3). Only
    /// these should receive a status derived from the worker's exit code;
    /// mutations still `NotStarted` must stay `NotStarted` so the outer loop
    /// respawns a worker to actually run them (spec.md §8 Boundary Scenario
    /// 5: siblings after a timed-out mutation are retried, not fabricated).
    pub fn get_started(&self) -> Vec<MutationId> {
        self.order
            .iter()
            .filter(|id| self.statuses[*id] == DetectionStatus::Started)
            .cloned()
            .collect()
    }

    /// Assign `NoCoverage` to every mutation with no statically-covering
    /// tests (spec.md §4.7, normal mode only — the controller must not call
    /// this in research mode, per spec.md §4.4 and the §8 invariant that
    /// research mode never assigns `NO_COVERAGE` by static analysis).
    pub fn mark_uncovered(&mut self) {
        let uncovered: Vec<MutationId> = self
            .order
            .iter()
            .filter(|id| self.details[*id].covering_tests.is_empty())
            .cloned()
            .collect();
        for id in uncovered {
            self.set_status(&id, DetectionStatus::NoCoverage);
            self.results.insert(
                id,
                MutationStatusTestPair {
                    status: Some(DetectionStatus::NoCoverage),
                    ..Default::default()
                },
            );
        }
    }

    /// Record the final per-test result for one mutation, also updating its
    /// status to match.
    pub fn record_result(&mut self, id: &MutationId, result: MutationStatusTestPair) {
        let status = result.status.expect("completed result carries a status");
        self.set_status(id, status);
        self.results.insert(id.clone(), result);
    }

    /// Snapshot every mutation's `(MutationDetails, MutationStatusTestPair)`
    /// in unit order, for emission to the aggregator, and eagerly clear the
    /// heavy per-test detail this map is holding so it doesn't live for the
    /// remainder of the run (spec.md §4.4, §4.7: "create-results... clears
    /// detailed per-test data eagerly").
    ///
    /// Must be called exactly once per unit (spec.md §3 invariant).
    pub fn create_results(&mut self) -> Vec<(MutationDetails, MutationStatusTestPair)> {
        let mut out = Vec::with_capacity(self.order.len());
        for id in &self.order {
            let details = self.details[id].clone();
            let result = self.results.get(id).cloned().unwrap_or_else(|| {
                // A mutation with no recorded result at all (should not
                // happen once the controller loop has terminated, but kept
                // defensive rather than panicking mid-report).
                MutationStatusTestPair {
                    status: Some(self.status(id)),
                    ..Default::default()
                }
            });
            out.push((details, result));
        }
        self.clear();
        out
    }

    /// Drop all heavy per-test result data after reporting (spec.md §4.4).
    pub fn clear(&mut self) {
        self.results.clear();
    }
}
