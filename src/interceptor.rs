// Copyright 2021 - 2025 Martin Pool

//! The mutation interceptor pipeline (spec.md §4.2): a chain of filters that
//! each see the full candidate list before any mutation is scheduled onto a
//! work unit.

use tracing::{info, warn};

use crate::baseline::Baseline;
use crate::mutation::MutationDetails;

/// One stage of the pipeline. Implementations either drop candidates
/// (`FILTER`) or only annotate/reorder them (`OTHER`/`COST_FACTOR`) — the
/// trait itself doesn't distinguish the two, since both just return the
/// surviving/reordered list (spec.md Design Notes: interceptors are tagged
/// for documentation purposes, not dispatched differently).
pub trait MutationInterceptor {
    fn name(&self) -> &'static str;

    fn intercept(&self, candidates: Vec<MutationDetails>) -> Vec<MutationDetails>;
}

/// Runs every interceptor in order, logging how many candidates each stage
/// removed.
pub struct Pipeline {
    stages: Vec<Box<dyn MutationInterceptor>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn MutationInterceptor>>) -> Pipeline {
        Pipeline { stages }
    }

    pub fn run(&self, mut candidates: Vec<MutationDetails>) -> Vec<MutationDetails> {
        for stage in &self.stages {
            let before = candidates.len();
            candidates = stage.intercept(candidates);
            let after = candidates.len();
            if after < before {
                info!(
                    stage = stage.name(),
                    removed = before - after,
                    remaining = after,
                    "interceptor stage filtered candidates"
                );
            }
        }
        candidates
    }
}

/// Retains only candidates whose `(class, line)` was visited by an
/// originally failing test (spec.md §4.2: `FailingLineFilter`, tag
/// `FILTER`).
///
/// "If the failing-test-line set is empty, the filter must retain all
/// candidates rather than drop everything, since an empty set is
/// indistinguishable from 'no coverage data' and must not be treated as
/// 'every line is covered by a failure.'" (spec.md §4.2 edge case)
pub struct FailingLineFilter<'a> {
    baseline: &'a Baseline,
}

impl<'a> FailingLineFilter<'a> {
    pub fn new(baseline: &'a Baseline) -> FailingLineFilter<'a> {
        FailingLineFilter { baseline }
    }
}

impl MutationInterceptor for FailingLineFilter<'_> {
    fn name(&self) -> &'static str {
        "FailingLineFilter"
    }

    fn intercept(&self, candidates: Vec<MutationDetails>) -> Vec<MutationDetails> {
        if self.baseline.failing_test_lines().is_empty() {
            if !self.baseline.failing_tests().is_empty() {
                warn!(
                    "no failing-test-line coverage data available; retaining all {} candidate(s)",
                    candidates.len()
                );
            }
            return candidates;
        }
        candidates
            .into_iter()
            .filter(|m| self.baseline.contains_line(&m.class_line_key()))
            .collect()
    }
}
