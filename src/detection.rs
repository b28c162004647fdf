// Copyright 2021 - 2025 Martin Pool

//! The baseline-aware detection rule (spec.md §4.6): a pure function from
//! per-test outcomes and a baseline to a [`DetectionStatus`].

use std::collections::HashMap;

use crate::outcome::{MutationStatusTestPair, TestOutcome};
use crate::status::DetectionStatus;

/// `baseline_passed(test) -> Option<bool>`: `None` means the test has no
/// recorded baseline outcome (degrades to "treat as originally passing",
/// matching normal mode's `B[test] = true` for every test, spec.md §4.6).
pub fn detect(
    outcomes: &[TestOutcome],
    baseline_passed: &HashMap<String, bool>,
) -> MutationStatusTestPair {
    let mut killing_tests = Vec::new();
    let mut succeeding_tests = Vec::new();
    let covering_tests = outcomes.iter().map(|o| o.test_name.clone()).collect();

    for outcome in outcomes {
        let was_passing = baseline_passed
            .get(&outcome.test_name)
            .copied()
            .unwrap_or(true);
        if was_passing != outcome.passed {
            killing_tests.push(outcome.test_name.clone());
        } else {
            succeeding_tests.push(outcome.test_name.clone());
        }
    }

    let status = if !killing_tests.is_empty() {
        DetectionStatus::Killed
    } else if !outcomes.is_empty() {
        DetectionStatus::Survived
    } else {
        DetectionStatus::NoCoverage
    };

    MutationStatusTestPair {
        tests_run: outcomes.len(),
        status: Some(status),
        killing_tests,
        succeeding_tests,
        covering_tests,
        test_outcomes: outcomes.to_vec(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn baseline(pairs: &[(&str, bool)]) -> HashMap<String, bool> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn originally_passing_test_now_failing_is_a_killer() {
        let baseline = baseline(&[("t1", true)]);
        let outcomes = vec![TestOutcome::failed("t1", 1.0, "AssertionError", "2 != -1", "")];
        let result = detect(&outcomes, &baseline);
        assert_eq!(result.status, Some(DetectionStatus::Killed));
        assert_eq!(result.killing_tests, vec!["t1".to_string()]);
    }

    #[test]
    fn originally_failing_test_now_passing_is_a_killer() {
        // Boundary scenario 2: div(1,0) throws at baseline, mutant makes it
        // return a constant instead, so the previously-failing test passes.
        let baseline = baseline(&[("t_fail", false)]);
        let outcomes = vec![TestOutcome::passed("t_fail", 1.0)];
        let result = detect(&outcomes, &baseline);
        assert_eq!(result.status, Some(DetectionStatus::Killed));
        assert_eq!(result.killing_tests, vec!["t_fail".to_string()]);
    }

    #[test]
    fn agreeing_with_baseline_on_every_test_survives() {
        let baseline = baseline(&[("t1", true), ("t2", false)]);
        let outcomes = vec![
            TestOutcome::passed("t1", 1.0),
            TestOutcome::failed("t2", 1.0, "X", "x", ""),
        ];
        let result = detect(&outcomes, &baseline);
        assert_eq!(result.status, Some(DetectionStatus::Survived));
        assert!(result.killing_tests.is_empty());
        assert_eq!(result.succeeding_tests.len(), 2);
    }

    #[test]
    fn no_tests_run_is_no_coverage() {
        let result = detect(&[], &HashMap::new());
        assert_eq!(result.status, Some(DetectionStatus::NoCoverage));
        assert_eq!(result.tests_run, 0);
    }

    #[test]
    fn normal_mode_without_baseline_entries_treats_missing_as_originally_passing() {
        let outcomes = vec![TestOutcome::failed("t1", 1.0, "X", "x", "")];
        let result = detect(&outcomes, &HashMap::new());
        assert_eq!(result.status, Some(DetectionStatus::Killed));
    }
}
