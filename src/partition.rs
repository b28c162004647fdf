// Copyright 2021 - 2025 Martin Pool

//! The unit partitioner (spec.md §4.3): groups filtered mutations into
//! bounded [`WorkUnit`]s, one class at a time.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::mutation::MutationDetails;

/// Immutable bundle handed to one worker subprocess (spec.md §3: `Work Unit`).
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub mutations: Vec<MutationDetails>,
    /// Candidate test classes: the full project set in research mode, or
    /// just the defining classes of the unit's covering tests in normal
    /// mode (spec.md §4.3).
    pub test_classes: HashSet<String>,
    pub timeout_per_mutation: Duration,
}

impl WorkUnit {
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

/// Splits mutations into work units of at most `unit_size` mutations each,
/// never mixing two classes in one unit, and attaches each unit's test-class
/// set according to the active mode.
///
/// `unit_size == 0` means unbounded: one unit per class regardless of size.
///
/// Mutations are expected in class-grouped order (as produced by the
/// interceptor pipeline, which never reorders); a run of mutations sharing
/// `class_name` is treated as one class's candidates even if that class
/// reappears non-contiguously is not supported — callers should sort by
/// class first if their `MutationSource` does not already group them.
pub struct Partitioner {
    unit_size: usize,
    research_mode: bool,
    all_test_classes: HashSet<String>,
    timeout_per_mutation: Duration,
    test_index: Option<HashMap<String, String>>,
}

impl Partitioner {
    pub fn new(
        unit_size: usize,
        research_mode: bool,
        all_test_classes: HashSet<String>,
        timeout_per_mutation: Duration,
    ) -> Partitioner {
        Partitioner {
            unit_size,
            research_mode,
            all_test_classes,
            timeout_per_mutation,
            test_index: None,
        }
    }

    /// Attaches a test-name -> defining-class index (built from a
    /// [`crate::harness::TestDiscovery`] result) so normal-mode units resolve
    /// their candidate test classes precisely instead of via the
    /// test-name-as-class fallback.
    pub fn with_test_index(mut self, test_index: HashMap<String, String>) -> Partitioner {
        self.test_index = Some(test_index);
        self
    }

    pub fn partition(&self, mutations: Vec<MutationDetails>) -> Vec<WorkUnit> {
        let mut units = Vec::new();
        for class_group in group_by_class(mutations) {
            let chunk_size = if self.unit_size == 0 {
                class_group.len().max(1)
            } else {
                self.unit_size
            };
            for chunk in class_group.chunks(chunk_size) {
                units.push(self.build_unit(chunk.to_vec()));
            }
        }
        units
    }

    fn build_unit(&self, mutations: Vec<MutationDetails>) -> WorkUnit {
        let test_classes = if self.research_mode {
            self.all_test_classes.clone()
        } else if let Some(test_index) = &self.test_index {
            defining_classes_for(&mutations, test_index)
        } else {
            defining_classes_of_covering_tests(&mutations)
        };
        WorkUnit {
            mutations,
            test_classes,
            timeout_per_mutation: self.timeout_per_mutation,
        }
    }
}

/// Groups contiguous runs of mutations sharing a `class_name`, preserving
/// encounter order both across and within groups.
fn group_by_class(mutations: Vec<MutationDetails>) -> Vec<Vec<MutationDetails>> {
    let mut groups: Vec<Vec<MutationDetails>> = Vec::new();
    for m in mutations {
        match groups.last_mut() {
            Some(last) if last[0].id.class_name == m.id.class_name => last.push(m),
            _ => groups.push(vec![m]),
        }
    }
    groups
}

/// Normal-mode test-class set: every class that defines at least one test
/// named among the unit's mutations' `covering_tests` (spec.md §4.3). The
/// defining class isn't recorded on `MutationDetails` itself — callers that
/// need this resolved against real `TestUnit`s should prefer
/// [`defining_classes_for`] with an explicit test index; this fallback
/// treats each covering test name as its own class when no index is given,
/// which degrades gracefully for harnesses that don't separate test name
/// from defining class.
fn defining_classes_of_covering_tests(mutations: &[MutationDetails]) -> HashSet<String> {
    mutations
        .iter()
        .flat_map(|m| m.covering_tests.iter().cloned())
        .collect()
}

/// Same as the fallback above, but resolves each covering test's name to
/// its actual defining class via `test_index` (built from a
/// [`crate::harness::TestDiscovery`] result), which is the form the engine
/// uses in practice.
pub fn defining_classes_for(
    mutations: &[MutationDetails],
    test_index: &std::collections::HashMap<String, String>,
) -> HashSet<String> {
    mutations
        .iter()
        .flat_map(|m| m.covering_tests.iter())
        .filter_map(|test_name| test_index.get(test_name).cloned())
        .collect()
}
