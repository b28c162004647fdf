// Copyright 2021 - 2025 Martin Pool

//! The result aggregator (spec.md §4.8): a running tally of terminal
//! statuses across the whole run, updated one work unit at a time.
//!
//! The full (mutant x test) detail for a unit is written straight to the
//! matrix CSV as soon as that unit finishes (`crate::report::MatrixWriter`)
//! and is never retained here — only the lightweight per-status counts
//! survive for the console tally and the process exit code (spec.md §4.4
//! "Memory discipline": materialize into the report record and drop from
//! in-memory maps before the next unit begins).

use crate::mutation::MutationDetails;
use crate::outcome::MutationStatusTestPair;
use crate::status::DetectionStatus;

/// Count of mutations ending in each terminal status, used both for the
/// console tally and the process exit code.
#[derive(Debug, Default, Clone, Copy)]
pub struct Summary {
    pub killed: usize,
    pub survived: usize,
    pub no_coverage: usize,
    pub timed_out: usize,
    pub memory_error: usize,
    pub run_error: usize,
    pub non_viable: usize,
}

impl Summary {
    fn record(&mut self, status: DetectionStatus) {
        match status {
            DetectionStatus::Killed => self.killed += 1,
            DetectionStatus::Survived => self.survived += 1,
            DetectionStatus::NoCoverage => self.no_coverage += 1,
            DetectionStatus::TimedOut => self.timed_out += 1,
            DetectionStatus::MemoryError => self.memory_error += 1,
            DetectionStatus::RunError => self.run_error += 1,
            DetectionStatus::NonViable => self.non_viable += 1,
            DetectionStatus::NotStarted | DetectionStatus::Started => {
                unreachable!("aggregated results must carry a terminal status")
            }
        }
    }
}

/// Accumulates the run-wide [`Summary`] one work unit at a time. No ordering
/// is assumed between calls (spec.md §5).
#[derive(Debug, Default)]
pub struct Aggregator {
    summary: Summary,
}

impl Aggregator {
    pub fn new() -> Aggregator {
        Aggregator::default()
    }

    /// Fold one completed work unit's statuses into the running tally.
    pub fn add_unit(&mut self, unit_results: &[(MutationDetails, MutationStatusTestPair)]) {
        for (_, outcome) in unit_results {
            let status = outcome
                .status
                .expect("aggregated mutation carries a terminal status");
            self.summary.record(status);
        }
    }

    /// Consume the aggregator, returning the final tally.
    pub fn finish(self) -> Summary {
        self.summary
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mutation::MutationId;

    fn details(class: &str, line: u32, ordinal: u32) -> MutationDetails {
        MutationDetails {
            id: MutationId {
                class_name: class.into(),
                method: "m()->()".into(),
                mutator_tag: "delete".into(),
                ordinal,
            },
            line,
            covering_tests: vec![],
        }
    }

    fn result(status: DetectionStatus) -> MutationStatusTestPair {
        MutationStatusTestPair {
            status: Some(status),
            ..Default::default()
        }
    }

    #[test]
    fn summary_counts_each_status_bucket_across_units() {
        let mut agg = Aggregator::new();
        agg.add_unit(&[(details("pkg/A", 1, 0), result(DetectionStatus::Killed))]);
        agg.add_unit(&[
            (details("pkg/A", 2, 0), result(DetectionStatus::Survived)),
            (details("pkg/A", 3, 0), result(DetectionStatus::Survived)),
        ]);
        let summary = agg.finish();
        assert_eq!(summary.killed, 1);
        assert_eq!(summary.survived, 2);
    }

    #[test]
    fn summary_starts_at_zero() {
        let agg = Aggregator::new();
        let summary = agg.finish();
        assert_eq!(summary.killed, 0);
        assert_eq!(summary.survived, 0);
    }
}
