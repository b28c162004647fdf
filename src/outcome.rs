// Copyright 2021 - 2025 Martin Pool

//! Per-test and per-mutation outcome records (spec.md §3: `TestOutcome`,
//! `MutationStatusTestPair`).

use serde::{Deserialize, Serialize};

use crate::status::DetectionStatus;

/// The literal placeholder the spec requires for missing optional fields,
/// so downstream CSV consumers never see a null/empty cell that could be
/// mistaken for "ran and found nothing" (spec.md §3).
pub const NONE_PLACEHOLDER: &str = "None";

/// The result of running one test against one mutant (spec.md §3: `TestOutcome`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub test_name: String,
    pub passed: bool,
    /// Elapsed wall-clock time, sub-millisecond precision preserved.
    pub elapsed_ms: f64,
    pub exception_type: Option<String>,
    pub exception_message: Option<String>,
    pub stack_trace: Option<String>,
}

impl TestOutcome {
    pub fn passed(test_name: impl Into<String>, elapsed_ms: f64) -> TestOutcome {
        TestOutcome {
            test_name: test_name.into(),
            passed: true,
            elapsed_ms,
            exception_type: None,
            exception_message: None,
            stack_trace: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn failed(
        test_name: impl Into<String>,
        elapsed_ms: f64,
        exception_type: impl Into<String>,
        exception_message: impl Into<String>,
        stack_trace: impl Into<String>,
    ) -> TestOutcome {
        TestOutcome {
            test_name: test_name.into(),
            passed: false,
            elapsed_ms,
            exception_type: Some(exception_type.into()),
            exception_message: Some(exception_message.into()),
            stack_trace: Some(stack_trace.into()),
        }
    }

    pub fn exception_type_or_none(&self) -> &str {
        self.exception_type.as_deref().unwrap_or(NONE_PLACEHOLDER)
    }

    pub fn exception_message_or_none(&self) -> &str {
        self.exception_message
            .as_deref()
            .unwrap_or(NONE_PLACEHOLDER)
    }

    pub fn stack_trace_or_none(&self) -> &str {
        self.stack_trace.as_deref().unwrap_or(NONE_PLACEHOLDER)
    }
}

/// The aggregate assigned to one mutation on completion (spec.md §3:
/// `MutationStatusTestPair`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationStatusTestPair {
    pub tests_run: usize,
    pub status: Option<DetectionStatus>,
    pub killing_tests: Vec<String>,
    pub succeeding_tests: Vec<String>,
    pub covering_tests: Vec<String>,
    /// Per-test detail; populated only in full-matrix research mode
    /// (spec.md §3, §4.5).
    pub test_outcomes: Vec<TestOutcome>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn missing_fields_default_to_none_literal() {
        let outcome = TestOutcome::passed("t1", 1.5);
        assert_eq!(outcome.exception_type_or_none(), NONE_PLACEHOLDER);
        assert_eq!(outcome.exception_message_or_none(), NONE_PLACEHOLDER);
        assert_eq!(outcome.stack_trace_or_none(), NONE_PLACEHOLDER);
    }

}
