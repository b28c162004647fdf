// Copyright 2021 - 2025 Martin Pool

//! The coverage/baseline collector (spec.md §4.1): run every test once
//! against the unmodified program, classify each as originally passing or
//! failing, and record the `(class, line)` pairs any failing test visited.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, warn};

use crate::harness::{TestHarness, TestRunResult, TestUnit};

/// One test's outcome during baseline collection, including the code
/// locations it visited (used to derive `failingTestLines`).
#[derive(Debug, Clone)]
pub struct CoverageResult {
    pub test: TestUnit,
    pub run: TestRunResult,
}

impl CoverageResult {
    pub fn green(&self) -> bool {
        self.run.passed
    }
}

/// Process-wide, read-only-after-build baseline (spec.md §3: `Baseline`).
///
/// Built once by [`collect`], then passed by reference (never mutated) to
/// the [`crate::interceptor::FailingLineFilter`] and to every worker.
#[derive(Debug, Clone, Default)]
pub struct Baseline {
    failing_tests: HashSet<String>,
    failing_test_lines: HashSet<String>,
}

impl Baseline {
    pub fn is_failing(&self, test_name: &str) -> bool {
        self.failing_tests.contains(test_name)
    }

    pub fn failing_tests(&self) -> &HashSet<String> {
        &self.failing_tests
    }

    /// `"ClassName:Line"` pairs visited by at least one originally-failing
    /// test (spec.md §3: `failingTestLines`).
    pub fn failing_test_lines(&self) -> &HashSet<String> {
        &self.failing_test_lines
    }

    pub fn contains_line(&self, class_line_key: &str) -> bool {
        self.failing_test_lines.contains(class_line_key)
    }
}

/// Run every test once, with no mutation applied, and return both the raw
/// per-test results and the derived [`Baseline`].
///
/// "A test is green iff it completed without throwing. failingTests is the
/// complement. failingTestLines is derived by projecting each failing
/// test's visited blocks to (className, lineNumber) and unioning."
/// (spec.md §4.1)
pub fn collect(
    tests: &[TestUnit],
    harness: &mut dyn TestHarness,
    per_test_timeout: Duration,
) -> anyhow::Result<(Vec<CoverageResult>, Baseline)> {
    let mut results = Vec::with_capacity(tests.len());
    let mut failing_tests = HashSet::new();
    let mut failing_test_lines = HashSet::new();

    for test in tests {
        debug!(test = %test.name, "run baseline test");
        let run = harness.run_test(test, per_test_timeout)?;
        if !run.passed {
            failing_tests.insert(test.name.clone());
            for (class, line) in &run.visited_lines {
                failing_test_lines.insert(format!("{class}:{line}"));
            }
        }
        results.push(CoverageResult {
            test: test.clone(),
            run,
        });
    }

    if failing_test_lines.is_empty() && !failing_tests.is_empty() {
        warn!(
            "baseline has {} failing test(s) but no coverage data was recorded for any of them; \
             the failing-line filter will conservatively retain all mutations",
            failing_tests.len()
        );
    }

    Ok((
        results,
        Baseline {
            failing_tests,
            failing_test_lines,
        },
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::harness::{ExceptionDetail, TestHarness};
    use std::collections::HashMap;

    /// An in-memory fake harness for unit tests: tests pass/fail according
    /// to a fixed table, and "visit" whatever lines the table says.
    struct FakeHarness {
        table: HashMap<String, (bool, Vec<(String, u32)>)>,
    }

    impl TestHarness for FakeHarness {
        fn install(&mut self, _class_name: &str, _image: Vec<u8>) -> anyhow::Result<()> {
            Ok(())
        }
        fn revert_all(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
        fn run_test(
            &mut self,
            test: &TestUnit,
            _timeout: Duration,
        ) -> anyhow::Result<TestRunResult> {
            let (passed, visited) = self.table.get(&test.name).cloned().unwrap_or((true, vec![]));
            Ok(TestRunResult {
                passed,
                elapsed_ms: 1.0,
                exception: if passed {
                    None
                } else {
                    Some(ExceptionDetail {
                        type_name: "AssertionError".into(),
                        message: "boom".into(),
                        stack_trace: "at ...".into(),
                    })
                },
                visited_lines: visited,
                timed_out: false,
            })
        }
    }

    #[test]
    fn all_green_baseline_has_no_failing_tests() {
        let tests = vec![TestUnit::new("t1", "pkg.Tests"), TestUnit::new("t2", "pkg.Tests")];
        let mut harness = FakeHarness {
            table: HashMap::new(),
        };
        let (results, baseline) = collect(&tests, &mut harness, Duration::from_secs(1)).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(CoverageResult::green));
        assert!(baseline.failing_tests().is_empty());
        assert!(baseline.failing_test_lines().is_empty());
    }

    #[test]
    fn failing_test_contributes_its_visited_lines() {
        let mut table = HashMap::new();
        table.insert(
            "t_fail".to_string(),
            (false, vec![("pkg.Arith".to_string(), 10)]),
        );
        let tests = vec![TestUnit::new("t_fail", "pkg.Tests"), TestUnit::new("t_ok", "pkg.Tests")];
        let mut harness = FakeHarness { table };
        let (_results, baseline) = collect(&tests, &mut harness, Duration::from_secs(1)).unwrap();
        assert!(baseline.is_failing("t_fail"));
        assert!(!baseline.is_failing("t_ok"));
        assert!(baseline.contains_line("pkg.Arith:10"));
    }
}
