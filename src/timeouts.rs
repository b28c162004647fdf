// Copyright 2021 - 2025 Martin Pool

//! Per-mutation timeout calculation (spec.md §5), adapted from the
//! teacher's own `Timeouts`/`phase_timeout` split but collapsed to the
//! single formula the core needs: there is no separate build phase here,
//! since compiling the program under test is out of scope.

use std::time::Duration;

use crate::options::Options;

/// `timeout = baselineExecutionTime * factor + constant` (spec.md §5).
///
/// Per-test timeout uses the same budget, measured from each test's own
/// start rather than the mutation's.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub factor: f64,
    pub constant: Duration,
}

impl Timeouts {
    pub fn from_options(options: &Options) -> Timeouts {
        Timeouts {
            factor: options.timeout_multiplier,
            constant: Duration::from_secs(options.timeout_constant_secs),
        }
    }

    /// The wall-clock budget for one mutation, given how long the
    /// unmutated baseline took to run the same test set.
    pub fn mutation_timeout(&self, baseline_execution_time: Duration) -> Duration {
        baseline_execution_time.mul_f64(self.factor) + self.constant
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn applies_factor_then_adds_constant() {
        let timeouts = Timeouts {
            factor: 1.25,
            constant: Duration::from_secs(4),
        };
        let budget = timeouts.mutation_timeout(Duration::from_secs(8));
        assert_eq!(budget, Duration::from_secs(14));
    }

    #[test]
    fn zero_baseline_still_gets_the_constant_floor() {
        let timeouts = Timeouts {
            factor: 1.25,
            constant: Duration::from_secs(4),
        };
        assert_eq!(timeouts.mutation_timeout(Duration::ZERO), Duration::from_secs(4));
    }
}
