// Copyright 2021 - 2025 Martin Pool

//! The identity of one mutation site: [`MutationId`] and [`MutationDetails`]
//! (spec.md §3).
//!
//! Generating these values is out of scope for the core (spec.md §1): they
//! are produced by an external [`crate::harness::MutationSource`] and are
//! otherwise treated as opaque, immutable identities by everything
//! downstream.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identity of a mutation site, independent of the current status
/// map entry (spec.md §3: "stable `mutationId`").
///
/// `class_name` uses the internal (slash-separated) form; [`MutationId::dotted_class`]
/// gives the dotted form the spec also requires be available.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct MutationId {
    /// Enclosing class/module, internal form, e.g. `pkg/module/Type`.
    pub class_name: String,
    /// Method name and descriptor, e.g. `add(i32,i32)->i32`.
    pub method: String,
    /// Which mutator produced this mutation, e.g. `replace_binary_operator`.
    pub mutator_tag: String,
    /// Ordinal index among mutations the same mutator produced on the same
    /// line (disambiguates multiple mutants on one line).
    pub ordinal: u32,
}

impl MutationId {
    pub fn dotted_class(&self) -> String {
        self.class_name.replace('/', ".")
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{} [{}#{}]",
            self.dotted_class(),
            self.method,
            self.mutator_tag,
            self.ordinal
        )
    }
}

/// Everything the engine needs to know about one mutation before running it
/// (spec.md §3: `MutationDetails`).
///
/// Immutable after creation — nothing downstream of the
/// [`crate::interceptor::Pipeline`] mutates a `MutationDetails`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct MutationDetails {
    pub id: MutationId,
    /// 1-based source line number.
    pub line: u32,
    /// Tests recorded as statically covering this `(class, line)` during
    /// baseline collection, in discovery order. Empty if coverage data is
    /// unavailable or this line was never reached (normal-mode `NO_COVERAGE`
    /// candidates).
    pub covering_tests: Vec<String>,
}

impl MutationDetails {
    /// The `"ClassName:Line"` identity used by the failing-line filter and
    /// coverage projection (spec.md invariants: "filtering is decided by
    /// that pair, never by class alone").
    pub fn class_line_key(&self) -> String {
        format!("{}:{}", self.id.dotted_class(), self.line)
    }
}

impl fmt::Display for MutationDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} line {}", self.id, self.line)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> MutationDetails {
        MutationDetails {
            id: MutationId {
                class_name: "pkg/math/Arith".into(),
                method: "add(i32,i32)->i32".into(),
                mutator_tag: "replace_binary_operator".into(),
                ordinal: 0,
            },
            line: 42,
            covering_tests: vec!["pkg::math::tests::add_two".into()],
        }
    }

    #[test]
    fn class_line_key_uses_dotted_class() {
        assert_eq!(sample().class_line_key(), "pkg.math.Arith:42");
    }

    #[test]
    fn display_is_stable() {
        assert_eq!(
            sample().to_string(),
            "pkg.math.Arith::add(i32,i32)->i32 [replace_binary_operator#0] line 42"
        );
    }
}
