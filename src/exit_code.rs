// Copyright 2021 - 2025 Martin Pool

//! Exit codes from mutation-matrix.
//!
//! These are assigned so that CI or other automation can distinguish the
//! cases that matter without parsing text output.

/// Everything worked: baseline passed (or failures were expected) and the
/// full matrix was produced.
pub const SUCCESS: i32 = 0;

/// Bad arguments or configuration.
pub const USAGE: i32 = 1;

/// One or more mutations survived (`SURVIVED`).
pub const FOUND_PROBLEMS: i32 = 2;

/// One or more mutations timed out.
pub const TIMEOUT: i32 = 3;

/// The baseline failed and the configuration does not permit that.
pub const BASELINE_FAILED: i32 = 4;

/// An internal software error.
pub const SOFTWARE: i32 = 70;

/// Exit codes a worker (minion) subprocess can itself terminate with; the
/// controller maps these back to a [`crate::status::DetectionStatus`] for
/// any mutation the worker did not finish reporting (spec.md §6, §7).
pub mod worker {
    /// The worker completed its unit normally.
    pub const OK: i32 = 0;
    /// The worker process died unexpectedly (signal, panic, segfault).
    pub const MINION_DIED: i32 = 71;
    /// The controller's watchdog killed the worker after the unit timeout.
    pub const TIMEOUT: i32 = 72;
    /// The worker (or its OS) reported it ran out of memory.
    pub const OUT_OF_MEMORY: i32 = 73;
    /// Anything else unrecognized.
    pub const UNKNOWN_ERROR: i32 = 74;
}
