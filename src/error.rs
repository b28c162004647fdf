// Copyright 2021 - 2025 Martin Pool

//! Domain errors callers might want to match on (spec.md §7 taxonomy),
//! distinct from the `anyhow::Error` used everywhere else for I/O and
//! orchestration failures.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The baseline had failing tests and the run configuration does not
    /// permit that (spec.md §4.1 "Failure semantics").
    #[error("baseline failed: {0} failing test(s) and require_clean_baseline is set")]
    BaselineFailed(usize),

    /// A worker sent an oversized frame or an otherwise malformed message
    /// (spec.md §6 "Large-payload guard").
    #[error("worker protocol violation: {0}")]
    ProtocolViolation(String),

    /// The worker subprocess could not be started at all.
    #[error("failed to spawn worker: {0}")]
    WorkerSpawn(String),
}
