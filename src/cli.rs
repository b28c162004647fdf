// Copyright 2021 - 2024 Martin Pool

//! Command-line flags.

use camino::Utf8PathBuf;
use clap::Parser;

/// Systematically mutate code under test and check whether the test suite
/// detects each mutation, producing a full (mutant x test) matrix in
/// research mode.
#[derive(Parser, Debug)]
#[command(author, version, about, wrap_help = true)]
pub struct Args {
    /// Root of the tree under analysis.
    #[arg(long, short = 'd', default_value = ".")]
    pub dir: Utf8PathBuf,

    /// Path to the mutation manifest (produced by an external
    /// mutation-generation engine, spec.md §1); defaults to
    /// `<dir>/mutations.toml`.
    #[arg(long)]
    pub mutations: Option<Utf8PathBuf>,

    /// Path to the flat test index (produced by an external test-discovery
    /// adapter, spec.md §1); defaults to `<dir>/tests.index`.
    #[arg(long)]
    pub tests: Option<Utf8PathBuf>,

    /// Shell command template used to run one test, with `{test}`
    /// substituted for its name.
    #[arg(long, default_value = "{test}")]
    pub test_command: String,

    /// Directory to write logs and the result matrix into.
    #[arg(long, default_value = "mutation-matrix.out")]
    pub out: Utf8PathBuf,

    /// Path to a `mutation-matrix.toml` config file; defaults to
    /// `<dir>/mutation-matrix.toml` if present.
    #[arg(long)]
    pub config: Option<Utf8PathBuf>,

    /// List the mutations that survive the interceptor pipeline and exit,
    /// without running any of them.
    #[arg(long)]
    pub list: bool,

    /// With `--list`, print JSON instead of a human-readable list.
    #[arg(long, requires = "list")]
    pub json: bool,

    /// Run every test against every mutant to completion and emit the full
    /// (mutant x test) CSV matrix, using baseline-aware detection and the
    /// failing-line filter (spec.md §6).
    #[arg(long)]
    pub full_matrix_research_mode: bool,

    /// Number of worker subprocesses to run concurrently.
    #[arg(long)]
    pub threads: Option<usize>,

    /// Maximum number of mutations per work unit; 0 means unbounded.
    #[arg(long)]
    pub unit_size: Option<usize>,

    /// Multiply the baseline duration by this factor for the per-mutation
    /// timeout.
    #[arg(long)]
    pub timeout_multiplier: Option<f64>,

    /// Add this many seconds to the multiplied baseline duration.
    #[arg(long)]
    pub timeout_constant_secs: Option<u64>,

    /// If the baseline has failing tests, abort instead of proceeding with
    /// research-mode semantics.
    #[arg(long)]
    pub require_clean_baseline: bool,

    /// Verbosity: repeat for more detail (e.g. `-vv`).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet: suppress the progress display.
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Internal: re-exec as a worker (minion) subprocess reading a work
    /// plan from stdin. Not part of the public UI.
    #[arg(long, hide = true)]
    pub internal_worker: bool,
}
