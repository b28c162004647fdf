// Copyright 2021, 2022 Martin Pool

//! Resolved, in-process options for one run: the CLI args layered over the
//! config file, with built-in defaults filling whatever neither supplies.

use camino::Utf8PathBuf;

use crate::cli::Args;
use crate::config::Config;

/// Default multiplier applied to the baseline test duration (spec.md §5).
pub const DEFAULT_TIMEOUT_MULTIPLIER: f64 = 1.25;

/// Default constant added to the multiplied baseline duration, in seconds
/// (spec.md §5: 4000 ms).
pub const DEFAULT_TIMEOUT_CONSTANT_SECS: u64 = 4;

/// Default maximum mutations per work unit (spec.md §4.3).
pub const DEFAULT_UNIT_SIZE: usize = 50;

/// Resolved options for running the engine.
#[derive(Debug, Clone)]
pub struct Options {
    pub dir: Utf8PathBuf,
    pub out_dir: Utf8PathBuf,
    pub mutations_path: Utf8PathBuf,
    pub tests_path: Utf8PathBuf,
    pub test_command: String,
    pub full_matrix_research_mode: bool,
    pub threads: usize,
    pub unit_size: usize,
    pub timeout_multiplier: f64,
    pub timeout_constant_secs: u64,
    pub require_clean_baseline: bool,
}

impl Options {
    pub fn new(args: &Args, config: &Config) -> Options {
        let mutations_path = args
            .mutations
            .clone()
            .unwrap_or_else(|| args.dir.join("mutations.toml"));
        let tests_path = args
            .tests
            .clone()
            .unwrap_or_else(|| args.dir.join("tests.index"));
        Options {
            dir: args.dir.clone(),
            out_dir: args.out.clone(),
            mutations_path,
            tests_path,
            test_command: args.test_command.clone(),
            full_matrix_research_mode: args.full_matrix_research_mode
                || config.full_matrix_research_mode.unwrap_or(false),
            threads: args
                .threads
                .or(config.threads)
                .unwrap_or_else(default_thread_count),
            unit_size: args
                .unit_size
                .or(config.unit_size)
                .unwrap_or(DEFAULT_UNIT_SIZE),
            timeout_multiplier: args
                .timeout_multiplier
                .or(config.timeout_multiplier)
                .unwrap_or(DEFAULT_TIMEOUT_MULTIPLIER),
            timeout_constant_secs: args
                .timeout_constant_secs
                .or(config.timeout_constant_secs)
                .unwrap_or(DEFAULT_TIMEOUT_CONSTANT_SECS),
            require_clean_baseline: args.require_clean_baseline,
        }
    }
}

fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_overrides_config() {
        let args = Args::parse_from(["mutation-matrix", "--unit-size", "10"]);
        let config = Config {
            unit_size: Some(99),
            ..Default::default()
        };
        let options = Options::new(&args, &config);
        assert_eq!(options.unit_size, 10);
    }

    #[test]
    fn config_fills_in_when_cli_absent() {
        let args = Args::parse_from(["mutation-matrix"]);
        let config = Config {
            unit_size: Some(99),
            ..Default::default()
        };
        let options = Options::new(&args, &config);
        assert_eq!(options.unit_size, 99);
    }

    #[test]
    fn defaults_apply_when_neither_set() {
        let args = Args::parse_from(["mutation-matrix"]);
        let options = Options::new(&args, &Config::default());
        assert_eq!(options.unit_size, DEFAULT_UNIT_SIZE);
        assert_eq!(options.timeout_multiplier, DEFAULT_TIMEOUT_MULTIPLIER);
        assert_eq!(
            options.timeout_constant_secs,
            DEFAULT_TIMEOUT_CONSTANT_SECS
        );
        assert!(!options.full_matrix_research_mode);
    }

    #[test]
    fn research_mode_flag_from_cli() {
        let args = Args::parse_from(["mutation-matrix", "--full-matrix-research-mode"]);
        let options = Options::new(&args, &Config::default());
        assert!(options.full_matrix_research_mode);
    }
}
