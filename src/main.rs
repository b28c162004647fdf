// Copyright 2021 - 2025 Martin Pool

//! `mutation-matrix`: run a mutation-testing baseline-aware full
//! (mutant x test) matrix across isolated worker subprocesses.

mod aggregator;
mod baseline;
mod cli;
mod config;
mod console;
mod controller;
mod detection;
mod error;
mod exit_code;
mod harness;
mod interceptor;
mod interrupt;
mod log_file;
mod memory;
mod mutation;
mod options;
mod outcome;
mod partition;
mod process;
mod protocol;
mod report;
mod status;
mod timeouts;
mod worker;

use std::collections::VecDeque;
use std::process::exit;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use aggregator::{Aggregator, Summary};
use cli::Args;
use config::Config;
use console::Progress;
use controller::Controller;
use harness::{CommandTestHarness, FileMutationSource, FileTestDiscovery, MutationSource, TestDiscovery};
use interceptor::{FailingLineFilter, MutationInterceptor, Pipeline};
use mutation::MutationDetails;
use options::Options;
use partition::{Partitioner, WorkUnit};
use report::MatrixWriter;
use timeouts::Timeouts;

/// How long one baseline test run is allowed before it's considered to have
/// hung; the per-mutation timeout formula in [`timeouts`] only applies once
/// a baseline duration is known, so this bootstraps that measurement.
const BASELINE_TEST_TIMEOUT: Duration = Duration::from_secs(120);

fn main() {
    let args = Args::try_parse().unwrap_or_else(|e| {
        let code = match e.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                exit_code::SUCCESS
            }
            _ => exit_code::USAGE,
        };
        e.print().expect("write clap usage error");
        exit(code);
    });
    if args.internal_worker {
        exit(worker::main());
    }
    match run(&args) {
        Ok(code) => exit(code),
        Err(e) => {
            error!("{e:#}");
            exit(exit_code::SOFTWARE);
        }
    }
}

fn run(args: &Args) -> Result<i32> {
    if let Err(e) = interrupt::install_handler() {
        warn!("failed to install Ctrl-C handler: {e:#}");
    }

    std::fs::create_dir_all(&args.out).context("create output directory")?;
    let _logging_guard = init_logging(args)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| args.dir.join("mutation-matrix.toml"));
    let config = if config_path.exists() {
        Config::read_file(&config_path)?
    } else {
        Config::default()
    };
    let options = Options::new(args, &config);

    info!(
        research_mode = options.full_matrix_research_mode,
        threads = options.threads,
        "starting mutation-matrix run"
    );

    let mutations = FileMutationSource::new(options.mutations_path.clone())
        .discover()
        .context("discover mutations")?;
    let tests = FileTestDiscovery::new(options.tests_path.clone())
        .discover()
        .context("discover tests")?;

    let mut harness = CommandTestHarness::new(options.dir.clone(), options.test_command.clone());
    let (coverage, baseline) = baseline::collect(&tests, &mut harness, BASELINE_TEST_TIMEOUT)
        .context("collect baseline")?;

    if options.require_clean_baseline && !baseline.failing_tests().is_empty() {
        let err = error::EngineError::BaselineFailed(baseline.failing_tests().len());
        error!("{err}");
        return Ok(exit_code::BASELINE_FAILED);
    }
    if !baseline.failing_tests().is_empty() {
        info!(
            count = baseline.failing_tests().len(),
            "baseline has failing tests; proceeding with baseline-aware detection"
        );
    }

    let mut stages: Vec<Box<dyn MutationInterceptor>> = Vec::new();
    if options.full_matrix_research_mode {
        stages.push(Box::new(FailingLineFilter::new(&baseline)));
    }
    let pipeline = Pipeline::new(stages);
    let filtered = pipeline.run(mutations);

    if args.list {
        print_list(&filtered, args.json);
        return Ok(exit_code::SUCCESS);
    }

    let total_baseline_time: Duration = coverage
        .iter()
        .map(|c| Duration::from_secs_f64((c.run.elapsed_ms / 1000.0).max(0.0)))
        .sum();
    let timeouts = Timeouts::from_options(&options);
    let timeout_per_mutation = timeouts.mutation_timeout(total_baseline_time);

    let all_test_classes = tests.iter().map(|t| t.defining_class.clone()).collect();
    let test_index = tests
        .iter()
        .map(|t| (t.name.clone(), t.defining_class.clone()))
        .collect();
    let partitioner = Partitioner::new(
        options.unit_size,
        options.full_matrix_research_mode,
        all_test_classes,
        timeout_per_mutation,
    )
    .with_test_index(test_index);
    let units = partitioner.partition(filtered);
    info!(units = units.len(), "partitioned mutations into work units");

    let exe_path = current_exe_path()?;
    let controller = Controller {
        exe_path,
        work_dir: options.dir.clone(),
        test_index_path: options.tests_path.clone(),
        command_template: options.test_command.clone(),
        research_mode: options.full_matrix_research_mode,
        unit_watchdog: timeout_per_mutation * 4 + Duration::from_secs(30),
    };

    let total_mutations: usize = units.iter().map(|u| u.mutations.len()).sum();
    let progress = Progress::new(total_mutations);

    let matrix_path = options.out_dir.join("mutation-matrix.csv");
    let matrix_writer = MatrixWriter::create(&matrix_path)?;
    let summary = run_units(&controller, units, &progress, options.threads, matrix_writer)?;
    info!(path = %matrix_path, "wrote matrix CSV");

    let tally = progress.finish();
    if !args.quiet {
        println!(
            "{} killed, {} survived, {} no coverage, {} timed out, {} memory error, {} run error, {} non-viable",
            tally.killed,
            tally.survived,
            tally.no_coverage,
            tally.timed_out,
            tally.memory_error,
            tally.run_error,
            tally.non_viable,
        );
    }

    Ok(if summary.timed_out > 0 {
        exit_code::TIMEOUT
    } else if summary.survived > 0 {
        exit_code::FOUND_PROBLEMS
    } else {
        exit_code::SUCCESS
    })
}

/// Run every work unit to completion, across `options.threads` controller
/// threads (spec.md §5 "Controller-level: a worker pool of configurable
/// size `threads` executes work units in parallel").
///
/// Each unit's rows are appended to `matrix_writer` as soon as it finishes,
/// and only the lightweight [`Summary`] counts are kept beyond that point
/// (spec.md §4.4 "Memory discipline").
fn run_units(
    controller: &Controller,
    units: Vec<WorkUnit>,
    progress: &Progress,
    thread_count: usize,
    matrix_writer: MatrixWriter,
) -> Result<Summary> {
    let queue: Mutex<VecDeque<(usize, WorkUnit)>> =
        Mutex::new(units.into_iter().enumerate().collect());
    let aggregator = Mutex::new(Aggregator::new());
    let matrix_writer = Mutex::new(matrix_writer);
    let thread_count = thread_count.max(1);
    std::thread::scope(|scope| -> Result<()> {
        for _ in 0..thread_count {
            scope.spawn(|| loop {
                let next = queue.lock().expect("queue mutex poisoned").pop_front();
                let Some((unit_index, unit)) = next else {
                    break;
                };
                if interrupt::check_interrupted().is_err() {
                    break;
                }
                match controller.run_unit(&unit, unit_index, progress) {
                    Ok(unit_results) => {
                        if let Err(e) = matrix_writer
                            .lock()
                            .expect("matrix writer mutex poisoned")
                            .write_unit(&unit_results)
                        {
                            warn!("work unit {unit_index} failed to write matrix rows: {e:#}");
                        }
                        aggregator
                            .lock()
                            .expect("aggregator mutex poisoned")
                            .add_unit(&unit_results);
                    }
                    Err(e) => {
                        warn!("work unit {unit_index} failed: {e:#}");
                    }
                }
            });
        }
        Ok(())
    })?;
    Ok(aggregator.into_inner().expect("aggregator mutex poisoned").finish())
}

fn print_list(mutations: &[MutationDetails], json: bool) {
    if json {
        let json = serde_json::to_string_pretty(mutations).expect("mutations serialize to JSON");
        println!("{json}");
    } else {
        for mutation in mutations {
            println!("{mutation}");
        }
    }
}

fn current_exe_path() -> Result<Utf8PathBuf> {
    let path = std::env::current_exe().context("locate current executable")?;
    Utf8PathBuf::from_path_buf(path)
        .map_err(|p| anyhow::anyhow!("executable path {p:?} is not valid UTF-8"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn current_exe_path_points_at_an_existing_file() {
        let path = current_exe_path().unwrap();
        assert!(path.is_file());
    }
}

/// Install a `tracing-subscriber` pipeline: console output gated by
/// `-v`/`-q`/`RUST_LOG`, plus a non-blocking per-run log file under the
/// output directory (spec.md AMBIENT STACK / Logging).
fn init_logging(args: &Args) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let file_appender = tracing_appender::rolling::never(&args.out, "mutation-matrix.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let level = if args.quiet {
        "warn"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .init();

    Ok(guard)
}
