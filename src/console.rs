// Copyright 2021 - 2025 Martin Pool

//! Interactive progress display, shown while the engine runs (one line per
//! in-flight work unit plus a running tally), and the colored formatting
//! used for one-line mutation summaries in non-interactive output.

use std::fmt::Write as _;
use std::sync::Mutex;

use console::style;
use nutmeg::Model;

use crate::mutation::MutationDetails;
use crate::status::DetectionStatus;

/// Running counts of terminal statuses seen so far, for the tally line.
#[derive(Debug, Default, Clone, Copy)]
pub struct Tally {
    pub killed: usize,
    pub survived: usize,
    pub no_coverage: usize,
    pub timed_out: usize,
    pub memory_error: usize,
    pub run_error: usize,
    pub non_viable: usize,
}

impl Tally {
    pub fn record(&mut self, status: DetectionStatus) {
        match status {
            DetectionStatus::Killed => self.killed += 1,
            DetectionStatus::Survived => self.survived += 1,
            DetectionStatus::NoCoverage => self.no_coverage += 1,
            DetectionStatus::TimedOut => self.timed_out += 1,
            DetectionStatus::MemoryError => self.memory_error += 1,
            DetectionStatus::RunError => self.run_error += 1,
            DetectionStatus::NonViable => self.non_viable += 1,
            DetectionStatus::NotStarted | DetectionStatus::Started => {}
        }
    }

    pub fn total_finished(&self) -> usize {
        self.killed
            + self.survived
            + self.no_coverage
            + self.timed_out
            + self.memory_error
            + self.run_error
            + self.non_viable
    }
}

/// The [`nutmeg::Model`] driving the live progress line: how many units and
/// mutations are done out of the discovered total, plus which unit each
/// active worker is currently processing.
pub struct ProgressModel {
    pub total_mutations: usize,
    pub tally: Tally,
    pub active_units: Vec<String>,
}

impl ProgressModel {
    pub fn new(total_mutations: usize) -> ProgressModel {
        ProgressModel {
            total_mutations,
            tally: Tally::default(),
            active_units: Vec::new(),
        }
    }
}

impl Model for ProgressModel {
    fn render(&mut self, _width: usize) -> String {
        let mut out = format!(
            "{}/{} mutations: {} killed, {} survived, {} no coverage",
            self.tally.total_finished(),
            self.total_mutations,
            self.tally.killed,
            self.tally.survived,
            self.tally.no_coverage
        );
        if self.tally.timed_out + self.tally.memory_error + self.tally.run_error > 0 {
            let _ = write!(
                out,
                ", {} timed out, {} memory error, {} run error",
                self.tally.timed_out, self.tally.memory_error, self.tally.run_error
            );
        }
        if !self.active_units.is_empty() {
            let _ = write!(out, "\n{}", self.active_units.join("\n"));
        }
        out
    }
}

/// Wraps a [`nutmeg::View`] behind a mutex so the controller's worker
/// threads can all report progress without coordinating externally.
pub struct Progress {
    view: Mutex<nutmeg::View<ProgressModel>>,
}

impl Progress {
    pub fn new(total_mutations: usize) -> Progress {
        let view = nutmeg::View::new(ProgressModel::new(total_mutations), nutmeg::Options::default());
        Progress {
            view: Mutex::new(view),
        }
    }

    pub fn record_status(&self, status: DetectionStatus) {
        self.view.lock().unwrap().update(|model| model.tally.record(status));
    }

    pub fn set_active_units(&self, descriptions: Vec<String>) {
        self.view
            .lock()
            .unwrap()
            .update(|model| model.active_units = descriptions);
    }

    pub fn message(&self, text: &str) {
        self.view.lock().unwrap().message(text);
    }

    pub fn finish(self) -> Tally {
        self.view
            .into_inner()
            .unwrap()
            .finish()
            .tally
    }
}

/// A short, colored one-line summary of one mutation's outcome, used for
/// `--list` output and per-mutation log messages.
pub fn format_mutation_line(mutation: &MutationDetails, status: DetectionStatus) -> String {
    let styled_status = match status {
        DetectionStatus::Killed => style(status.name()).green(),
        DetectionStatus::Survived => style(status.name()).red().bold(),
        DetectionStatus::NoCoverage => style(status.name()).yellow(),
        DetectionStatus::TimedOut | DetectionStatus::MemoryError | DetectionStatus::RunError => {
            style(status.name()).magenta()
        }
        DetectionStatus::NonViable => style(status.name()).dim(),
        DetectionStatus::NotStarted | DetectionStatus::Started => style(status.name()),
    };
    format!("{styled_status} {mutation}")
}
