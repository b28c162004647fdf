// Copyright 2021 - 2025 Martin Pool

//! Contracts for the three collaborators the core pipeline depends on but
//! does not implement (spec.md §1 "Out of scope"): mutation generation,
//! test discovery, and byte-level code transformation.
//!
//! Each trait also gets one small reference implementation so the crate is
//! runnable and its integration tests can drive the whole pipeline without
//! a real build tool. Production use is expected to supply its own adapters
//! (e.g. a `cargo test`-per-crate harness, or a JVM classloader-backed one);
//! the core never assumes which.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use camino::Utf8PathBuf;

use crate::mutation::MutationDetails;
use crate::outcome::TestOutcome;

/// A single runnable test, as enumerated by a [`TestDiscovery`] adapter.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct TestUnit {
    /// Fully-qualified test name.
    pub name: String,
    /// The class/module that defines it, used by normal-mode unit
    /// partitioning (spec.md §4.3: "defining classes of the statically-covering tests").
    pub defining_class: String,
}

impl TestUnit {
    pub fn new(name: impl Into<String>, defining_class: impl Into<String>) -> TestUnit {
        TestUnit {
            name: name.into(),
            defining_class: defining_class.into(),
        }
    }
}

/// Produces the ordered set of mutations to analyze. Out of scope for the
/// core (spec.md §1: "mutation-generation engine"); supplied externally.
pub trait MutationSource {
    fn discover(&self) -> Result<Vec<MutationDetails>>;
}

/// Enumerates the runnable tests in the project. Out of scope for the core
/// (spec.md §1: "test discovery/adapter layer").
pub trait TestDiscovery {
    fn discover(&self) -> Result<Vec<TestUnit>>;
}

/// Given the original code and a mutation's details, returns the mutated
/// code. Out of scope for the core (spec.md §1: "byte-level code
/// transformation"). An `Err` here is a transformation failure distinct
/// from a harness-level install rejection; the worker treats both the same
/// way (`NON_VIABLE`, spec.md §4.5).
pub trait CodeTransformer {
    fn transform(&self, original: &[u8], mutation: &MutationDetails) -> Result<Vec<u8>>;
}

/// The result of running one test (spec.md §4.1, §4.5): pass/fail, timing,
/// exception detail on failure, and (baseline only) the code locations the
/// test visited, for coverage projection.
#[derive(Debug, Clone)]
pub struct TestRunResult {
    pub passed: bool,
    pub elapsed_ms: f64,
    pub exception: Option<ExceptionDetail>,
    /// `(dotted_class, line)` pairs visited while running this test.
    /// Empty when the harness does not support instrumentation — the
    /// baseline collector and failing-line filter both degrade gracefully
    /// when this is always empty (spec.md §4.2 edge case).
    pub visited_lines: Vec<(String, u32)>,
    /// The test itself hit `timeout` before finishing. Callers must stop
    /// running further tests for the current mutation and finalize it as
    /// `TIMED_OUT` (spec.md §4.5) rather than treat this as a pass/fail
    /// result or propagate an error.
    pub timed_out: bool,
}

impl TestRunResult {
    pub fn into_test_outcome(self, test_name: impl Into<String>) -> TestOutcome {
        let test_name = test_name.into();
        match self.exception {
            Some(e) => TestOutcome::failed(
                test_name,
                self.elapsed_ms,
                e.type_name,
                e.message,
                e.stack_trace,
            ),
            None => TestOutcome::passed(test_name, self.elapsed_ms),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExceptionDetail {
    pub type_name: String,
    pub message: String,
    pub stack_trace: String,
}

/// Loads a program image and runs named tests against it. This is the
/// "active class environment" spec.md §4.5 describes installing mutated
/// images into; the core only relies on `install` and `run_test`.
pub trait TestHarness {
    /// Install a mutated image for `class_name`, evicting any prior mutated
    /// image for that same class (spec.md §4.5). `Err` means the image was
    /// rejected (e.g. a verifier failure) and the caller should record
    /// `NON_VIABLE` without running any tests.
    fn install(&mut self, class_name: &str, image: Vec<u8>) -> Result<()>;

    /// Revert to the unmutated image for every class previously installed.
    fn revert_all(&mut self) -> Result<()>;

    /// Run one test to completion (or until `timeout` elapses) against
    /// whatever images are currently installed.
    fn run_test(&mut self, test: &TestUnit, timeout: Duration) -> Result<TestRunResult>;
}

/// A reference [`TestHarness`] + [`CodeTransformer`] pair that treats
/// "classes" as plain source files on disk and runs tests by invoking a
/// shell command template with `{test}` substituted for the test's name.
///
/// This mirrors the teacher's own `run_cargo`/`Process` pattern (spawn,
/// poll with a timeout, inspect the exit status) but is deliberately
/// generic: it knows nothing about Cargo, rustc, or any other toolchain.
pub struct CommandTestHarness {
    work_dir: Utf8PathBuf,
    /// Shell command template, e.g. `"my-test-runner {test}"`.
    command_template: String,
    installed: HashMap<String, Vec<u8>>,
    originals: HashMap<String, Vec<u8>>,
}

impl CommandTestHarness {
    pub fn new(work_dir: Utf8PathBuf, command_template: impl Into<String>) -> CommandTestHarness {
        CommandTestHarness {
            work_dir,
            command_template: command_template.into(),
            installed: HashMap::new(),
            originals: HashMap::new(),
        }
    }

    fn class_path(&self, class_name: &str) -> Utf8PathBuf {
        self.work_dir.join(class_name)
    }
}

impl TestHarness for CommandTestHarness {
    fn install(&mut self, class_name: &str, image: Vec<u8>) -> Result<()> {
        let path = self.class_path(class_name);
        if !self.originals.contains_key(class_name) {
            let existing = std::fs::read(path.as_std_path())
                .map_err(|e| anyhow!("cannot read original image for {class_name}: {e}"))?;
            self.originals.insert(class_name.to_owned(), existing);
        }
        std::fs::write(path.as_std_path(), &image)
            .map_err(|e| anyhow!("verifier rejected image for {class_name}: {e}"))?;
        self.installed.insert(class_name.to_owned(), image);
        Ok(())
    }

    fn revert_all(&mut self) -> Result<()> {
        for (class_name, original) in self.originals.drain() {
            std::fs::write(self.class_path(&class_name).as_std_path(), original)?;
        }
        self.installed.clear();
        Ok(())
    }

    fn run_test(&mut self, test: &TestUnit, timeout: Duration) -> Result<TestRunResult> {
        let start = Instant::now();
        let argv: Vec<String> = self
            .command_template
            .replace("{test}", &test.name)
            .split_whitespace()
            .map(str::to_owned)
            .collect();
        let log_file = crate::log_file::LogFile::create(
            &self.work_dir.join(".mutation-matrix-harness-logs"),
            &test.name,
        )?;
        let mut process =
            crate::process::Process::start(&argv, &[], &self.work_dir, timeout, &log_file)?;
        let status = process.wait()?;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        let output = std::fs::read_to_string(log_file.path().as_std_path()).unwrap_or_default();
        match status {
            crate::process::ProcessStatus::Success => Ok(TestRunResult {
                passed: true,
                elapsed_ms,
                exception: None,
                visited_lines: Vec::new(),
                timed_out: false,
            }),
            crate::process::ProcessStatus::Failure => Ok(TestRunResult {
                passed: false,
                elapsed_ms,
                exception: Some(ExceptionDetail {
                    type_name: "TestFailure".to_owned(),
                    message: format!("{} exited non-zero", test.name),
                    stack_trace: output,
                }),
                visited_lines: Vec::new(),
                timed_out: false,
            }),
            crate::process::ProcessStatus::Timeout => Ok(TestRunResult {
                passed: false,
                elapsed_ms,
                exception: None,
                visited_lines: Vec::new(),
                timed_out: true,
            }),
        }
    }
}

/// A reference [`CodeTransformer`] that replaces a single line of a text
/// file. The replacement text is encoded in `mutator_tag` as
/// `"line_replace:<new text>"` — a convention private to this reference
/// implementation, not part of the core's contract with real transformers.
pub struct LineReplaceTransformer;

impl CodeTransformer for LineReplaceTransformer {
    fn transform(&self, original: &[u8], mutation: &MutationDetails) -> Result<Vec<u8>> {
        let replacement = mutation
            .id
            .mutator_tag
            .strip_prefix("line_replace:")
            .ok_or_else(|| {
                anyhow!(
                    "LineReplaceTransformer only understands line_replace: mutator tags, got {:?}",
                    mutation.id.mutator_tag
                )
            })?;
        let text = std::str::from_utf8(original)?;
        let line_index = mutation
            .line
            .checked_sub(1)
            .ok_or_else(|| anyhow!("line number must be >= 1"))? as usize;
        let mut lines: Vec<&str> = text.lines().collect();
        if line_index >= lines.len() {
            return Err(anyhow!(
                "line {} out of range ({} lines)",
                mutation.line,
                lines.len()
            ));
        }
        lines[line_index] = replacement;
        Ok(lines.join("\n").into_bytes())
    }
}

/// A reference [`MutationSource`] that reads a manifest file (produced by
/// whatever mutation-generation engine is actually wired in) rather than
/// generating mutations itself — mutation generation stays out of scope
/// (spec.md §1), this just gives the CLI something runnable end to end.
///
/// Manifest format: TOML, one `[[mutations]]` table per mutation, fields
/// matching [`MutationDetails`] (including its nested `id` table).
pub struct FileMutationSource {
    manifest_path: Utf8PathBuf,
}

impl FileMutationSource {
    pub fn new(manifest_path: Utf8PathBuf) -> FileMutationSource {
        FileMutationSource { manifest_path }
    }
}

#[derive(serde::Deserialize)]
struct MutationManifest {
    mutations: Vec<MutationDetails>,
}

impl MutationSource for FileMutationSource {
    fn discover(&self) -> Result<Vec<MutationDetails>> {
        let text = std::fs::read_to_string(self.manifest_path.as_std_path())
            .map_err(|e| anyhow!("cannot read mutation manifest {}: {e}", self.manifest_path))?;
        let manifest: MutationManifest = toml::from_str(&text)
            .map_err(|e| anyhow!("cannot parse mutation manifest {}: {e}", self.manifest_path))?;
        Ok(manifest.mutations)
    }
}

/// A reference [`TestDiscovery`] that reads a flat text index: one test per
/// line, `<defining_class> <test_name>`, blank lines and `#`-comments
/// ignored. Real test discovery (scanning a build tree, querying a test
/// runner) is out of scope (spec.md §1); this is the minimal adapter that
/// makes the reference [`CommandTestHarness`] pipeline runnable.
pub struct FileTestDiscovery {
    index_path: Utf8PathBuf,
}

impl FileTestDiscovery {
    pub fn new(index_path: Utf8PathBuf) -> FileTestDiscovery {
        FileTestDiscovery { index_path }
    }
}

impl TestDiscovery for FileTestDiscovery {
    fn discover(&self) -> Result<Vec<TestUnit>> {
        let text = std::fs::read_to_string(self.index_path.as_std_path())
            .map_err(|e| anyhow!("cannot read test index {}: {e}", self.index_path))?;
        let mut tests = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (defining_class, name) = line
                .split_once(char::is_whitespace)
                .ok_or_else(|| anyhow!("malformed test index line: {line:?}"))?;
            tests.push(TestUnit::new(name.trim(), defining_class));
        }
        Ok(tests)
    }
}
