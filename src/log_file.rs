// Copyright 2021 - 2024 Martin Pool

//! Per-scenario log files: one per baseline run, one per mutation run,
//! holding whatever the test harness wrote to stdout/stderr.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};

/// A handle to a log file under the output directory's `log/` subdirectory.
///
/// Cloning is cheap; all clones refer to the same underlying file.
#[derive(Clone, Debug)]
pub struct LogFile {
    path: Arc<Utf8PathBuf>,
}

impl LogFile {
    /// Create (or truncate) a log file named after `scenario_name`.
    pub fn create(log_dir: &Utf8Path, scenario_name: &str) -> Result<LogFile> {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("create log directory {log_dir}"))?;
        let path = log_dir.join(format!("{}.log", clean_filename(scenario_name)));
        File::create(&path).with_context(|| format!("create log file {path}"))?;
        Ok(LogFile {
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Open the file for appending, e.g. to hand its fd to a child process.
    pub fn open_append(&self) -> Result<File> {
        OpenOptions::new()
            .append(true)
            .open(self.path.as_std_path())
            .with_context(|| format!("open log file {} for append", self.path))
    }

    /// Append a single message line, prefixed to stand out from raw test output.
    pub fn message(&self, message: &str) -> Result<()> {
        let mut f = self.open_append()?;
        writeln!(f, "*** {message}")?;
        Ok(())
    }
}

/// Turn a scenario name (which may contain slashes, colons, spaces) into
/// something safe to use as a single path component.
pub fn clean_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn clean_filename_replaces_unsafe_chars() {
        assert_eq!(
            clean_filename("src/foo.rs:12:3: replace a with b"),
            "src_foo.rs_12_3__replace_a_with_b"
        );
    }

    #[test]
    fn create_and_append() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();
        let log = LogFile::create(dir, "baseline").unwrap();
        log.message("hello").unwrap();
        let content = std::fs::read_to_string(log.path().as_std_path()).unwrap();
        assert!(content.contains("hello"));
    }
}
