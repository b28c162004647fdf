// Copyright 2021, 2022 Martin Pool

//! Manage a subprocess, with polling, timeouts, termination, and so on.
//!
//! This module has no knowledge of what the subprocess is (a worker
//! subprocess, or a test command run by the reference [`crate::harness`]
//! implementations) — it is the single place that owns `Popen`, timeouts,
//! and signal delivery.
//!
//! On Unix, the subprocess runs in its own process group, so that any
//! grandchild processes are also signalled if it's interrupted or times out.

use std::ffi::OsString;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use camino::Utf8Path;
use subprocess::{Popen, PopenConfig, Redirection};
use tracing::{debug, info, span, trace, warn, Level};

use crate::interrupt::check_interrupted;
use crate::log_file::LogFile;

/// How often to poll a running child for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct Process {
    child: Popen,
    start: Instant,
    timeout: Duration,
}

impl Process {
    /// Start `argv` in `cwd`, with extra environment variables, writing all
    /// output to `log_file`.
    pub fn start(
        argv: &[String],
        env: &[(&str, &str)],
        cwd: &Utf8Path,
        timeout: Duration,
        log_file: &LogFile,
    ) -> Result<Process> {
        let start = Instant::now();
        log_file.message(&format!("run {}", argv.join(" ")))?;
        debug!("start {argv:?}");
        let mut os_env = PopenConfig::current_env();
        os_env.extend(
            env.iter()
                .map(|&(k, v)| (OsString::from(k), OsString::from(v))),
        );
        let child = Popen::create(
            argv,
            PopenConfig {
                stdin: Redirection::None,
                stdout: Redirection::File(log_file.open_append()?),
                stderr: Redirection::Merge,
                cwd: Some(cwd.as_os_str().to_owned()),
                env: Some(os_env),
                ..setpgid_on_unix()
            },
        )
        .with_context(|| format!("failed to spawn {}", argv.join(" ")))?;
        Ok(Process {
            child,
            start,
            timeout,
        })
    }

    /// Poll for completion, blocking for up to [`POLL_INTERVAL`].
    ///
    /// Returns `Ok(None)` while still running, `Ok(Some(status))` once the
    /// child has exited or been killed for timeout/interrupt.
    pub fn poll(&mut self) -> Result<Option<ProcessStatus>> {
        let elapsed = self.start.elapsed();
        if elapsed > self.timeout {
            info!(
                "timeout after {:.1}s, terminating child process...",
                elapsed.as_secs_f32()
            );
            self.terminate()?;
            return Ok(Some(ProcessStatus::Timeout));
        }
        if let Err(e) = check_interrupted() {
            debug!("interrupted, terminating child process...");
            self.terminate()?;
            return Err(e);
        }
        match self.child.wait_timeout(POLL_INTERVAL)? {
            Some(status) if status.success() => Ok(Some(ProcessStatus::Success)),
            Some(_status) => Ok(Some(ProcessStatus::Failure)),
            None => Ok(None),
        }
    }

    /// Block until the process exits, polling and respecting timeout/interrupt.
    pub fn wait(&mut self) -> Result<ProcessStatus> {
        loop {
            if let Some(status) = self.poll()? {
                return Ok(status);
            }
        }
    }

    /// Terminate the subprocess, initially gently and then harshly.
    fn terminate(&mut self) -> Result<()> {
        let _span = span!(Level::DEBUG, "terminate_child", pid = self.child.pid()).entered();
        debug!("terminating child process");
        terminate_child_impl(&mut self.child)?;
        trace!("wait for child after termination");
        if let Some(exit_status) = self
            .child
            .wait_timeout(Duration::from_secs(10))
            .context("wait for child after terminating pgroup")?
        {
            debug!("terminated child exit status {exit_status:?}");
        } else {
            warn!("child did not exit after termination");
            let kill_result = self.child.kill();
            warn!("force kill child: {:?}", kill_result);
            if kill_result.is_ok() {
                if let Ok(Some(exit_status)) = self
                    .child
                    .wait_timeout(Duration::from_secs(10))
                    .context("wait for child after force kill")
                {
                    debug!("force kill child exit status {exit_status:?}");
                } else {
                    warn!("child did not exit after force kill");
                }
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
fn terminate_child_impl(child: &mut Popen) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};

    let pid = nix::unistd::Pid::from_raw(
        child
            .pid()
            .expect("child has a pid")
            .try_into()
            .expect("pid fits in pid_t"),
    );
    if let Err(errno) = killpg(pid, Signal::SIGTERM) {
        // It might have already exited, in which case we can proceed to wait for it.
        if errno != Errno::ESRCH {
            let message = format!("failed to terminate child: {errno}");
            warn!("{}", message);
            return Err(anyhow!(message));
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn terminate_child_impl(child: &mut Popen) -> Result<()> {
    if let Err(e) = child.terminate() {
        let message = format!("failed to terminate child: {e}");
        warn!("{}", message);
        return Err(anyhow!(message));
    }
    Ok(())
}

/// The result of running a single child process to completion.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ProcessStatus {
    Success,
    Failure,
    Timeout,
}

impl ProcessStatus {
    pub fn success(self) -> bool {
        self == ProcessStatus::Success
    }
}

#[cfg(unix)]
fn setpgid_on_unix() -> PopenConfig {
    PopenConfig {
        setpgid: true,
        ..Default::default()
    }
}

#[cfg(not(unix))]
fn setpgid_on_unix() -> PopenConfig {
    Default::default()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::log_file::LogFile;

    fn log_file() -> (tempfile::TempDir, LogFile) {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();
        let log = LogFile::create(dir, "test").unwrap();
        (tmp, log)
    }

    #[test]
    fn successful_command_reports_success() {
        let (_tmp, log) = log_file();
        let cwd = Utf8Path::new(".");
        let mut process = Process::start(
            &["true".to_owned()],
            &[],
            cwd,
            Duration::from_secs(10),
            &log,
        )
        .unwrap();
        assert_eq!(process.wait().unwrap(), ProcessStatus::Success);
    }

    #[test]
    fn failing_command_reports_failure() {
        let (_tmp, log) = log_file();
        let cwd = Utf8Path::new(".");
        let mut process = Process::start(
            &["false".to_owned()],
            &[],
            cwd,
            Duration::from_secs(10),
            &log,
        )
        .unwrap();
        assert_eq!(process.wait().unwrap(), ProcessStatus::Failure);
    }

    #[test]
    fn slow_command_is_terminated_on_timeout() {
        let (_tmp, log) = log_file();
        let cwd = Utf8Path::new(".");
        let mut process = Process::start(
            &["sleep".to_owned(), "30".to_owned()],
            &[],
            cwd,
            Duration::from_millis(100),
            &log,
        )
        .unwrap();
        assert_eq!(process.wait().unwrap(), ProcessStatus::Timeout);
    }
}
