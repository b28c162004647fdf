// Copyright 2021 - 2024 Martin Pool

//! A process-wide flag set by a Ctrl-C handler, checked cooperatively by
//! long-running loops so that an interrupt promptly unwinds through
//! `Result` rather than leaving workers or build directories behind.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Result};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Install the Ctrl-C handler. Call this once from `main`.
pub fn install_handler() -> Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("interrupted...");
        INTERRUPTED.store(true, Ordering::SeqCst);
    })?;
    Ok(())
}

/// Return `Err` if an interrupt has been received since startup (or since
/// the last reset, in tests).
pub fn check_interrupted() -> Result<()> {
    if INTERRUPTED.load(Ordering::SeqCst) {
        bail!("interrupted");
    }
    Ok(())
}

#[cfg(test)]
pub fn reset_for_test() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}
