// Copyright 2021 - 2025 Martin Pool

//! The worker wire protocol (spec.md §6): a length-prefixed stream of
//! self-describing frames between the controller and a worker subprocess.
//!
//! Deliberately not coupled to any one ecosystem's object-graph serializer
//! (spec.md §9 Design Notes): each frame is `<u32 length><bincode bytes>`,
//! where the payload deserializes to a tagged [`Frame`] enum.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::time::Duration;

use anyhow::{bail, Result};
use camino::Utf8PathBuf;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::mutation::{MutationDetails, MutationId};
use crate::outcome::{MutationStatusTestPair, TestOutcome};

/// The unit header a controller sends a freshly-spawned worker before any
/// result frames flow back (spec.md §4.5 "Bootstrap").
///
/// Framed with the same `<u32 length><bincode bytes>` envelope as [`Frame`]
/// (via [`write_framed`]/[`read_framed`]), just on the opposite direction of
/// the pipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkUnitHeader {
    pub mutations: Vec<MutationDetails>,
    pub test_classes: HashSet<String>,
    pub timeout_per_mutation_millis: u64,
    pub research_mode: bool,
    pub work_dir: Utf8PathBuf,
    pub test_index_path: Utf8PathBuf,
    pub command_template: String,
}

impl WorkUnitHeader {
    pub fn timeout_per_mutation(&self) -> Duration {
        Duration::from_millis(self.timeout_per_mutation_millis)
    }
}

/// Frames refuse to grow past this size; an oversized length prefix is
/// treated as a protocol violation rather than an allocation (spec.md §6
/// "Large-payload guard").
pub const MAX_FRAME_BYTES: u32 = 100 * 1024 * 1024;

/// One message on the result stream (spec.md §6).
///
/// Emitted per mutation, in this order: `MutationStarted`, zero or more
/// `TestOutcome` (research mode only), one `MutationResult`. A lone
/// `StreamTerminator` closes the unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Frame {
    MutationStarted(MutationId),
    TestOutcome {
        mutation: MutationId,
        outcome: TestOutcome,
    },
    MutationResult {
        mutation: MutationId,
        result: MutationStatusTestPair,
    },
    StreamTerminator,
}

/// Writes one `<u32 length><bincode bytes>` envelope around any
/// serializable payload; [`write_frame`] and the unit-header handshake both
/// build on this.
pub fn write_framed<T: Serialize, W: Write>(writer: &mut W, value: &T) -> Result<()> {
    let payload = bincode::serialize(value)?;
    let len: u32 = payload
        .len()
        .try_into()
        .map_err(|_| anyhow::anyhow!("payload too large to encode a u32 length prefix"))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// Reads one `<u32 length><bincode bytes>` envelope, or `Ok(None)` on a
/// clean end-of-stream before any bytes of the length prefix arrive.
/// Enforces [`MAX_FRAME_BYTES`] (spec.md §6).
pub fn read_framed<T: DeserializeOwned, R: Read>(reader: &mut R) -> Result<Option<T>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        bail!("protocol violation: frame length {len} exceeds the {MAX_FRAME_BYTES} byte guard");
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    Ok(Some(bincode::deserialize(&payload)?))
}

/// Writes one result frame.
pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> Result<()> {
    write_framed(writer, frame)
}

/// Reads one frame, or `Ok(None)` on a clean end-of-stream before any bytes
/// of the next length prefix arrive (the worker closed its pipe without
/// sending a `StreamTerminator`, e.g. because it crashed).
///
/// An oversized length prefix (`> MAX_FRAME_BYTES`) is a protocol
/// violation: the caller should treat outstanding mutations as `RUN_ERROR`
/// (spec.md §6, §7).
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Frame>> {
    read_framed(reader)
}
