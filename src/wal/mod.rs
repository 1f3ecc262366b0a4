//! Write-Ahead Logging (WAL) module.
//!
//! This module implements a **durable**, **append-only**, **segmented**
//! write-ahead log of mutation records. Every mutation is appended (and, by
//! default, fsynced) before its in-memory effect becomes observable; on
//! restart the log is replayed to rebuild store state.
//!
//! ## Design Overview
//!
//! A WAL is a directory of segment files named `%016x.wal`, where the hex
//! value is the store-wide sequence number of the segment's first record.
//! [`Wal`] owns the write side: it opens (or creates) the latest segment,
//! stamps every record with a dense, monotonically increasing sequence
//! number, rotates segments past a byte threshold, and hands sealed
//! segments off for archival. [`WalReader`] owns the read side: it streams
//! the concatenation of all segments in sequence order and detects gaps.
//!
//! # On-disk layout
//!
//! ```text
//! <dir>/0000000000000000.wal
//! <dir>/00000000000004d2.wal      <- first record has seq 1234
//! ...
//! ```
//!
//! Each segment is a sequence of frames `[len LE][crc32c LE][payload]`
//! (see [`crate::record`]).
//!
//! # Guarantees
//!
//! - **Durability:** with [`SyncMode::Always`] (the default) every append is
//!   fsynced before the caller observes success.
//! - **Sequencing:** record sequence numbers are dense (`seq(n+1) = seq(n)+1`)
//!   across the whole directory; replay fails on any gap.
//! - **Exclusion:** the active segment holds an OS advisory lock, so two
//!   store instances cannot append to the same directory.
//! - **Corruption detection:** replay stops cleanly at a torn tail frame and
//!   aborts on any checksum or decode failure.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

pub mod segment;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crossbeam::channel::Sender;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::record::{Command, Record, RecordError};

pub use segment::{Segment, SegmentIter, parse_segment_name, segment_file_name};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by WAL operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WalError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The WAL directory exists but holds no segments.
    ///
    /// A *normal* state for a fresh store, not a failure: recovery treats it
    /// as "nothing to replay".
    #[error("no WAL segments found in {0}")]
    NotFound(PathBuf),

    /// A `.wal` file in the directory does not follow the `%016x.wal` naming.
    #[error("bad WAL segment name: {0}")]
    BadWalName(String),

    /// Codec failure: checksum mismatch, malformed payload, unknown command.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// Replay found segments whose sequences are not contiguous.
    #[error("sequence gap during replay: expected {expected}, found segment starting at {found}")]
    SequenceGap {
        /// The next sequence number replay expected to see.
        expected: u64,
        /// The leading sequence of the segment actually found.
        found: u64,
    },

    /// Another process holds the advisory lock on the active segment.
    #[error("WAL segment locked by another process: {0}")]
    Locked(PathBuf),
}

// ------------------------------------------------------------------------------------------------
// Options
// ------------------------------------------------------------------------------------------------

/// When appends are fsynced relative to acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Fsync before every successful append returns. The default.
    #[default]
    Always,

    /// Never fsync on append; only on rotation and close. An explicit
    /// opt-in that trades crash durability for throughput.
    Never,
}

/// Tunables for the write side of the WAL.
#[derive(Debug, Clone)]
pub struct WalOptions {
    /// Durability policy for appends.
    pub sync: SyncMode,

    /// Byte size past which the active segment is sealed and rotated.
    pub rotate_threshold: u64,
}

impl Default for WalOptions {
    fn default() -> Self {
        Self {
            sync: SyncMode::Always,
            rotate_threshold: 64 * 1024 * 1024,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Write side
// ------------------------------------------------------------------------------------------------

/// The write side of a WAL directory.
///
/// Owns the active segment and the store-wide sequence counter. All appends
/// go through one `Wal` value; callers serialize access (the store wraps it
/// in a mutex), which keeps sequence numbers dense and the file append-only.
#[derive(Debug)]
pub struct Wal {
    dir: PathBuf,
    active: Option<Segment>,
    next_seq: u64,
    options: WalOptions,
    sealed_tx: Option<Sender<PathBuf>>,
}

impl Wal {
    /// Opens the write side of `dir`, continuing at `next_seq`.
    ///
    /// Picks the lexicographically greatest segment for appending, or
    /// creates the initial segment (named after `next_seq`) when the
    /// directory is empty. `sealed_tx`, when present, receives the path of
    /// every segment this WAL seals — rotation hands sealed files there for
    /// out-of-band archival.
    pub fn open(
        dir: &Path,
        next_seq: u64,
        options: WalOptions,
        sealed_tx: Option<Sender<PathBuf>>,
    ) -> Result<Self, WalError> {
        fs::create_dir_all(dir)?;

        let active = match list_segments(dir)?.pop() {
            Some((base, path)) => {
                if base > next_seq {
                    return Err(WalError::SequenceGap {
                        expected: next_seq,
                        found: base,
                    });
                }
                Segment::open_append(&path)?
            }
            None => Segment::create(dir, next_seq)?,
        };

        info!(dir = %dir.display(), next_seq, "WAL opened for writing");

        Ok(Self {
            dir: dir.to_path_buf(),
            active: Some(active),
            next_seq,
            options,
            sealed_tx,
        })
    }

    /// Appends one mutation, stamping it with the next sequence number.
    ///
    /// With [`SyncMode::Always`] the record is fsynced before this returns,
    /// so a successful return means the mutation is durable. Returns the
    /// assigned sequence number.
    pub fn append(&mut self, cmd: Command, key: &str, value: &str) -> Result<u64, WalError> {
        // Rotate first: a rotation failure then leaves the record unwritten
        // rather than durable-but-unacknowledged.
        self.maybe_rotate()?;

        let seq = self.next_seq;
        let record = Record::new(seq, cmd, key, value);
        let frame = record.encode_frame()?;

        let sync_now = self.options.sync == SyncMode::Always;
        let active = self.active_mut();
        active.append(&frame)?;
        if sync_now {
            active.flush()?;
        }
        self.next_seq += 1;
        Ok(seq)
    }

    /// Forces all appended bytes to disk.
    pub fn flush(&mut self) -> Result<(), WalError> {
        self.active_mut().flush()
    }

    /// The sequence number the next append will be stamped with.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Whether `seq` is the sequence the next append would receive.
    pub fn valid_seq(&self, seq: u64) -> bool {
        seq == self.next_seq
    }

    /// Path of the active segment.
    pub fn active_path(&self) -> &Path {
        self.active
            .as_ref()
            .expect("WAL has an active segment")
            .path()
    }

    /// Flushes and closes the active segment, sealing it.
    ///
    /// The sealed path is offered to the archive handoff like any rotated
    /// segment: closing the store is the final seal.
    pub fn close(mut self) -> Result<(), WalError> {
        if let Some(active) = self.active.take() {
            let sealed = active.close()?;
            self.offer_sealed(sealed);
        }
        info!(dir = %self.dir.display(), next_seq = self.next_seq, "WAL closed");
        Ok(())
    }

    /// Seals the active segment and starts a fresh one once the size
    /// threshold is crossed.
    fn maybe_rotate(&mut self) -> Result<(), WalError> {
        if self.active_mut().size() < self.options.rotate_threshold {
            return Ok(());
        }

        let old = self.active.take().expect("WAL has an active segment");
        let old_base = old.base_seq();
        let sealed = old.close()?;
        self.offer_sealed(sealed);

        self.active = Some(Segment::create(&self.dir, self.next_seq)?);

        info!(
            dir = %self.dir.display(),
            sealed_base = old_base,
            new_base = self.next_seq,
            "WAL segment rotated"
        );
        Ok(())
    }

    fn offer_sealed(&self, path: PathBuf) {
        if let Some(tx) = &self.sealed_tx {
            if tx.send(path.clone()).is_err() {
                warn!(path = %path.display(), "archive handoff closed; sealed segment not offered");
            }
        }
    }

    fn active_mut(&mut self) -> &mut Segment {
        self.active.as_mut().expect("WAL has an active segment")
    }
}

// ------------------------------------------------------------------------------------------------
// Read side
// ------------------------------------------------------------------------------------------------

/// The read side of a WAL directory, used during recovery.
///
/// Independent of any write handle; recovery opens the reader first, drains
/// it, and only then opens the write side.
#[derive(Debug)]
pub struct WalReader {
    dir: PathBuf,
    segments: Vec<(u64, PathBuf)>,
}

impl WalReader {
    /// Opens `dir` for replay.
    ///
    /// Returns [`WalError::NotFound`] when the directory holds no segments —
    /// the caller treats that as an empty history, not a failure.
    pub fn open(dir: &Path) -> Result<Self, WalError> {
        if !dir.is_dir() {
            return Err(WalError::NotFound(dir.to_path_buf()));
        }
        let segments = list_segments(dir)?;
        if segments.is_empty() {
            return Err(WalError::NotFound(dir.to_path_buf()));
        }

        debug!(dir = %dir.display(), count = segments.len(), "WAL opened for replay");

        Ok(Self {
            dir: dir.to_path_buf(),
            segments,
        })
    }

    /// Streams every record across all segments in sequence order.
    pub fn replay(&self) -> ReplayIter {
        info!(dir = %self.dir.display(), "WAL replay started");
        ReplayIter {
            segments: self.segments.clone().into_iter(),
            current: None,
            next_seq: self.segments.first().map(|(base, _)| *base).unwrap_or(0),
            failed: false,
        }
    }
}

/// Streaming replay iterator over a whole WAL directory.
///
/// Yields records in sequence order, stamping each with its derived
/// sequence number. Any gap between segments, checksum mismatch, or decode
/// failure yields an error and ends the stream; a torn frame at the tail of
/// the final segment ends the stream cleanly.
#[derive(Debug)]
pub struct ReplayIter {
    segments: std::vec::IntoIter<(u64, PathBuf)>,
    current: Option<SegmentIter>,
    next_seq: u64,
    failed: bool,
}

impl ReplayIter {
    /// The sequence number one past the last record yielded so far.
    ///
    /// After the iterator is exhausted this is the value the write side
    /// must continue from.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    fn open_next_segment(&mut self) -> Option<Result<(), WalError>> {
        let (base, path) = self.segments.next()?;
        if base != self.next_seq {
            return Some(Err(WalError::SequenceGap {
                expected: self.next_seq,
                found: base,
            }));
        }
        match Segment::iter(&path) {
            Ok(iter) => {
                self.current = Some(iter);
                Some(Ok(()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

impl Iterator for ReplayIter {
    type Item = Result<Record, WalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if self.current.is_none() {
                match self.open_next_segment()? {
                    Ok(()) => {}
                    Err(e) => {
                        self.failed = true;
                        return Some(Err(e));
                    }
                }
            }

            match self.current.as_mut().and_then(Iterator::next) {
                Some(Ok(payload)) => {
                    let seq = self.next_seq;
                    match Record::decode_payload(seq, &payload) {
                        Ok(record) => {
                            self.next_seq += 1;
                            return Some(Ok(record));
                        }
                        Err(e) => {
                            self.failed = true;
                            return Some(Err(e.into()));
                        }
                    }
                }
                Some(Err(e)) => {
                    self.failed = true;
                    return Some(Err(e));
                }
                None => {
                    // Segment exhausted; move on to the next one.
                    self.current = None;
                }
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Directory listing
// ------------------------------------------------------------------------------------------------

/// Lists the WAL segments of `dir`, sorted by leading sequence number.
///
/// Files without the `.wal` extension are ignored; files *with* it that do
/// not parse as segment names are a [`WalError::BadWalName`] — a foreign
/// file in the log directory is never silently skipped.
fn list_segments(dir: &Path) -> Result<Vec<(u64, PathBuf)>, WalError> {
    let mut segments = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.ends_with(".wal") {
            continue;
        }
        let base = parse_segment_name(name)?;
        segments.push((base, entry.path()));
    }
    segments.sort_by_key(|(base, _)| *base);
    Ok(segments)
}
