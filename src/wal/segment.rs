//! A single append-only WAL segment file.
//!
//! Segments are named `%016x.wal` after the sequence number of their first
//! record, so lexicographic directory order equals sequence order. The write
//! handle holds an exclusive advisory lock (`flock`) for its lifetime;
//! replay handles are read-only and unlocked.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, error, trace, warn};

use crate::record::{FrameRead, read_frame};
use crate::wal::WalError;

/// File extension of WAL segments.
pub const SEGMENT_EXT: &str = "wal";

/// Builds the on-disk name of the segment whose first record is `seq`.
pub fn segment_file_name(seq: u64) -> String {
    format!("{seq:016x}.{SEGMENT_EXT}")
}

/// Parses a segment file name back into its leading sequence number.
///
/// Accepts exactly the shape produced by [`segment_file_name`]: sixteen
/// lowercase hex digits followed by `.wal`. Anything else in the WAL
/// directory that ends in `.wal` is a [`WalError::BadWalName`].
pub fn parse_segment_name(name: &str) -> Result<u64, WalError> {
    let hex = name
        .strip_suffix(".wal")
        .ok_or_else(|| WalError::BadWalName(name.to_string()))?;
    if hex.len() != 16 || !hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
        return Err(WalError::BadWalName(name.to_string()));
    }
    u64::from_str_radix(hex, 16).map_err(|_| WalError::BadWalName(name.to_string()))
}

/// An open WAL segment.
///
/// Write handles buffer appends and expose an explicit [`Segment::flush`];
/// the WAL manager decides when fsync happens relative to acknowledgement.
#[derive(Debug)]
pub struct Segment {
    file: BufWriter<File>,
    path: PathBuf,
    base_seq: u64,
    size: u64,
    locked: bool,
}

impl Segment {
    /// Creates a brand-new segment for writing; fails if the file exists.
    ///
    /// The parent directory entry is fsynced so the new file survives a
    /// crash immediately after rotation.
    pub fn create(dir: &Path, base_seq: u64) -> Result<Self, WalError> {
        let path = dir.join(segment_file_name(base_seq));
        let file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .append(true)
            .open(&path)?;
        lock_exclusive(&file, &path)?;
        sync_dir(dir)?;

        debug!(path = %path.display(), seq = base_seq, "WAL segment created");

        Ok(Self {
            file: BufWriter::new(file),
            path,
            base_seq,
            size: 0,
            locked: true,
        })
    }

    /// Opens an existing segment for appending.
    ///
    /// A torn frame left at the tail by a crash is cut off first, so new
    /// records are never appended behind unreadable bytes.
    pub fn open_append(path: &Path) -> Result<Self, WalError> {
        let name = file_name_str(path)?;
        let base_seq = parse_segment_name(name)?;

        let file = OpenOptions::new().read(true).append(true).open(path)?;
        lock_exclusive(&file, path)?;

        let mut size = file.metadata()?.len();
        let valid = valid_prefix_len(path)?;
        if valid < size {
            warn!(
                path = %path.display(),
                dropped = size - valid,
                "truncating torn frame at segment tail"
            );
            file.set_len(valid)?;
            file.sync_all()?;
            size = valid;
        }

        debug!(path = %path.display(), seq = base_seq, size, "WAL segment opened for append");

        Ok(Self {
            file: BufWriter::new(file),
            path: path.to_path_buf(),
            base_seq,
            size,
            locked: true,
        })
    }

    /// Appends one framed record.
    ///
    /// The bytes are handed to the OS before this returns; durability is
    /// only guaranteed after [`Segment::flush`].
    pub fn append(&mut self, frame: &[u8]) -> Result<(), WalError> {
        self.file.write_all(frame)?;
        self.size += frame.len() as u64;
        trace!(path = %self.path.display(), len = frame.len(), "WAL frame appended");
        Ok(())
    }

    /// Forces all appended bytes to disk (`fsync`).
    pub fn flush(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        Ok(())
    }

    /// Streams the verified payloads of this segment from its beginning.
    ///
    /// Opens an independent read-only handle so an active write handle is
    /// unaffected.
    pub fn iter(path: &Path) -> Result<SegmentIter, WalError> {
        let file = File::open(path)?;
        Ok(SegmentIter {
            reader: BufReader::new(file),
            path: path.to_path_buf(),
            done: false,
        })
    }

    /// Sequence number of the first record in this segment.
    pub fn base_seq(&self) -> u64 {
        self.base_seq
    }

    /// Current byte length of the segment.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes, releases the advisory lock, and closes the file.
    pub fn close(mut self) -> Result<PathBuf, WalError> {
        self.flush()?;
        self.unlock();
        debug!(path = %self.path.display(), size = self.size, "WAL segment closed");
        Ok(self.path.clone())
    }

    fn unlock(&mut self) {
        if self.locked {
            if let Err(e) = fs2::FileExt::unlock(self.file.get_ref()) {
                warn!(path = %self.path.display(), error = %e, "failed to release WAL segment lock");
            }
            self.locked = false;
        }
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        if let Err(e) = self.file.flush().and_then(|_| self.file.get_ref().sync_all()) {
            error!(path = %self.path.display(), error = %e, "WAL segment sync failed on drop");
        }
        self.unlock();
    }
}

/// Streaming reader over one segment's payloads.
///
/// Stops cleanly at end of file. A torn frame at the tail also ends the
/// stream (with a warning); checksum or decode failures propagate so the
/// caller can abort recovery.
#[derive(Debug)]
pub struct SegmentIter {
    reader: BufReader<File>,
    path: PathBuf,
    done: bool,
}

impl Iterator for SegmentIter {
    type Item = Result<Vec<u8>, WalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match read_frame(&mut self.reader) {
            Ok(FrameRead::Payload(payload)) => Some(Ok(payload)),
            Ok(FrameRead::Eof) => {
                self.done = true;
                None
            }
            Ok(FrameRead::Truncated) => {
                warn!(path = %self.path.display(), "WAL segment ends in a torn frame; treating as end of log");
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e.into()))
            }
        }
    }
}

/// Byte length of the segment's prefix of complete, checksum-valid frames.
///
/// Stops at end of file or at a torn tail frame; checksum failures
/// propagate, since appending after corrupt bytes would bury them.
fn valid_prefix_len(path: &Path) -> Result<u64, WalError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut len = 0u64;
    loop {
        match read_frame(&mut reader)? {
            FrameRead::Payload(payload) => {
                len += (crate::record::FRAME_HEADER_SIZE + payload.len()) as u64;
            }
            FrameRead::Eof | FrameRead::Truncated => return Ok(len),
        }
    }
}

fn file_name_str(path: &Path) -> Result<&str, WalError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| WalError::BadWalName(path.display().to_string()))
}

fn lock_exclusive(file: &File, path: &Path) -> Result<(), WalError> {
    file.try_lock_exclusive().map_err(|e| {
        if e.kind() == fs2::lock_contended_error().kind() {
            WalError::Locked(path.to_path_buf())
        } else {
            WalError::Io(e)
        }
    })
}

/// Fsyncs a directory so freshly created entries survive a crash.
fn sync_dir(dir: &Path) -> Result<(), WalError> {
    let handle = fs::File::open(dir)?;
    handle.sync_all()?;
    Ok(())
}
