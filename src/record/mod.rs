//! Mutation record codec.
//!
//! A [`Record`] is the unit of durable history: one logged mutation of one
//! key in one database. Records are framed on disk as:
//!
//! ```text
//! [PAYLOAD_LEN_LE (4B)][PAYLOAD_CRC32C_LE (4B)][PAYLOAD (len bytes)]
//! ```
//!
//! The payload is a protobuf message with three string fields —
//! `cmd` (tag 1), `key` (tag 2), `value` (tag 3) — so segments written by
//! earlier deployments of the wire format remain readable. The sequence
//! number is **not** part of the payload; it is assigned by the WAL manager
//! at append time and derived from record position during replay.
//!
//! The checksum is CRC-32C (Castagnoli) over the payload bytes. A frame
//! whose stored checksum does not match decodes to [`RecordError::BadHash`];
//! a frame cut short by a crash is reported as a truncated tail rather than
//! an error, so the replay path can stop cleanly.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::fmt;
use std::io::{self, Read};

use prost::Message;
use thiserror::Error;

const U32_SIZE: usize = std::mem::size_of::<u32>();

/// Size of the frame header: payload length + payload checksum.
pub const FRAME_HEADER_SIZE: usize = 2 * U32_SIZE;

/// Maximum encoded payload size accepted by the codec (1 MiB).
///
/// Guards replay against absurd length prefixes read from a corrupt frame.
pub const MAX_RECORD_SIZE: usize = 1024 * 1024;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by record encoding and decoding.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecordError {
    /// Underlying I/O error while reading a frame.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Stored checksum does not match the CRC-32C of the payload.
    #[error("record checksum mismatch (stored {stored:08x}, computed {computed:08x})")]
    BadHash {
        /// Checksum read from the frame header.
        stored: u32,
        /// Checksum computed over the payload bytes.
        computed: u32,
    },

    /// Payload bytes could not be decoded as a record message.
    #[error("malformed record payload: {0}")]
    Malformed(#[from] prost::DecodeError),

    /// Command string is not one of `CREATE`, `UPDATE`, `DELETE`.
    ///
    /// The display text is the verbatim sentinel consumed by RPC adapters.
    #[error("error: Invalid command")]
    InvalidCommand(String),

    /// Payload exceeds [`MAX_RECORD_SIZE`].
    #[error("record size exceeds limit ({0} bytes)")]
    TooLarge(usize),
}

// ------------------------------------------------------------------------------------------------
// Command
// ------------------------------------------------------------------------------------------------

/// The mutation kind carried by a record.
///
/// Only mutations are logged; reads never touch the WAL. The textual form
/// (`CREATE` / `UPDATE` / `DELETE`) exists solely at the WAL boundary —
/// everything above the codec dispatches on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Unconditional insert, overwriting any existing entry.
    Create,

    /// Overwrite of an existing entry; fails upstream if the key is absent.
    Update,

    /// Removal of an existing entry; fails upstream if the key is absent.
    Delete,
}

impl Command {
    /// The wire spelling of this command.
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Create => "CREATE",
            Command::Update => "UPDATE",
            Command::Delete => "DELETE",
        }
    }

    /// Parses a wire command string.
    ///
    /// Anything other than the three known spellings is
    /// [`RecordError::InvalidCommand`] — a fatal condition during replay.
    pub fn parse(s: &str) -> Result<Self, RecordError> {
        match s {
            "CREATE" => Ok(Command::Create),
            "UPDATE" => Ok(Command::Update),
            "DELETE" => Ok(Command::Delete),
            other => Err(RecordError::InvalidCommand(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ------------------------------------------------------------------------------------------------
// Record
// ------------------------------------------------------------------------------------------------

/// Wire payload of one record.
///
/// Field tags mirror the original protobuf schema so existing segments
/// decode unchanged.
#[derive(Clone, PartialEq, Message)]
struct Payload {
    #[prost(string, tag = "1")]
    cmd: String,

    #[prost(string, tag = "2")]
    key: String,

    #[prost(string, tag = "3")]
    value: String,
}

/// A single decoded mutation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Store-wide sequence number. Dense and monotonic across segments.
    pub seq: u64,

    /// The mutation kind.
    pub cmd: Command,

    /// Logged key, in `"<db>:<key>"` form.
    pub key: String,

    /// Logged value. Empty for `DELETE`.
    pub value: String,
}

impl Record {
    /// Builds a record. `seq` is stamped later by the WAL manager; records
    /// constructed by callers carry the sequence they will be appended at.
    pub fn new(seq: u64, cmd: Command, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            seq,
            cmd,
            key: key.into(),
            value: value.into(),
        }
    }

    /// Serializes the payload (without the frame header).
    pub fn encode_payload(&self) -> Vec<u8> {
        Payload {
            cmd: self.cmd.as_str().to_string(),
            key: self.key.clone(),
            value: self.value.clone(),
        }
        .encode_to_vec()
    }

    /// Serializes the full frame: `[len][crc32c][payload]`.
    pub fn encode_frame(&self) -> Result<Vec<u8>, RecordError> {
        let payload = self.encode_payload();
        if payload.len() > MAX_RECORD_SIZE {
            return Err(RecordError::TooLarge(payload.len()));
        }

        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&crc32c::crc32c(&payload).to_le_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Decodes a verified payload into a record, stamping `seq`.
    pub fn decode_payload(seq: u64, payload: &[u8]) -> Result<Self, RecordError> {
        let msg = Payload::decode(payload)?;
        let cmd = Command::parse(&msg.cmd)?;
        Ok(Self {
            seq,
            cmd,
            key: msg.key,
            value: msg.value,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// Frame reading
// ------------------------------------------------------------------------------------------------

/// Outcome of reading one frame from a segment.
#[derive(Debug)]
pub enum FrameRead {
    /// A complete, checksum-verified payload.
    Payload(Vec<u8>),

    /// Clean end of file: zero bytes remained.
    Eof,

    /// The file ends inside a frame — a torn write at the tail.
    Truncated,
}

/// Reads one frame from `reader`.
///
/// Verifies the CRC-32C before handing the payload back. A file ending
/// mid-frame yields [`FrameRead::Truncated`]; whether that is tolerable is
/// the caller's call (it is, at the tail of the last segment).
pub fn read_frame<R: Read>(reader: &mut R) -> Result<FrameRead, RecordError> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    match read_up_to(reader, &mut header)? {
        0 => return Ok(FrameRead::Eof),
        n if n < FRAME_HEADER_SIZE => return Ok(FrameRead::Truncated),
        _ => {}
    }

    let len = u32::from_le_bytes(header[..U32_SIZE].try_into().unwrap()) as usize;
    let stored = u32::from_le_bytes(header[U32_SIZE..].try_into().unwrap());

    if len > MAX_RECORD_SIZE {
        return Err(RecordError::TooLarge(len));
    }

    let mut payload = vec![0u8; len];
    if read_up_to(reader, &mut payload)? < len {
        return Ok(FrameRead::Truncated);
    }

    let computed = crc32c::crc32c(&payload);
    if computed != stored {
        return Err(RecordError::BadHash { stored, computed });
    }

    Ok(FrameRead::Payload(payload))
}

/// Fills `buf` from `reader`, stopping early only at end of file.
/// Returns the number of bytes actually read.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
