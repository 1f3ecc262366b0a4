//! Off-host archival of sealed WAL segments.
//!
//! Sealed segments are immutable, which makes them safe to copy anywhere at
//! leisure. The WAL hands sealed paths to an [`Archiver`] over a channel;
//! a background worker drains the queue and pushes each file through an
//! [`ArchiveSink`]. The sink is best-effort by contract: a failed upload is
//! logged and dropped, and local recovery never depends on the sink having
//! succeeded.
//!
//! The object-store protocol itself lives behind the [`ArchiveSink`] trait;
//! the store only carries the connection surface ([`ArchiveConfig`]) so a
//! protocol-level sink can be slotted in without touching the core.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use thiserror::Error;
use tracing::{debug, info, warn};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by archive sinks.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ArchiveError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to start the background worker.
    #[error("Internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Connection surface for an object-store backend.
#[derive(Clone, Default)]
pub struct ArchiveConfig {
    /// Target bucket name.
    pub bucket: String,

    /// Object-store region.
    pub region: String,

    /// Access key credential.
    pub access_key: String,

    /// Secret key credential.
    pub secret_key: String,
}

impl fmt::Debug for ArchiveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

// ------------------------------------------------------------------------------------------------
// Sink trait
// ------------------------------------------------------------------------------------------------

/// A destination for sealed segments.
///
/// `key` is the segment file name; `local_path` is the sealed file on disk.
/// Implementations must be callable from the background worker thread.
pub trait ArchiveSink: Send + Sync {
    /// Uploads one sealed segment.
    fn upload(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), ArchiveError>;
}

/// A filesystem-backed sink: uploads become copies under `<root>/<bucket>/`.
///
/// Useful as a local archive target and as the reference implementation in
/// tests.
#[derive(Debug)]
pub struct DirSink {
    root: PathBuf,
}

impl DirSink {
    /// Creates a sink rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ArchiveSink for DirSink {
    fn upload(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), ArchiveError> {
        let bucket_dir = self.root.join(bucket);
        fs::create_dir_all(&bucket_dir)?;
        fs::copy(local_path, bucket_dir.join(key))?;
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Archiver
// ------------------------------------------------------------------------------------------------

/// Background uploader for sealed segments.
///
/// Owns a worker thread fed over an unbounded channel, so producers (the
/// WAL rotating on the mutation path) never block. The worker drains
/// remaining uploads before shutdown completes.
pub struct Archiver {
    tx: Option<Sender<PathBuf>>,
    worker: Option<JoinHandle<()>>,
}

impl Archiver {
    /// Starts the background worker.
    pub fn spawn(config: ArchiveConfig, sink: Arc<dyn ArchiveSink>) -> Result<Self, ArchiveError> {
        let (tx, rx) = channel::unbounded();
        let worker = thread::Builder::new()
            .name("wal-archiver".into())
            .spawn(move || run(config, sink, rx))
            .map_err(|e| ArchiveError::Internal(format!("failed to spawn archiver: {e}")))?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    /// A handle producers use to queue sealed segment paths.
    pub fn handoff(&self) -> Sender<PathBuf> {
        self.tx.as_ref().expect("archiver is running").clone()
    }

    /// Drains the queue and stops the worker.
    pub fn shutdown(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("archiver worker panicked");
            }
        }
    }
}

impl Drop for Archiver {
    fn drop(&mut self) {
        self.finish();
    }
}

impl fmt::Debug for Archiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archiver")
            .field("running", &self.worker.is_some())
            .finish()
    }
}

/// Worker loop: runs until every producer handle is dropped.
fn run(config: ArchiveConfig, sink: Arc<dyn ArchiveSink>, rx: Receiver<PathBuf>) {
    debug!(bucket = %config.bucket, "archiver started");
    for path in rx {
        let Some(key) = path.file_name().and_then(|n| n.to_str()) else {
            warn!(path = %path.display(), "sealed segment has no usable file name; skipped");
            continue;
        };
        match sink.upload(&config.bucket, key, &path) {
            Ok(()) => info!(bucket = %config.bucket, key, "sealed segment archived"),
            Err(e) => warn!(
                bucket = %config.bucket,
                key,
                error = %e,
                "sealed segment archival failed"
            ),
        }
    }
    debug!(bucket = %config.bucket, "archiver stopped");
}
