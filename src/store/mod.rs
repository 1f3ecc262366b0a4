//! The store: recovery controller and serving API.
//!
//! ## Design Overview
//!
//! [`Store::open`] drives the full lifecycle from a cold on-disk state to a
//! serving store:
//!
//! 1. Open the WAL directory for reading; an empty directory means an empty
//!    history, not an error.
//! 2. Replay every record into a fresh [`DatabaseStore`], applying mutations
//!    to memtables directly — the write path is bypassed during recovery.
//! 3. Close the read side; open the write side continuing one past the
//!    highest replayed sequence.
//! 4. Return the serving handle. Mutations are only reachable once `open`
//!    has returned, so the recovery-versus-serving race cannot arise by
//!    construction; [`StoreError::RecoveryInProgress`] remains in the error
//!    vocabulary for adapters that race an out-of-process restart.
//!
//! Any corruption during replay (checksum mismatch, malformed payload,
//! unknown command, sequence gap) aborts `open`: a store is never served
//! from a history it could not fully trust.
//!
//! ## Mutation path
//!
//! For every mutation the WAL append — fsynced by default — strictly
//! precedes the memtable apply, and a failed append leaves memory
//! untouched. One store-wide mutation lock serializes append order, which
//! keeps sequence numbers dense and makes the WAL a total order consistent
//! with the results callers observe. Reads never touch the WAL.
//!
//! Keys are logged as `"<db>:<key>"` and split on the first colon during
//! replay, which is why database names may not contain `:`.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::archive::{ArchiveConfig, ArchiveError, ArchiveSink, Archiver};
use crate::memtable::{DatabaseStore, Memtable, MemtableError};
use crate::record::{Command, Record};
use crate::wal::{SyncMode, Wal, WalError, WalOptions, WalReader};

/// Database name reserved by the authentication collaborator.
///
/// The core treats it like any other database; the constant exists so
/// external components agree on the spelling.
pub const USERS_DATABASE: &str = "users";

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by store operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Read, update, or delete of an absent key.
    ///
    /// The display text is the verbatim sentinel consumed by RPC adapters.
    #[error("error: Key not found")]
    KeyNotFound,

    /// Empty database name or key, or a database name containing `:`.
    #[error("error: Invalid number of arguments passed")]
    InvalidArguments,

    /// A mutation reached a store that has not finished recovery.
    ///
    /// `open` only hands out serving handles, so the core never produces
    /// this itself; it is part of the vocabulary for adapters whose client
    /// raced an out-of-process restart.
    #[error("recovery in progress; mutations are not accepted yet")]
    RecoveryInProgress,

    /// Rejected configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// WAL failure: I/O, corruption, locking, sequencing.
    #[error(transparent)]
    Wal(#[from] WalError),

    /// Archive worker failure at startup.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Internal invariant violation (poisoned lock, inconsistent replay).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<MemtableError> for StoreError {
    fn from(e: MemtableError) -> Self {
        match e {
            MemtableError::KeyNotFound => StoreError::KeyNotFound,
            MemtableError::Internal(msg) => StoreError::Internal(msg),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Configuration for a [`Store`] instance. Passed to [`Store::open`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the WAL segments.
    pub wal_dir: PathBuf,

    /// Durability policy for WAL appends. [`SyncMode::Always`] by default:
    /// a mutation is fsynced before its caller sees success.
    pub sync: SyncMode,

    /// Byte size past which the active segment is sealed and rotated.
    pub rotate_threshold_bytes: u64,

    /// Whether `UPDATE` records carry the new value.
    ///
    /// `true` (default) logs the full value so replay reconstructs updates.
    /// `false` reproduces the historical wire behavior of logging an empty
    /// value — kept strictly for compatibility experiments.
    pub log_update_value: bool,

    /// Whether sealed segments are offered to an archive sink.
    pub archive_enabled: bool,

    /// Object-store surface used when archival is enabled.
    pub archive: ArchiveConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            wal_dir: PathBuf::from("wal"),
            sync: SyncMode::Always,
            rotate_threshold_bytes: 64 * 1024 * 1024,
            log_update_value: true,
            archive_enabled: false,
            archive: ArchiveConfig::default(),
        }
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<(), StoreError> {
        if self.rotate_threshold_bytes == 0 {
            return Err(StoreError::Config(
                "rotate_threshold_bytes must be non-zero".into(),
            ));
        }
        if self.archive_enabled && self.archive.bucket.is_empty() {
            return Err(StoreError::Config(
                "archive enabled but no bucket configured".into(),
            ));
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Store
// ------------------------------------------------------------------------------------------------

/// A serving key-value store.
///
/// Values of this type only exist after recovery has completed. All
/// operations are safe under concurrent use; databases are created lazily
/// by any reference to their name.
#[derive(Debug)]
pub struct Store {
    dbs: DatabaseStore,
    // Declared before `archiver`: dropping the WAL releases its handoff
    // sender, which lets the archive worker drain and exit.
    wal: Mutex<Wal>,
    archiver: Option<Archiver>,
    log_update_value: bool,
}

impl Store {
    /// Recovers from `config.wal_dir` and returns a serving store.
    ///
    /// Equivalent to [`Store::open_with_sink`] without an archive sink;
    /// `config.archive_enabled` must be `false`.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        Self::open_with_sink(config, None)
    }

    /// Recovers from `config.wal_dir` and returns a serving store, wiring
    /// sealed segments to `sink` when archival is enabled.
    ///
    /// Replays the entire WAL before returning; any corruption aborts the
    /// startup rather than serving from a partial history.
    pub fn open_with_sink(
        config: StoreConfig,
        sink: Option<Arc<dyn ArchiveSink>>,
    ) -> Result<Self, StoreError> {
        config.validate()?;
        if config.archive_enabled && sink.is_none() {
            return Err(StoreError::Config(
                "archive enabled but no sink provided".into(),
            ));
        }

        info!(wal_dir = %config.wal_dir.display(), "store recovery started");

        let dbs = DatabaseStore::new();
        let next_seq = match WalReader::open(&config.wal_dir) {
            Err(WalError::NotFound(_)) => {
                info!("no WAL segments; starting with an empty store");
                0
            }
            Err(e) => return Err(e.into()),
            Ok(reader) => {
                let mut replayed = 0u64;
                let mut iter = reader.replay();
                while let Some(result) = iter.next() {
                    let record = result?;
                    apply_replayed(&dbs, &record)?;
                    replayed += 1;
                }
                info!(records = replayed, "WAL replay finished");
                iter.next_seq()
            }
        };

        let archiver = match (config.archive_enabled, sink) {
            (true, Some(sink)) => Some(Archiver::spawn(config.archive.clone(), sink)?),
            _ => None,
        };
        let sealed_tx = archiver.as_ref().map(Archiver::handoff);

        let wal = Wal::open(
            &config.wal_dir,
            next_seq,
            WalOptions {
                sync: config.sync,
                rotate_threshold: config.rotate_threshold_bytes,
            },
            sealed_tx,
        )?;

        info!(next_seq, "store active");

        Ok(Self {
            dbs,
            wal: Mutex::new(wal),
            archiver,
            log_update_value: config.log_update_value,
        })
    }

    /// Unconditionally writes `key` in database `db`.
    ///
    /// The record is appended and flushed before memory changes; a failed
    /// append surfaces the error and leaves the memtable untouched.
    pub fn create(&self, db: &str, key: &str, value: &str) -> Result<&'static str, StoreError> {
        validate_args(db, key)?;
        let table = self.dbs.get_database(db)?;

        let mut wal = self.lock_wal()?;
        wal.append(Command::Create, &logged_key(db, key), value)?;
        Ok(table.create(key, value)?)
    }

    /// Returns the current value of `key` in database `db`.
    ///
    /// Reads never touch the WAL.
    pub fn read(&self, db: &str, key: &str) -> Result<String, StoreError> {
        validate_args(db, key)?;
        Ok(self.dbs.get_database(db)?.read(key)?)
    }

    /// Overwrites `key` in database `db`, failing if it is absent.
    ///
    /// The existence check happens before the append, so a failed update
    /// leaves no record in the WAL.
    pub fn update(&self, db: &str, key: &str, value: &str) -> Result<&'static str, StoreError> {
        validate_args(db, key)?;
        let table = self.dbs.get_database(db)?;

        let mut wal = self.lock_wal()?;
        if !table.contains(key)? {
            return Err(StoreError::KeyNotFound);
        }
        let logged_value = if self.log_update_value { value } else { "" };
        wal.append(Command::Update, &logged_key(db, key), logged_value)?;
        Ok(table.update(key, value)?)
    }

    /// Removes `key` from database `db`, failing if it is absent.
    pub fn delete(&self, db: &str, key: &str) -> Result<&'static str, StoreError> {
        validate_args(db, key)?;
        let table = self.dbs.get_database(db)?;

        let mut wal = self.lock_wal()?;
        if !table.contains(key)? {
            return Err(StoreError::KeyNotFound);
        }
        wal.append(Command::Delete, &logged_key(db, key), "")?;
        Ok(table.delete(key)?)
    }

    /// Removes the named database and everything in it.
    ///
    /// Not logged to the WAL: the deleted database's records stay in the
    /// log, so the next recovery re-creates it. Known sharp edge.
    pub fn delete_database(&self, db: &str) -> Result<(), StoreError> {
        validate_db(db)?;
        Ok(self.dbs.delete_database(db)?)
    }

    /// Names of all live databases, unordered.
    pub fn database_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.dbs.database_names()?)
    }

    /// Flushes and seals the WAL, then stops the archive worker.
    pub fn close(self) -> Result<(), StoreError> {
        let wal = self
            .wal
            .into_inner()
            .map_err(|_| StoreError::Internal("Mutex poisoned".into()))?;
        wal.close()?;
        if let Some(archiver) = self.archiver {
            archiver.shutdown();
        }
        info!("store closed");
        Ok(())
    }

    fn lock_wal(&self) -> Result<MutexGuard<'_, Wal>, StoreError> {
        self.wal.lock().map_err(|_| {
            error!("store mutation lock poisoned");
            StoreError::Internal("Mutex poisoned".into())
        })
    }
}

// ------------------------------------------------------------------------------------------------
// Replay
// ------------------------------------------------------------------------------------------------

/// Applies one replayed record directly to its memtable.
///
/// `UPDATE`/`DELETE` of an absent key is tolerated with a warning — the log
/// is authoritative, and such a record signals that an earlier prefix of
/// the history is gone. Everything else that fails here is fatal.
fn apply_replayed(dbs: &DatabaseStore, record: &Record) -> Result<(), StoreError> {
    let Some((db_name, key)) = record.key.split_once(':') else {
        return Err(StoreError::Internal(format!(
            "replayed record {} has no database prefix in key {:?}",
            record.seq, record.key
        )));
    };
    let table: Arc<Memtable> = dbs.get_database(db_name)?;

    match record.cmd {
        Command::Create => {
            table.create(key, &record.value)?;
        }
        Command::Update => {
            if record.value.is_empty() {
                warn!(
                    seq = record.seq,
                    key = %record.key,
                    "replayed UPDATE carries an empty value"
                );
            }
            match table.update(key, &record.value) {
                Ok(_) => {}
                Err(MemtableError::KeyNotFound) => {
                    warn!(
                        seq = record.seq,
                        key = %record.key,
                        "replayed UPDATE for an absent key; an earlier log prefix is missing"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Delete => match table.delete(key) {
            Ok(_) => {}
            Err(MemtableError::KeyNotFound) => {
                warn!(
                    seq = record.seq,
                    key = %record.key,
                    "replayed DELETE for an absent key; an earlier log prefix is missing"
                );
            }
            Err(e) => return Err(e.into()),
        },
    }
    Ok(())
}

// ------------------------------------------------------------------------------------------------
// Argument validation
// ------------------------------------------------------------------------------------------------

fn validate_db(db: &str) -> Result<(), StoreError> {
    // The colon is the database/key separator on the wire.
    if db.is_empty() || db.contains(':') {
        return Err(StoreError::InvalidArguments);
    }
    Ok(())
}

fn validate_args(db: &str, key: &str) -> Result<(), StoreError> {
    validate_db(db)?;
    if key.is_empty() {
        return Err(StoreError::InvalidArguments);
    }
    Ok(())
}

fn logged_key(db: &str, key: &str) -> String {
    format!("{db}:{key}")
}
