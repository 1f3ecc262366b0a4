//! In-memory tables.
//!
//! A [`Memtable`] is one logical database: an unordered map from key to
//! [`Row`] (value plus creation timestamp). The [`DatabaseStore`] is the
//! registry of memtables, indexed by database name and created lazily on
//! first reference.
//!
//! ## Contracts
//!
//! - Mutators take an exclusive critical section per table; readers proceed
//!   concurrently with each other and always observe a consistent [`Row`]
//!   (value and timestamp never tear).
//! - The mutation result strings — `"Inserted 1"`, `"Updated 1"`,
//!   `"Deleted 1"` — and the `error: Key not found` sentinel are observable
//!   contract, consumed verbatim by RPC adapters.
//! - `created_at` is observational only; it plays no part in conflict
//!   resolution.
//!
//! Durability lives a layer up: the store appends to the WAL before
//! touching any memtable, and recovery applies replayed records here
//! directly, bypassing the write path.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, error, trace};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by memtable operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MemtableError {
    /// Read, update, or delete of an absent key.
    ///
    /// The display text is the verbatim sentinel consumed by RPC adapters.
    #[error("error: Key not found")]
    KeyNotFound,

    /// Internal invariant violation (poisoned lock).
    #[error("Internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Memtable
// ------------------------------------------------------------------------------------------------

/// A single row: the stored value and the wall-clock second it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// The stored value.
    pub value: String,

    /// Unix seconds at the time of the write that produced this row.
    pub created_at: u64,
}

/// The in-memory key-value map of one logical database.
#[derive(Debug, Default)]
pub struct Memtable {
    rows: RwLock<HashMap<String, Row>>,
}

impl Memtable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditionally writes `key`, overwriting any existing entry.
    pub fn create(&self, key: &str, value: &str) -> Result<&'static str, MemtableError> {
        let mut rows = self.write_rows()?;
        rows.insert(
            key.to_string(),
            Row {
                value: value.to_string(),
                created_at: unix_now(),
            },
        );
        trace!(key, "row inserted");
        Ok("Inserted 1")
    }

    /// Returns the current value of `key`.
    pub fn read(&self, key: &str) -> Result<String, MemtableError> {
        let rows = self.read_rows()?;
        rows.get(key)
            .map(|row| row.value.clone())
            .ok_or(MemtableError::KeyNotFound)
    }

    /// Overwrites `key`, failing if it is absent. Refreshes `created_at`.
    pub fn update(&self, key: &str, value: &str) -> Result<&'static str, MemtableError> {
        let mut rows = self.write_rows()?;
        let row = rows.get_mut(key).ok_or(MemtableError::KeyNotFound)?;
        row.value = value.to_string();
        row.created_at = unix_now();
        trace!(key, "row updated");
        Ok("Updated 1")
    }

    /// Removes `key`, failing if it is absent.
    pub fn delete(&self, key: &str) -> Result<&'static str, MemtableError> {
        let mut rows = self.write_rows()?;
        if rows.remove(key).is_none() {
            return Err(MemtableError::KeyNotFound);
        }
        trace!(key, "row deleted");
        Ok("Deleted 1")
    }

    /// Whether `key` currently has a row.
    pub fn contains(&self, key: &str) -> Result<bool, MemtableError> {
        Ok(self.read_rows()?.contains_key(key))
    }

    /// A consistent snapshot of one row, if present.
    pub fn row(&self, key: &str) -> Result<Option<Row>, MemtableError> {
        Ok(self.read_rows()?.get(key).cloned())
    }

    /// Number of rows in the table.
    pub fn len(&self) -> Result<usize, MemtableError> {
        Ok(self.read_rows()?.len())
    }

    /// Whether the table holds no rows.
    pub fn is_empty(&self) -> Result<bool, MemtableError> {
        Ok(self.read_rows()?.is_empty())
    }

    fn read_rows(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Row>>, MemtableError> {
        self.rows.read().map_err(|_| {
            error!("memtable lock poisoned");
            MemtableError::Internal("RwLock poisoned".into())
        })
    }

    fn write_rows(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Row>>, MemtableError> {
        self.rows.write().map_err(|_| {
            error!("memtable lock poisoned");
            MemtableError::Internal("RwLock poisoned".into())
        })
    }
}

/// Wall-clock seconds since the Unix epoch.
fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ------------------------------------------------------------------------------------------------
// DatabaseStore
// ------------------------------------------------------------------------------------------------

/// The registry of memtables, one per logical database.
///
/// Lookup is lazy-creating: referencing an unknown database name creates an
/// empty table for it atomically. Tables are destroyed only by
/// [`DatabaseStore::delete_database`].
#[derive(Debug, Default)]
pub struct DatabaseStore {
    databases: Mutex<HashMap<String, Arc<Memtable>>>,
}

impl DatabaseStore {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the named table, creating it if this is its first reference.
    pub fn get_database(&self, name: &str) -> Result<Arc<Memtable>, MemtableError> {
        let mut databases = self.lock_databases()?;
        if let Some(db) = databases.get(name) {
            return Ok(Arc::clone(db));
        }

        debug!(database = name, "database created");
        let db = Arc::new(Memtable::new());
        databases.insert(name.to_string(), Arc::clone(&db));
        Ok(db)
    }

    /// Removes the named table. No effect if it does not exist.
    ///
    /// Sharp edge, by contract: WAL records of a deleted database stay in
    /// the log, so the next recovery re-creates it.
    pub fn delete_database(&self, name: &str) -> Result<(), MemtableError> {
        if self.lock_databases()?.remove(name).is_some() {
            debug!(database = name, "database deleted");
        }
        Ok(())
    }

    /// Names of all live databases, unordered.
    pub fn database_names(&self) -> Result<Vec<String>, MemtableError> {
        Ok(self.lock_databases()?.keys().cloned().collect())
    }

    fn lock_databases(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Arc<Memtable>>>, MemtableError> {
        self.databases.lock().map_err(|_| {
            error!("database registry lock poisoned");
            MemtableError::Internal("Mutex poisoned".into())
        })
    }
}
