//! # FirmusDB
//!
//! An embeddable, durable, **multi-database key-value store** fronted by a
//! segmented write-ahead log (WAL). Designed for crash-safe operation:
//! every mutation is appended and fsynced to the log before it is
//! acknowledged, and a restart replays the log to rebuild the exact
//! in-memory state.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                        Store                            │
//! │                                                         │
//! │  create / update / delete          read                 │
//! │        │                            │                   │
//! │        ▼                            ▼                   │
//! │  ┌───────────┐   apply   ┌───────────────────────────┐  │
//! │  │ WAL (seq, │──────────►│ DatabaseStore             │  │
//! │  │ segments, │           │  name → Memtable          │  │
//! │  │ rotation) │           │  key → (value, timestamp) │  │
//! │  └─────┬─────┘           └───────────────────────────┘  │
//! │        │ sealed segments                                │
//! │        ▼                                                │
//! │  ┌───────────┐                                          │
//! │  │ Archiver  │──► object store (pluggable sink)         │
//! │  └───────────┘                                          │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`store`] | Recovery-then-serving lifecycle and the public operations |
//! | [`wal`] | Segmented, CRC-protected, sequence-stamped write-ahead log |
//! | [`memtable`] | In-memory tables and the lazily-created database registry |
//! | [`record`] | Mutation record codec — framing, checksums, wire payload |
//! | [`archive`] | Best-effort off-host archival of sealed segments |
//!
//! ## Key Features
//!
//! - **Write-ahead logging** — every mutation is persisted (fsynced by
//!   default) before being acknowledged, guaranteeing durability and crash
//!   recovery.
//! - **Multiple logical databases** — isolated key-spaces created lazily on
//!   first reference, all sharing one totally-ordered log.
//! - **Segmented log** — `%016x.wal` files rotated past a size threshold;
//!   sealed segments are immutable and may be archived off-host.
//! - **CRC-32C integrity** — each record frame is checksummed; recovery
//!   refuses to serve from a history it cannot fully verify, while a torn
//!   tail write from a crash is cut off cleanly.
//! - **Single-writer safety** — the active segment holds an OS advisory
//!   lock, keeping two store instances out of one directory.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use firmusdb::{Store, StoreConfig};
//!
//! let store = Store::open(StoreConfig {
//!     wal_dir: "/var/lib/firmusdb/wal".into(),
//!     ..StoreConfig::default()
//! })
//! .unwrap();
//!
//! // Write
//! assert_eq!(store.create("main", "greeting", "hello").unwrap(), "Inserted 1");
//!
//! // Read
//! assert_eq!(store.read("main", "greeting").unwrap(), "hello");
//!
//! // Update and delete require the key to exist
//! store.update("main", "greeting", "hi").unwrap();
//! store.delete("main", "greeting").unwrap();
//!
//! // Graceful shutdown
//! store.close().unwrap();
//! ```

pub mod archive;
pub mod memtable;
pub mod record;
pub mod store;
pub mod wal;

pub use archive::{ArchiveConfig, ArchiveError, ArchiveSink, Archiver, DirSink};
pub use store::{Store, StoreConfig, StoreError, USERS_DATABASE};
pub use wal::SyncMode;
