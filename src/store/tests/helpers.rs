use std::path::Path;

use tracing_subscriber::EnvFilter;

use crate::record::Record;
use crate::store::{Store, StoreConfig};
use crate::wal::{WalError, WalReader};

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Default store config rooted at `dir`.
pub fn config(dir: &Path) -> StoreConfig {
    init_tracing();
    StoreConfig {
        wal_dir: dir.to_path_buf(),
        ..StoreConfig::default()
    }
}

/// Open a store at `dir` with default config.
pub fn open(dir: &Path) -> Store {
    Store::open(config(dir)).expect("open store")
}

/// Every record currently on disk, in sequence order. Empty for a
/// directory with no segments.
pub fn wal_records(dir: &Path) -> Vec<Record> {
    match WalReader::open(dir) {
        Err(WalError::NotFound(_)) => Vec::new(),
        Err(e) => panic!("unexpected WAL error: {e:?}"),
        Ok(reader) => reader.replay().map(|r| r.expect("valid record")).collect(),
    }
}
