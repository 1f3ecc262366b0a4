use std::path::Path;

use tracing_subscriber::EnvFilter;

use crate::record::Record;
use crate::wal::{SyncMode, Wal, WalError, WalOptions, WalReader};

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Default options: fsync on every append, rotation effectively disabled.
pub fn default_options() -> WalOptions {
    init_tracing();
    WalOptions::default()
}

/// Tiny rotation threshold so a handful of appends crosses segments.
pub fn tiny_rotation_options() -> WalOptions {
    init_tracing();
    WalOptions {
        sync: SyncMode::Always,
        rotate_threshold: 32,
    }
}

/// Open a fresh write-side WAL at sequence 0 with default options.
pub fn open_fresh(dir: &Path) -> Wal {
    Wal::open(dir, 0, default_options(), None).expect("open WAL")
}

/// Replay every record in `dir`, propagating the first error.
pub fn collect_replay(dir: &Path) -> Result<Vec<Record>, WalError> {
    let reader = WalReader::open(dir)?;
    reader.replay().collect()
}
