// # Backup Store
//
// File-system snapshots of the proxy configuration plus retention sweeps.
// Knows nothing about DNS or sagas.

pub mod file;
pub mod retention;

pub use file::FileBackupStore;
pub use retention::{
    CleanupReport, RetentionPolicy, apply_retention, cleanup_by_count, cleanup_by_size,
    cleanup_old_backups,
};
