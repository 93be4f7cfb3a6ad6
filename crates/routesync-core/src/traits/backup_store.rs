// # Backup Store Trait
//
// Snapshots of the proxy configuration file.
//
// ## Purpose
//
// The backup taken at the start of a saga is the restore target for every
// failure before the commit boundary. Retention sweeps keep the number of
// snapshots bounded.
//
// ## Implementations
//
// - File-based: timestamp-suffixed copies next to the config file
//   (`backup::FileBackupStore`)

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::model::Backup;

/// Trait for backup store implementations
///
/// All methods take the path of the *source* config file; a store never
/// mixes backups of different sources.
#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Copy `path` to a new timestamped backup and return its path
    ///
    /// Fails if the source cannot be read.
    async fn create_backup(&self, path: &Path) -> Result<PathBuf, crate::Error>;

    /// Backups of `path`, newest first
    async fn list_backups(&self, path: &Path) -> Result<Vec<Backup>, crate::Error>;

    /// Overwrite `path` with the content of `backup_path`
    async fn restore_from_backup(&self, path: &Path, backup_path: &Path) -> Result<(), crate::Error>;

    /// Backups strictly older than `max_age`
    async fn get_old_backups(
        &self,
        path: &Path,
        max_age: chrono::Duration,
    ) -> Result<Vec<Backup>, crate::Error>;

    /// Delete a single backup file
    async fn delete_backup(&self, backup: &Backup) -> Result<(), crate::Error>;

    /// Write `text` to `path` with the permission bits of `mode_source`
    async fn write_preserving_mode(
        &self,
        path: &Path,
        text: &str,
        mode_source: &Path,
    ) -> Result<(), crate::Error>;
}
