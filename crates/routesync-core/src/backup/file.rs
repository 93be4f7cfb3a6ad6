// # File Backup Store
//
// Timestamped copies of the proxy configuration, stored next to it.
//
// ## Naming
//
// ```text
// /etc/caddy/Caddyfile
// /etc/caddy/Caddyfile.backup.20261018-142530.123
// /etc/caddy/Caddyfile.backup.20261018-150002.007
// ```
//
// The timestamp (UTC, millisecond precision) is part of the file name, so
// listing, age filtering and restore work from a directory listing alone,
// without an index file.
//
// ## Write-back
//
// Config rewrites go through a temp file in the same directory and an atomic
// rename. The permission bits are copied from the backup taken at the start
// of the saga, which `fs::copy` created with the original file's mode.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::Error;
use crate::model::Backup;
use crate::traits::backup_store::BackupStore;

/// Infix between the config file name and the timestamp
const BACKUP_INFIX: &str = ".backup.";

/// Timestamp format used in backup file names
const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S%.3f";

/// File-based backup store
///
/// # Example
///
/// ```rust,no_run
/// use routesync_core::backup::FileBackupStore;
/// use routesync_core::traits::BackupStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileBackupStore::new();
///     let path = std::path::Path::new("/etc/caddy/Caddyfile");
///
///     let backup = store.create_backup(path).await?;
///     println!("snapshot at {}", backup.display());
///
///     for b in store.list_backups(path).await? {
///         println!("{} ({} bytes)", b.timestamp, b.size_bytes);
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FileBackupStore;

impl FileBackupStore {
    /// Create a store
    pub fn new() -> Self {
        Self
    }

    /// Name of the backup of `path` taken at `timestamp`
    pub fn backup_path(path: &Path, timestamp: DateTime<Utc>) -> PathBuf {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(
            "{}{}{}",
            file_name,
            BACKUP_INFIX,
            timestamp.format(TIMESTAMP_FORMAT)
        ))
    }

    /// Timestamp encoded in `candidate`, if it is a backup of `path`
    pub fn parse_backup_name(path: &Path, candidate: &Path) -> Option<DateTime<Utc>> {
        let source = path.file_name()?.to_str()?;
        let name = candidate.file_name()?.to_str()?;
        let suffix = name.strip_prefix(source)?.strip_prefix(BACKUP_INFIX)?;
        NaiveDateTime::parse_from_str(suffix, TIMESTAMP_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }

    fn directory(path: &Path) -> PathBuf {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Temp file used for atomic rewrites of `path`
    fn temp_path(path: &Path) -> PathBuf {
        let mut temp = path.as_os_str().to_owned();
        temp.push(".tmp");
        PathBuf::from(temp)
    }
}

#[async_trait]
impl BackupStore for FileBackupStore {
    async fn create_backup(&self, path: &Path) -> Result<PathBuf, Error> {
        // Two backups within the same millisecond get consecutive timestamps
        let mut timestamp = Utc::now();
        let mut backup_path = Self::backup_path(path, timestamp);
        while fs::try_exists(&backup_path).await.unwrap_or(false) {
            timestamp += chrono::Duration::milliseconds(1);
            backup_path = Self::backup_path(path, timestamp);
        }

        fs::copy(path, &backup_path).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to back up {}: {}", path.display(), e),
            ))
        })?;

        tracing::debug!("Created backup {}", backup_path.display());
        Ok(backup_path)
    }

    async fn list_backups(&self, path: &Path) -> Result<Vec<Backup>, Error> {
        let dir = Self::directory(path);
        let mut backups = Vec::new();

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(backups),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let candidate = entry.path();
            let Some(timestamp) = Self::parse_backup_name(path, &candidate) else {
                continue;
            };
            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("Skipping unreadable backup {}: {}", candidate.display(), e);
                    continue;
                }
            };
            backups.push(Backup {
                path: candidate,
                timestamp,
                size_bytes: metadata.len(),
            });
        }

        backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.path.cmp(&a.path)));
        Ok(backups)
    }

    async fn restore_from_backup(&self, path: &Path, backup_path: &Path) -> Result<(), Error> {
        fs::copy(backup_path, path).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to restore {} from {}: {}",
                    path.display(),
                    backup_path.display(),
                    e
                ),
            ))
        })?;

        tracing::info!("Restored {} from {}", path.display(), backup_path.display());
        Ok(())
    }

    async fn get_old_backups(
        &self,
        path: &Path,
        max_age: chrono::Duration,
    ) -> Result<Vec<Backup>, Error> {
        let backups = self.list_backups(path).await?;
        Ok(super::retention::select_by_age(&backups, max_age, Utc::now()))
    }

    async fn delete_backup(&self, backup: &Backup) -> Result<(), Error> {
        fs::remove_file(&backup.path).await?;
        tracing::debug!("Deleted backup {}", backup.path.display());
        Ok(())
    }

    async fn write_preserving_mode(
        &self,
        path: &Path,
        text: &str,
        mode_source: &Path,
    ) -> Result<(), Error> {
        let permissions = fs::metadata(mode_source).await?.permissions();

        let temp_path = Self::temp_path(path);
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(text.as_bytes()).await?;
            file.flush().await?;
        }
        fs::set_permissions(&temp_path, permissions).await?;

        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        tracing::trace!("Rewrote {}", path.display());
        Ok(())
    }
}
