//! Backup retention sweeps
//!
//! Three independent policies decide which backups may be pruned:
//!
//! - **age**: older than a maximum age
//! - **count**: beyond the newest N
//! - **size**: beyond a cap on cumulative size, counted from the newest
//!
//! [`apply_retention`] evaluates every configured policy against the same
//! listing. A backup matched by two policies is deleted once but counted by
//! both, so `deleted_count` may exceed the number of files removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::Result;
use crate::model::Backup;
use crate::traits::BackupStore;

/// Which policies to run; `None` disables a policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Maximum age in seconds
    #[serde(default)]
    pub max_age_secs: Option<u64>,
    /// Number of newest backups to keep
    #[serde(default)]
    pub max_count: Option<usize>,
    /// Cap on the cumulative size of kept backups
    #[serde(default)]
    pub max_total_bytes: Option<u64>,
}

impl RetentionPolicy {
    /// True when no policy is configured
    pub fn is_empty(&self) -> bool {
        self.max_age_secs.is_none() && self.max_count.is_none() && self.max_total_bytes.is_none()
    }

    /// The age policy as a duration
    ///
    /// Ages that do not fit a [`chrono::Duration`] are a config error.
    pub fn max_age(&self) -> Result<Option<chrono::Duration>> {
        let Some(secs) = self.max_age_secs else {
            return Ok(None);
        };
        i64::try_from(secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .map(Some)
            .ok_or_else(|| {
                crate::Error::config(format!(
                    "backup max age of {} seconds is out of range (at most {})",
                    secs, MAX_AGE_SECS
                ))
            })
    }

    /// Validate the retention settings
    pub fn validate(&self) -> Result<()> {
        self.max_age().map(|_| ())
    }
}

/// Largest accepted `max_age_secs`
pub const MAX_AGE_SECS: u64 = (i64::MAX / 1000) as u64;

/// What a retention pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Matches of the age policy
    pub by_age: usize,
    /// Matches of the count policy
    pub by_count: usize,
    /// Matches of the size policy
    pub by_size: usize,
    /// Sum of the per-policy counts (overlaps counted twice)
    pub deleted_count: usize,
    /// Files actually removed
    pub removed: Vec<PathBuf>,
}

/// Backups whose age at `now` is strictly greater than `max_age`
pub fn select_by_age(backups: &[Backup], max_age: chrono::Duration, now: DateTime<Utc>) -> Vec<Backup> {
    backups
        .iter()
        .filter(|b| now.signed_duration_since(b.timestamp) > max_age)
        .cloned()
        .collect()
}

/// Backups beyond the newest `keep` (input must be newest first)
pub fn select_by_count(backups: &[Backup], keep: usize) -> Vec<Backup> {
    backups.iter().skip(keep).cloned().collect()
}

/// Backups that push the cumulative size, counted from the newest, over `max_bytes`
pub fn select_by_size(backups: &[Backup], max_bytes: u64) -> Vec<Backup> {
    let mut total = 0u64;
    backups
        .iter()
        .filter(|b| {
            total = total.saturating_add(b.size_bytes);
            total > max_bytes
        })
        .cloned()
        .collect()
}

async fn delete_all(store: &dyn BackupStore, doomed: &[Backup]) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::with_capacity(doomed.len());
    for backup in doomed {
        store.delete_backup(backup).await?;
        removed.push(backup.path.clone());
    }
    Ok(removed)
}

/// Delete backups older than `max_age`; returns how many were deleted
pub async fn cleanup_old_backups(
    store: &dyn BackupStore,
    path: &Path,
    max_age: chrono::Duration,
) -> Result<usize> {
    let doomed = store.get_old_backups(path, max_age).await?;
    Ok(delete_all(store, &doomed).await?.len())
}

/// Keep the newest `keep` backups, delete the rest
pub async fn cleanup_by_count(store: &dyn BackupStore, path: &Path, keep: usize) -> Result<usize> {
    let backups = store.list_backups(path).await?;
    let doomed = select_by_count(&backups, keep);
    Ok(delete_all(store, &doomed).await?.len())
}

/// Keep the newest backups whose cumulative size stays within `max_bytes`
pub async fn cleanup_by_size(store: &dyn BackupStore, path: &Path, max_bytes: u64) -> Result<usize> {
    let backups = store.list_backups(path).await?;
    let doomed = select_by_size(&backups, max_bytes);
    Ok(delete_all(store, &doomed).await?.len())
}

/// Run every configured policy over one listing and sum their counts
pub async fn apply_retention(
    store: &dyn BackupStore,
    path: &Path,
    policy: &RetentionPolicy,
) -> Result<CleanupReport> {
    let max_age = policy.max_age()?;
    let backups = store.list_backups(path).await?;
    let now = Utc::now();

    let by_age = max_age
        .map(|age| select_by_age(&backups, age, now))
        .unwrap_or_default();
    let by_count = policy
        .max_count
        .map(|keep| select_by_count(&backups, keep))
        .unwrap_or_default();
    let by_size = policy
        .max_total_bytes
        .map(|cap| select_by_size(&backups, cap))
        .unwrap_or_default();

    let mut seen = HashSet::new();
    let distinct: Vec<Backup> = by_age
        .iter()
        .chain(&by_count)
        .chain(&by_size)
        .filter(|b| seen.insert(b.path.clone()))
        .cloned()
        .collect();
    let removed = delete_all(store, &distinct).await?;

    let report = CleanupReport {
        by_age: by_age.len(),
        by_count: by_count.len(),
        by_size: by_size.len(),
        deleted_count: by_age.len() + by_count.len() + by_size.len(),
        removed,
    };

    tracing::info!(
        "Retention for {}: {} matched (age {}, count {}, size {}), {} files removed",
        path.display(),
        report.deleted_count,
        report.by_age,
        report.by_count,
        report.by_size,
        report.removed.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::FileBackupStore;
    use tempfile::tempdir;

    fn backup(name: &str, hours_old: i64, size_bytes: u64, now: DateTime<Utc>) -> Backup {
        Backup {
            path: PathBuf::from(name),
            timestamp: now - chrono::Duration::hours(hours_old),
            size_bytes,
        }
    }

    #[test]
    fn size_policy_keeps_newest_within_cap() {
        let now = Utc::now();
        let backups = vec![
            backup("a", 1, 40, now),
            backup("b", 2, 40, now),
            backup("c", 3, 40, now),
        ];
        let doomed = select_by_size(&backups, 100);
        assert_eq!(doomed.len(), 1);
        assert_eq!(doomed[0].path, PathBuf::from("c"));
        assert!(select_by_size(&backups, 120).is_empty());
    }

    #[test]
    fn count_policy_drops_oldest() {
        let now = Utc::now();
        let backups = vec![backup("a", 1, 1, now), backup("b", 2, 1, now), backup("c", 3, 1, now)];
        let doomed: Vec<_> = select_by_count(&backups, 1).into_iter().map(|b| b.path).collect();
        assert_eq!(doomed, vec![PathBuf::from("b"), PathBuf::from("c")]);
        assert!(select_by_count(&backups, 5).is_empty());
    }

    #[test]
    fn age_boundary_is_exclusive() {
        let now = Utc::now();
        let backups = vec![backup("edge", 2, 1, now), backup("old", 3, 1, now)];
        let doomed = select_by_age(&backups, chrono::Duration::hours(2), now);
        assert_eq!(doomed.len(), 1);
        assert_eq!(doomed[0].path, PathBuf::from("old"));
    }

    #[tokio::test]
    async fn single_overlap_is_counted_twice() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Caddyfile");
        std::fs::write(&path, "x").unwrap();

        // Ages 1h..5h: the age policy matches 3h, 4h, 5h; keeping the newest
        // four makes the count policy match 5h. One file is matched by both.
        for hours in 1..=5 {
            let b = FileBackupStore::backup_path(&path, Utc::now() - chrono::Duration::hours(hours) - chrono::Duration::minutes(30));
            std::fs::write(b, "x").unwrap();
        }

        let store = FileBackupStore::new();
        let policy = RetentionPolicy {
            max_age_secs: Some(3 * 3600 - 60),
            max_count: Some(4),
            max_total_bytes: None,
        };
        let report = apply_retention(&store, &path, &policy).await.unwrap();

        assert_eq!(report.by_age, 3);
        assert_eq!(report.by_count, 1);
        assert_eq!(report.deleted_count, 4);
        assert_eq!(report.removed.len(), 3);
        assert_eq!(store.list_backups(&path).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn two_overlaps_are_each_counted_twice() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Caddyfile");
        std::fs::write(&path, "x").unwrap();

        // Ages 1h..5h: the age policy matches 3h, 4h, 5h; keeping the newest
        // three makes the count policy match 4h and 5h. Both policies take
        // the oldest end of one listing, so a 3 + 2 split always shares two
        // files: 5 reported, 3 removed.
        for hours in 1..=5 {
            let b = FileBackupStore::backup_path(&path, Utc::now() - chrono::Duration::hours(hours) - chrono::Duration::minutes(30));
            std::fs::write(b, "x").unwrap();
        }

        let store = FileBackupStore::new();
        let policy = RetentionPolicy {
            max_age_secs: Some(3 * 3600 - 60),
            max_count: Some(3),
            max_total_bytes: None,
        };
        let report = apply_retention(&store, &path, &policy).await.unwrap();

        assert_eq!(report.by_age, 3);
        assert_eq!(report.by_count, 2);
        assert_eq!(report.deleted_count, 5);
        assert!(report.removed.len() <= 4);
        assert_eq!(report.removed.len(), 3);
        assert_eq!(store.list_backups(&path).await.unwrap().len(), 2);
    }

    #[test]
    fn out_of_range_age_is_rejected() {
        for secs in [u64::MAX, 10_000_000_000_000_000, MAX_AGE_SECS + 1] {
            let policy = RetentionPolicy {
                max_age_secs: Some(secs),
                ..RetentionPolicy::default()
            };
            assert!(policy.validate().is_err(), "{} accepted", secs);
        }
        let policy = RetentionPolicy {
            max_age_secs: Some(MAX_AGE_SECS),
            ..RetentionPolicy::default()
        };
        assert!(policy.max_age().unwrap().is_some());
    }

    #[tokio::test]
    async fn huge_age_deletes_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Caddyfile");
        std::fs::write(&path, "x").unwrap();
        for hours in 1..=5 {
            let b = FileBackupStore::backup_path(&path, Utc::now() - chrono::Duration::hours(hours));
            std::fs::write(b, "x").unwrap();
        }
        let store = FileBackupStore::new();

        let wrapped = RetentionPolicy {
            max_age_secs: Some(u64::MAX),
            ..RetentionPolicy::default()
        };
        assert!(apply_retention(&store, &path, &wrapped).await.is_err());

        let forever = RetentionPolicy {
            max_age_secs: Some(MAX_AGE_SECS),
            ..RetentionPolicy::default()
        };
        let report = apply_retention(&store, &path, &forever).await.unwrap();
        assert_eq!(report.deleted_count, 0);
        assert_eq!(store.list_backups(&path).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn standalone_sweeps_delete_their_own_subset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Caddyfile");
        std::fs::write(&path, "x").unwrap();
        for hours in 1..=4 {
            let b = FileBackupStore::backup_path(&path, Utc::now() - chrono::Duration::hours(hours));
            std::fs::write(b, "0123456789").unwrap();
        }

        let store = FileBackupStore::new();
        assert_eq!(cleanup_by_count(&store, &path, 3).await.unwrap(), 1);
        assert_eq!(cleanup_by_size(&store, &path, 20).await.unwrap(), 1);
        assert_eq!(
            cleanup_old_backups(&store, &path, chrono::Duration::minutes(90)).await.unwrap(),
            1
        );
        assert_eq!(store.list_backups(&path).await.unwrap().len(), 1);
    }
}
