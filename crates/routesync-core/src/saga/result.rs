//! Saga outcome reported to the caller

use std::fmt;
use std::path::PathBuf;

use crate::Error;

/// How a saga ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SagaOutcome {
    /// Every step completed
    Succeeded,
    /// A pre-commit step failed and every compensation ran
    RolledBack,
    /// Failed with nothing to compensate (preflight check, DNS-only step)
    Failed,
    /// A step after the commit boundary failed; the two sides disagree
    Inconsistent,
    /// Restoring the backup failed; the config file needs manual inspection
    Critical,
}

impl fmt::Display for SagaOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Succeeded => "succeeded",
            Self::RolledBack => "rolled back",
            Self::Failed => "failed",
            Self::Inconsistent => "inconsistent",
            Self::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

/// Artifact returned by every mutating operation
#[derive(Debug)]
pub struct SagaResult {
    /// Operation name
    pub operation: &'static str,
    /// True only for [`SagaOutcome::Succeeded`]
    pub success: bool,
    /// How the saga ended
    pub outcome: SagaOutcome,
    /// Name of the step that failed
    pub failed_step: Option<String>,
    /// Backup taken by the saga, if any
    pub backup_path: Option<PathBuf>,
    /// Domains the operation was about
    pub affected_domains: Vec<String>,
    /// Why it failed
    pub cause: Option<Error>,
    /// Batch items whose steps all completed before the failure
    pub completed_items: usize,
    /// Batch items requested
    pub total_items: usize,
    /// DNS compensations that could not be applied
    pub rollback_failures: Vec<String>,
}

impl SagaResult {
    pub(crate) fn succeeded(
        operation: &'static str,
        affected_domains: Vec<String>,
        backup_path: Option<PathBuf>,
        total_items: usize,
    ) -> Self {
        Self {
            operation,
            success: true,
            outcome: SagaOutcome::Succeeded,
            failed_step: None,
            backup_path,
            affected_domains,
            cause: None,
            completed_items: total_items,
            total_items,
            rollback_failures: Vec::new(),
        }
    }

    /// Result for an operation refused before any step ran
    pub(crate) fn rejected(
        operation: &'static str,
        affected_domains: Vec<String>,
        cause: Error,
    ) -> Self {
        let total_items = affected_domains.len().max(1);
        Self {
            operation,
            success: false,
            outcome: SagaOutcome::Failed,
            failed_step: Some(PREFLIGHT_STEP.to_string()),
            backup_path: None,
            affected_domains,
            cause: Some(cause),
            completed_items: 0,
            total_items,
            rollback_failures: Vec::new(),
        }
    }

    /// True when the config file needs manual inspection
    pub fn is_critical(&self) -> bool {
        self.outcome == SagaOutcome::Critical
    }

    /// True when DNS and proxy are known to disagree after the saga
    pub fn needs_resync(&self) -> bool {
        self.outcome == SagaOutcome::Inconsistent || !self.rollback_failures.is_empty()
    }

    /// One-line description for the user
    pub fn summary(&self) -> String {
        let domain = self
            .affected_domains
            .first()
            .map(String::as_str)
            .unwrap_or("-");
        let mut line = format!("{} {}: {}", self.operation, domain, self.outcome);
        if self.total_items > 1 {
            line.push_str(&format!(
                " ({}/{} items)",
                self.completed_items, self.total_items
            ));
        }
        if let Some(cause) = &self.cause {
            line.push_str(&format!(": {}", cause));
        }
        line
    }
}

/// Step name reported for preflight refusals
pub const PREFLIGHT_STEP: &str = "preflight check";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_reports_partial_batch_counts() {
        let mut result = SagaResult::rejected(
            "batch_delete",
            vec!["a.x.com".into(), "b.x.com".into(), "c.x.com".into()],
            Error::network("connection reset"),
        );
        result.completed_items = 2;
        assert_eq!(
            result.summary(),
            "batch_delete a.x.com: failed (2/3 items): Network error: connection reset"
        );
    }

    #[test]
    fn success_counts_every_item() {
        let result = SagaResult::succeeded("create_entry", vec!["a.x.com".into()], None, 1);
        assert!(result.success);
        assert_eq!(result.completed_items, 1);
        assert!(!result.needs_resync());
    }
}
