// # Audit Sink Trait
//
// Append-only record of user-level operations. The saga executor calls
// `log` exactly once per operation, however many steps it ran.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Which system an operation touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityType {
    Dns,
    Proxy,
    Both,
}

impl EntityType {
    /// Derive from the sides touched; `None` if neither was
    pub fn from_sides(dns: bool, proxy: bool) -> Option<Self> {
        match (dns, proxy) {
            (true, true) => Some(Self::Both),
            (true, false) => Some(Self::Dns),
            (false, true) => Some(Self::Proxy),
            (false, false) => None,
        }
    }
}

/// Outcome recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditResult {
    Success,
    Failure,
}

/// One audit log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the operation finished
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Operation name, e.g. `create_entry`
    pub operation: String,
    /// Sides touched
    pub entity_type: EntityType,
    /// Representative domain (first affected domain for batches)
    pub domain: String,
    /// Success or failure
    pub result: AuditResult,
    /// Number of items for batch operations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_count: Option<usize>,
    /// Failed step, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
    /// Error message, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Trait for audit log implementations
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one entry
    async fn log(&self, entry: AuditEntry) -> Result<(), crate::Error>;

    /// All entries, oldest first
    async fn load_logs(&self) -> Result<Vec<AuditEntry>, crate::Error>;
}
