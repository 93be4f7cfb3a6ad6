// # Memory Audit Sink
//
// In-memory implementation of AuditSink.
//
// Entries are lost on exit. Useful for tests and for runs where the audit
// trail only needs to live as long as the process.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::audit::{AuditEntry, AuditSink};

/// In-memory audit sink
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    inner: Arc<RwLock<Vec<AuditEntry>>>,
}

impl MemoryAuditSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries logged
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// True when nothing was logged
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn log(&self, entry: AuditEntry) -> Result<(), Error> {
        self.inner.write().await.push(entry);
        Ok(())
    }

    async fn load_logs(&self) -> Result<Vec<AuditEntry>, Error> {
        Ok(self.inner.read().await.clone())
    }
}
