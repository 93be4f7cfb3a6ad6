// # routesync-core
//
// Core library keeping DNS records and reverse-proxy routes in step.
//
// ## Architecture Overview
//
// - **reconcile**: pure classification of every domain into Synced /
//   OrphanedDns / OrphanedProxy
// - **saga**: multi-step mutations across DNS and the proxy config with
//   backup, validate/reload and rollback-on-failure
// - **backup**: timestamped snapshots of the proxy config and retention
// - **session**: single-flight gate and the cooperative update loop
// - **traits**: collaborator contracts (DNS client, proxy configurator,
//   reloader, container runtime, backup store, audit sink)
// - **registry**: plugin-based DNS client factories
//
// ## Design Principles
//
// 1. **Collaborators behind traits**: provider, proxy dialect and process
//    control live in their own crates
// 2. **One runner**: every mutation is a step table run by the same
//    generic runner, so commit-boundary semantics cannot drift
// 3. **No stale handles**: proxy entries carry the generation of the parse
//    they came from and are refused after the file is rewritten
// 4. **Library-First**: the binary only wires things together

pub mod audit;
pub mod backup;
pub mod config;
pub mod error;
pub mod model;
pub mod reconcile;
pub mod registry;
pub mod saga;
pub mod session;
pub mod traits;

// Re-export core types for convenience
pub use audit::{FileAuditSink, MemoryAuditSink};
pub use backup::{CleanupReport, FileBackupStore, RetentionPolicy};
pub use config::{ProviderConfig, RouteSyncConfig};
pub use error::{Error, ErrorKind, Result};
pub use model::{
    Backup, ConfigSnapshot, DnsRecord, EntryHandle, ProxyEntry, ReconciledEntry, RecordType,
    Snippet, SyncStatus,
};
pub use reconcile::reconcile;
pub use registry::ClientRegistry;
pub use saga::{Collaborators, SagaExecutor, SagaOutcome, SagaResult};
pub use session::{Dispatch, Intent, Message, SagaGate, SagaLease, Session};
pub use traits::{
    AuditSink, BackupStore, ContainerRuntime, DnsClient, ProxyConfigurator, ProxyReloader,
};
