//! Collaborator traits
//!
//! The core orchestrates these; implementations live in other crates
//! (or, for backups and audit logs, in this one).
//!
//! - [`DnsClient`]: remote DNS provider
//! - [`ProxyConfigurator`]: parse/generate/edit the proxy configuration
//! - [`ProxyReloader`]: validate the configuration and reload the daemon
//! - [`ContainerRuntime`]: restart/list the container running the daemon
//! - [`BackupStore`]: config file snapshots
//! - [`AuditSink`]: operation log

pub mod audit;
pub mod backup_store;
pub mod dns_client;
pub mod proxy;

pub use audit::{AuditEntry, AuditResult, AuditSink, EntityType};
pub use backup_store::BackupStore;
pub use dns_client::{DnsClient, DnsClientFactory};
pub use proxy::{
    BlockParams, ContainerHandle, ContainerRuntime, ProxyConfigurator, ProxyReloader,
    ReloadMethod, ReloadTarget,
};
