//! Test doubles and common utilities for contract tests
//!
//! The doubles record every call and fail on demand so tests can inject a
//! failure at any step of a saga and inspect what was compensated.

#![allow(dead_code)]

use async_trait::async_trait;
use routesync_core::backup::{FileBackupStore, RetentionPolicy};
use routesync_core::config::{
    AuditConfig, DnsConfig, ProviderConfig, ProxyConfig, RouteSyncConfig, SyncDefaults,
};
use routesync_core::error::{Error, Result};
use routesync_core::model::{Backup, DnsRecord, LineRange, ParsedConfig, ProxyEntry, RecordType, Snippet, SnippetCategory};
use routesync_core::saga::{Collaborators, SagaExecutor};
use routesync_core::traits::{
    BackupStore, BlockParams, DnsClient, ProxyConfigurator, ProxyReloader, ReloadMethod,
    ReloadTarget,
};
use routesync_core::{MemoryAuditSink, SagaGate};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const ZONE: &str = "zone-1";

/// In-memory DNS provider with per-name failure injection
#[derive(Default)]
pub struct MockDnsClient {
    records: Mutex<Vec<DnsRecord>>,
    next_id: AtomicUsize,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    fail_create: Mutex<HashSet<String>>,
    fail_update: Mutex<HashSet<String>>,
    fail_delete: Mutex<HashSet<String>>,
}

impl MockDnsClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing record; returns it with its id
    pub fn seed(&self, name: &str, record_type: RecordType, content: &str) -> DnsRecord {
        let mut record = DnsRecord::draft(ZONE, name, record_type, content).with_proxied(true);
        record.id = self.fresh_id();
        self.records.lock().unwrap().push(record.clone());
        record
    }

    pub fn records(&self) -> Vec<DnsRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn has(&self, name: &str) -> bool {
        self.records.lock().unwrap().iter().any(|r| r.name == name)
    }

    pub fn get(&self, name: &str) -> Option<DnsRecord> {
        self.records.lock().unwrap().iter().find(|r| r.name == name).cloned()
    }

    pub fn fail_create_for(&self, name: &str) {
        self.fail_create.lock().unwrap().insert(name.to_string());
    }

    pub fn fail_update_for(&self, name: &str) {
        self.fail_update.lock().unwrap().insert(name.to_string());
    }

    pub fn fail_delete_for(&self, name: &str) {
        self.fail_delete.lock().unwrap().insert(name.to_string());
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    fn fresh_id(&self) -> String {
        format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn name_of(&self, record_id: &str) -> Option<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == record_id)
            .map(|r| r.name.clone())
    }
}

#[async_trait]
impl DnsClient for MockDnsClient {
    async fn list_records(
        &self,
        _zone_id: &str,
        record_type: Option<&RecordType>,
    ) -> Result<Vec<DnsRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| record_type.is_none_or(|t| &r.record_type == t))
            .cloned()
            .collect())
    }

    async fn create_record(&self, zone_id: &str, record: &DnsRecord) -> Result<DnsRecord> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.lock().unwrap().contains(&record.name) {
            return Err(Error::provider_code("mock", 81057, "Record already exists."));
        }
        let mut created = record.clone();
        created.id = self.fresh_id();
        created.zone_id = zone_id.to_string();
        self.records.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn update_record(
        &self,
        _zone_id: &str,
        record_id: &str,
        record: &DnsRecord,
    ) -> Result<DnsRecord> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_update.lock().unwrap().contains(&record.name) {
            return Err(Error::network("connection reset by peer"));
        }
        let mut records = self.records.lock().unwrap();
        let slot = records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| Error::provider_code("mock", 81044, "Record does not exist."))?;
        *slot = DnsRecord {
            id: record_id.to_string(),
            ..record.clone()
        };
        Ok(slot.clone())
    }

    async fn delete_record(&self, _zone_id: &str, record_id: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(name) = self.name_of(record_id) {
            if self.fail_delete.lock().unwrap().contains(&name) {
                return Err(Error::network("request timed out"));
            }
        }
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.id != record_id);
        if records.len() == before {
            return Err(Error::provider_code("mock", 81044, "Record does not exist."));
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Minimal site-block dialect:
///
/// ```text
/// (name) {
///     body
/// }
///
/// a.x.com b.x.com {
///     import name
///     reverse_proxy host:port
/// }
/// ```
#[derive(Default)]
pub struct MockConfigurator {
    fail_append: AtomicBool,
    fail_remove: AtomicBool,
}

impl MockConfigurator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_append(&self) {
        self.fail_append.store(true, Ordering::SeqCst);
    }

    pub fn fail_remove(&self) {
        self.fail_remove.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProxyConfigurator for MockConfigurator {
    fn parse(&self, text: &str) -> Result<ParsedConfig> {
        let mut parsed = ParsedConfig::default();
        let lines: Vec<&str> = text.lines().collect();
        let mut i = 0;
        while i < lines.len() {
            let header = lines[i].trim();
            if !header.ends_with('{') {
                i += 1;
                continue;
            }
            let start = i;
            let mut body = Vec::new();
            i += 1;
            while i < lines.len() && lines[i].trim() != "}" {
                body.push(lines[i].trim());
                i += 1;
            }
            let range = LineRange::new(start + 1, i + 1);
            let label = header.trim_end_matches('{').trim();

            if let Some(name) = label.strip_prefix('(').and_then(|l| l.strip_suffix(')')) {
                parsed.snippets.push(Snippet {
                    name: name.to_string(),
                    category: SnippetCategory::Other,
                    content: body.join("\n"),
                    source_lines: range,
                    auto_detected: false,
                    confidence: 1.0,
                });
            } else {
                let domains = label.split_whitespace().map(str::to_string).collect();
                let mut entry = ProxyEntry::new(domains, "");
                for line in &body {
                    if let Some(upstream) = line.strip_prefix("reverse_proxy ") {
                        let (host, port) = match upstream.rsplit_once(':') {
                            Some((host, port)) => (host, port.parse().ok()),
                            None => (upstream, None),
                        };
                        entry.target = host.to_string();
                        entry.port = port;
                    } else if let Some(name) = line.strip_prefix("import ") {
                        entry.imports.insert(name.to_string());
                    }
                }
                entry.raw_block = lines[start..=i.min(lines.len() - 1)].join("\n");
                entry.source_lines = range;
                parsed.entries.push(entry);
            }
            i += 1;
        }
        Ok(parsed)
    }

    fn generate(&self, params: &BlockParams) -> String {
        let mut block = format!("{} {{\n", params.domains.join(" "));
        for name in &params.imports {
            block.push_str(&format!("\timport {}\n", name));
        }
        match params.port {
            Some(port) => block.push_str(&format!("\treverse_proxy {}:{}\n", params.target, port)),
            None => block.push_str(&format!("\treverse_proxy {}\n", params.target)),
        }
        block.push('}');
        block
    }

    fn generate_snippet(&self, name: &str, content: &str) -> String {
        let body: Vec<String> = content.lines().map(|l| format!("\t{}", l.trim())).collect();
        format!("({}) {{\n{}\n}}", name, body.join("\n"))
    }

    async fn append(&self, path: &Path, block: &str) -> Result<()> {
        let mut text = tokio::fs::read_to_string(path).await?;
        // Simulates a write that lands before the collaborator notices a problem.
        text.push_str(&format!("\n{}\n", block));
        tokio::fs::write(path, &text).await?;
        if self.fail_append.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::other("disk quota exceeded")));
        }
        Ok(())
    }

    async fn remove_entry(&self, path: &Path, domain: &str) -> Result<()> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::other("permission denied")));
        }
        let text = tokio::fs::read_to_string(path).await?;
        let parsed = self.parse(&text)?;
        let entry = parsed
            .entries
            .iter()
            .find(|e| e.domains.iter().any(|d| d == domain))
            .ok_or_else(|| Error::not_found(format!("proxy block for {}", domain)))?;
        let range = entry.source_lines;
        let kept: Vec<&str> = text
            .lines()
            .enumerate()
            .filter(|(index, _)| *index + 1 < range.start || *index + 1 > range.end)
            .map(|(_, line)| line)
            .collect();
        let mut out = kept.join("\n");
        out.push('\n');
        tokio::fs::write(path, out).await?;
        Ok(())
    }
}

/// Which way the reloader fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadFailure {
    None,
    Validation,
    Reload,
}

/// Records every validate/reload and fails on demand
pub struct MockReloader {
    failure: Mutex<ReloadFailure>,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl MockReloader {
    pub fn new() -> Self {
        Self {
            failure: Mutex::new(ReloadFailure::None),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_with(&self, failure: ReloadFailure) {
        *self.failure.lock().unwrap() = failure;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Config text as it was at each reload
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProxyReloader for MockReloader {
    async fn validate_and_reload(&self, target: &ReloadTarget) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = tokio::fs::read_to_string(&target.config_host_path).await?;
        self.seen.lock().unwrap().push(text);
        match *self.failure.lock().unwrap() {
            ReloadFailure::None => Ok(()),
            ReloadFailure::Validation => Err(Error::validation("Caddyfile:3 - unrecognized directive")),
            ReloadFailure::Reload => Err(Error::reload("admin endpoint refused connection")),
        }
    }
}

/// File backups whose restore can be made to fail
pub struct FlakyBackupStore {
    inner: FileBackupStore,
    fail_restore: AtomicBool,
    restores: AtomicUsize,
}

impl FlakyBackupStore {
    pub fn new() -> Self {
        Self {
            inner: FileBackupStore::new(),
            fail_restore: AtomicBool::new(false),
            restores: AtomicUsize::new(0),
        }
    }

    pub fn fail_restore(&self) {
        self.fail_restore.store(true, Ordering::SeqCst);
    }

    pub fn restores(&self) -> usize {
        self.restores.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackupStore for FlakyBackupStore {
    async fn create_backup(&self, path: &Path) -> Result<PathBuf> {
        self.inner.create_backup(path).await
    }

    async fn list_backups(&self, path: &Path) -> Result<Vec<Backup>> {
        self.inner.list_backups(path).await
    }

    async fn restore_from_backup(&self, path: &Path, backup_path: &Path) -> Result<()> {
        self.restores.fetch_add(1, Ordering::SeqCst);
        if self.fail_restore.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::other("read-only file system")));
        }
        self.inner.restore_from_backup(path, backup_path).await
    }

    async fn get_old_backups(&self, path: &Path, max_age: chrono::Duration) -> Result<Vec<Backup>> {
        self.inner.get_old_backups(path, max_age).await
    }

    async fn delete_backup(&self, backup: &Backup) -> Result<()> {
        self.inner.delete_backup(backup).await
    }

    async fn write_preserving_mode(&self, path: &Path, text: &str, mode_source: &Path) -> Result<()> {
        self.inner.write_preserving_mode(path, text, mode_source).await
    }
}

/// Configuration pointing at `config_path`, reloading on the host
pub fn test_config(config_path: &Path) -> RouteSyncConfig {
    RouteSyncConfig {
        dns: DnsConfig {
            zone_id: ZONE.to_string(),
            provider: ProviderConfig::Custom {
                factory: "mock".to_string(),
                config: serde_json::json!({}),
            },
            record_types: vec![RecordType::A, RecordType::Cname],
        },
        proxy: ProxyConfig {
            config_path: config_path.to_path_buf(),
            container_config_path: PathBuf::from("/etc/caddy/Caddyfile"),
            reload_method: ReloadMethod::Host,
            container_name: None,
            container_image: "caddy".to_string(),
        },
        defaults: SyncDefaults {
            dns_target: "proxy.x.com".to_string(),
            upstream_host: "app".to_string(),
            upstream_port: Some(8080),
            ..SyncDefaults::default()
        },
        backups: RetentionPolicy::default(),
        audit: AuditConfig::default(),
    }
}

/// Everything a saga test needs, wired together over a temp dir
pub struct Harness {
    pub dir: TempDir,
    pub path: PathBuf,
    pub dns: Arc<MockDnsClient>,
    pub proxy: Arc<MockConfigurator>,
    pub reloader: Arc<MockReloader>,
    pub backups: Arc<FlakyBackupStore>,
    pub audit: MemoryAuditSink,
    pub executor: Arc<SagaExecutor>,
    pub gate: SagaGate,
}

impl Harness {
    /// Write `initial` as the config and build the executor
    pub fn new(initial: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Caddyfile");
        std::fs::write(&path, initial).unwrap();

        let dns = Arc::new(MockDnsClient::new());
        let proxy = Arc::new(MockConfigurator::new());
        let reloader = Arc::new(MockReloader::new());
        let backups = Arc::new(FlakyBackupStore::new());
        let audit = MemoryAuditSink::new();

        let collaborators = Collaborators {
            dns: dns.clone(),
            proxy: proxy.clone(),
            reloader: reloader.clone(),
            runtime: None,
            backups: backups.clone(),
            audit: Arc::new(audit.clone()),
        };
        let executor = Arc::new(SagaExecutor::new(test_config(&path), collaborators).unwrap());

        Self {
            dir,
            path,
            dns,
            proxy,
            reloader,
            backups,
            audit,
            executor,
            gate: SagaGate::new(),
        }
    }

    /// Current config text on disk
    pub fn text(&self) -> String {
        std::fs::read_to_string(&self.path).unwrap()
    }

    /// Refresh and return the reconciled row for `domain`
    pub async fn entry(&self, domain: &str) -> routesync_core::ReconciledEntry {
        let reconciliation = self.executor.refresh().await.unwrap();
        reconciliation
            .entries
            .into_iter()
            .find(|e| e.domain == domain)
            .unwrap_or_else(|| panic!("{} not reconciled", domain))
    }

    /// Backups of the config currently on disk
    pub async fn backup_count(&self) -> usize {
        self.backups.list_backups(&self.path).await.unwrap().len()
    }
}

pub const SITE_A: &str = "a.x.com {\n\treverse_proxy app:8080\n}\n";
