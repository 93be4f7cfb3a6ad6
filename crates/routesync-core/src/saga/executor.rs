//! Saga executor
//!
//! Turns user-level intents into [`Plan`]s, runs them with the generic
//! runner, re-parses the config after every write and logs one audit entry
//! per operation.
//!
//! ## Step tables
//!
//! | Operation | Steps |
//! |---|---|
//! | create entry | backup → create DNS (per domain) → append block → validate/reload* |
//! | update entry | backup? → update DNS? → remove old block → append new block → validate/reload* |
//! | delete entry | backup → remove block → validate/reload* → delete DNS |
//! | sync to proxy | backup → append generated block → validate/reload* |
//! | sync to DNS | create DNS |
//! | batch delete | backup → remove blocks → validate/reload* → delete DNS (per item) |
//! | batch sync | backup → append block / create DNS (per item) → validate/reload* |
//! | snippets | backup → write config → validate/reload* |
//!
//! `*` marks the commit boundary.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::backup::{CleanupReport, apply_retention};
use crate::config::{RouteSyncConfig, SyncDefaults};
use crate::error::{Error, Result};
use crate::model::{
    ConfigSnapshot, DnsRecord, LineRange, ParsedConfig, ProxyEntry, ReconciledEntry, RecordType,
    SyncStatus,
};
use crate::reconcile::{ReconcileSummary, normalize_fqdn, reconcile, summarize};
use crate::session::SagaLease;
use crate::traits::{
    AuditEntry, AuditResult, AuditSink, BackupStore, BlockParams, ContainerRuntime, DnsClient,
    EntityType, ProxyConfigurator, ProxyReloader,
};

use super::result::SagaResult;
use super::runner::{StepContext, run_plan};
use super::step::{Action, Plan, Step};

pub const CREATE_ENTRY: &str = "create_entry";
pub const UPDATE_ENTRY: &str = "update_entry";
pub const DELETE_ENTRY: &str = "delete_entry";
pub const SYNC_TO_PROXY: &str = "sync_to_proxy";
pub const SYNC_TO_DNS: &str = "sync_to_dns";
pub const BATCH_DELETE: &str = "batch_delete";
pub const BATCH_SYNC: &str = "batch_sync";
pub const CREATE_SNIPPET: &str = "create_snippet";
pub const UPDATE_SNIPPET: &str = "update_snippet";
pub const DELETE_SNIPPET: &str = "delete_snippet";

const STEP_BACKUP: &str = "backup config";
const STEP_RELOAD: &str = "validate and reload proxy";
const STEP_WRITE: &str = "write config";

/// External collaborators used by the executor
#[derive(Clone)]
pub struct Collaborators {
    pub dns: Arc<dyn DnsClient>,
    pub proxy: Arc<dyn ProxyConfigurator>,
    pub reloader: Arc<dyn ProxyReloader>,
    pub runtime: Option<Arc<dyn ContainerRuntime>>,
    pub backups: Arc<dyn BackupStore>,
    pub audit: Arc<dyn AuditSink>,
}

/// DNS side of an entry request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsSettings {
    pub record_type: RecordType,
    pub content: String,
    pub proxied: bool,
    pub ttl: u32,
}

impl DnsSettings {
    /// Settings used when syncing an orphaned proxy entry
    pub fn from_defaults(defaults: &SyncDefaults) -> Self {
        Self {
            record_type: defaults.record_type.clone(),
            content: defaults.dns_target.clone(),
            proxied: defaults.proxied,
            ttl: defaults.ttl,
        }
    }

    fn draft(&self, zone_id: &str, name: &str) -> DnsRecord {
        DnsRecord::draft(zone_id, name, self.record_type.clone(), self.content.clone())
            .with_proxied(self.proxied)
            .with_ttl(self.ttl)
    }

    fn apply_to(&self, record: &DnsRecord) -> DnsRecord {
        DnsRecord {
            record_type: self.record_type.clone(),
            content: self.content.clone(),
            proxied: self.proxied,
            ttl: self.ttl,
            ..record.clone()
        }
    }
}

/// A new entry: one proxy block and optionally one DNS record per domain
#[derive(Debug, Clone)]
pub struct EntryRequest {
    pub block: BlockParams,
    pub dns: Option<DnsSettings>,
}

/// Changes to an existing entry; `None` leaves that side untouched
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub block: Option<BlockParams>,
    pub dns: Option<DnsSettings>,
}

/// Sides to delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteRequest {
    pub dns: bool,
    pub proxy: bool,
}

impl DeleteRequest {
    /// Delete whatever exists on both sides
    pub fn both() -> Self {
        Self {
            dns: true,
            proxy: true,
        }
    }
}

/// Result of a refresh
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub snapshot: Arc<ConfigSnapshot>,
    pub records: Vec<DnsRecord>,
    pub entries: Vec<ReconciledEntry>,
    pub summary: ReconcileSummary,
}

#[derive(Debug)]
struct View {
    snapshot: Arc<ConfigSnapshot>,
    records: Vec<DnsRecord>,
}

/// Runs mutating operations against DNS and the proxy config
pub struct SagaExecutor {
    config: RouteSyncConfig,
    collaborators: Collaborators,
    generation: AtomicU64,
    view: RwLock<View>,
}

impl SagaExecutor {
    /// Create an executor; call [`refresh`](Self::refresh) before mutating
    pub fn new(config: RouteSyncConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        let generation = 1;
        Ok(Self {
            config,
            collaborators,
            generation: AtomicU64::new(generation),
            view: RwLock::new(View {
                snapshot: Arc::new(ConfigSnapshot::new(
                    generation,
                    String::new(),
                    ParsedConfig::default(),
                )),
                records: Vec::new(),
            }),
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &RouteSyncConfig {
        &self.config
    }

    /// Current config generation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Audit sink operations are logged to
    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.collaborators.audit
    }

    /// Latest parse of the config
    pub async fn snapshot(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.view.read().await.snapshot)
    }

    /// Re-list DNS records, re-parse the config and reconcile
    pub async fn refresh(&self) -> Result<Reconciliation> {
        let records = self.list_records().await?;
        let snapshot = self.load_snapshot().await?;
        let entries = reconcile(&records, snapshot.entries());
        let summary = summarize(&entries);

        let mut view = self.view.write().await;
        view.snapshot = Arc::clone(&snapshot);
        view.records = records.clone();
        drop(view);

        info!(
            "Reconciled {} domain(s): {} synced, {} DNS-only, {} proxy-only",
            summary.total(),
            summary.synced,
            summary.orphaned_dns,
            summary.orphaned_proxy
        );

        Ok(Reconciliation {
            snapshot,
            records,
            entries,
            summary,
        })
    }

    /// Apply the configured backup retention policies
    pub async fn prune_backups(&self, _lease: &SagaLease) -> Result<CleanupReport> {
        apply_retention(
            self.collaborators.backups.as_ref(),
            &self.config.proxy.config_path,
            &self.config.backups,
        )
        .await
    }

    /// Create DNS records and a proxy block for new domains
    pub async fn create_entry(&self, _lease: &SagaLease, request: EntryRequest) -> SagaResult {
        let domains: Vec<String> = request.block.domains.iter().map(|d| normalize_fqdn(d)).collect();
        let entity = if request.dns.is_some() {
            EntityType::Both
        } else {
            EntityType::Proxy
        };

        let plan = match self.plan_create(&request, &domains).await {
            Ok(plan) => plan,
            Err(e) => return self.reject(CREATE_ENTRY, domains, entity, e).await,
        };
        self.execute(plan, entity).await
    }

    async fn plan_create(&self, request: &EntryRequest, domains: &[String]) -> Result<Plan> {
        if domains.is_empty() {
            return Err(Error::invalid_input("At least one domain is required"));
        }
        for domain in domains {
            validate_domain(domain)?;
        }
        if request.block.target.trim().is_empty() {
            return Err(Error::invalid_input("Upstream target cannot be empty"));
        }

        for domain in domains {
            self.check_unclaimed(domain, true, request.dns.is_some()).await?;
        }

        let mut plan = Plan::new(CREATE_ENTRY, domains[0].clone());
        plan.affected_domains = domains.to_vec();
        plan.push(Step::shared(STEP_BACKUP, Action::BackupConfig));
        if let Some(dns) = &request.dns {
            if dns.content.trim().is_empty() {
                return Err(Error::invalid_input("DNS record content cannot be empty"));
            }
            for domain in domains {
                plan.push(Step::for_item(
                    0,
                    format!("create DNS record {}", domain),
                    Action::CreateDnsRecord(dns.draft(&self.config.dns.zone_id, domain)),
                ));
            }
        }
        let block = self.collaborators.proxy.generate(&request.block);
        plan.push(Step::for_item(0, "append proxy block", Action::AppendProxyBlock(block)))
            .push(Step::shared(STEP_RELOAD, Action::ValidateAndReload));
        Ok(plan)
    }

    /// Change the DNS record and/or the proxy block of an entry
    pub async fn update_entry(
        &self,
        _lease: &SagaLease,
        current: &ReconciledEntry,
        request: UpdateRequest,
    ) -> SagaResult {
        let entity = EntityType::from_sides(request.dns.is_some(), request.block.is_some())
            .unwrap_or(EntityType::Both);

        let plan = match self.plan_update(current, &request) {
            Ok(plan) => plan,
            Err(e) => {
                return self
                    .reject(UPDATE_ENTRY, vec![current.domain.clone()], entity, e)
                    .await;
            }
        };
        if plan.is_empty() {
            debug!("Nothing to change for {}", current.domain);
            let result = SagaResult::succeeded(UPDATE_ENTRY, plan.affected_domains, None, 1);
            self.record(entity, &result).await;
            return result;
        }
        self.execute(plan, entity).await
    }

    fn plan_update(&self, current: &ReconciledEntry, request: &UpdateRequest) -> Result<Plan> {
        if let Some(proxy) = &current.proxy {
            self.check_fresh(proxy)?;
        }
        if request.block.is_some() && current.proxy.is_none() {
            return Err(Error::invalid_input(format!(
                "{} has no proxy block to update; sync it first",
                current.domain
            )));
        }
        if request.dns.is_some() && current.dns.is_none() {
            return Err(Error::invalid_input(format!(
                "{} has no DNS record to update; sync it first",
                current.domain
            )));
        }

        let mut plan = Plan::new(UPDATE_ENTRY, current.domain.clone());
        if request.block.is_some() {
            plan.push(Step::shared(STEP_BACKUP, Action::BackupConfig));
        }
        if let (Some(settings), Some(previous)) = (&request.dns, &current.dns) {
            let desired = settings.apply_to(previous);
            if desired.differs_from(previous) {
                plan.push(Step::for_item(
                    0,
                    format!("update DNS record {}", previous.name),
                    Action::UpdateDnsRecord {
                        previous: previous.clone(),
                        desired,
                    },
                ));
            }
        }
        if let (Some(block), Some(old)) = (&request.block, &current.proxy) {
            let old_domain = old
                .primary_domain()
                .map(str::to_string)
                .unwrap_or_else(|| current.domain.clone());
            let text = self.collaborators.proxy.generate(block);
            plan.push(Step::for_item(
                0,
                "remove old proxy block",
                Action::RemoveProxyBlock(old_domain),
            ))
            .push(Step::for_item(0, "append new proxy block", Action::AppendProxyBlock(text)))
            .push(Step::shared(STEP_RELOAD, Action::ValidateAndReload));
        }
        Ok(plan)
    }

    /// Delete the proxy block and/or the DNS record of an entry
    ///
    /// The DNS delete runs after the reload; if it fails the proxy removal
    /// stays and the result is [`Inconsistent`](crate::saga::SagaOutcome::Inconsistent).
    pub async fn delete_entry(
        &self,
        _lease: &SagaLease,
        current: &ReconciledEntry,
        request: DeleteRequest,
    ) -> SagaResult {
        let entity = EntityType::from_sides(
            request.dns && current.dns.is_some(),
            request.proxy && current.proxy.is_some(),
        )
        .unwrap_or(EntityType::Both);

        let plan = match self.plan_delete(current, request) {
            Ok(plan) => plan,
            Err(e) => {
                return self
                    .reject(DELETE_ENTRY, vec![current.domain.clone()], entity, e)
                    .await;
            }
        };
        self.execute(plan, entity).await
    }

    fn plan_delete(&self, current: &ReconciledEntry, request: DeleteRequest) -> Result<Plan> {
        let proxy = current.proxy.as_ref().filter(|_| request.proxy);
        let record = current.dns.as_ref().filter(|_| request.dns);
        if proxy.is_none() && record.is_none() {
            return Err(Error::not_found(format!(
                "{} has nothing to delete on the requested side(s)",
                current.domain
            )));
        }

        let mut plan = Plan::new(DELETE_ENTRY, current.domain.clone());
        if let Some(proxy) = proxy {
            self.check_fresh(proxy)?;
            plan.push(Step::shared(STEP_BACKUP, Action::BackupConfig))
                .push(Step::for_item(
                    0,
                    "remove proxy block",
                    Action::RemoveProxyBlock(current.domain.clone()),
                ))
                .push(Step::shared(STEP_RELOAD, Action::ValidateAndReload));
        }
        if let Some(record) = record {
            plan.push(Step::for_item(
                0,
                format!("delete DNS record {}", record.name),
                Action::DeleteDnsRecord(record.clone()),
            ));
        }
        Ok(plan)
    }

    /// Generate a proxy block for a DNS-only domain
    pub async fn sync_to_proxy(&self, _lease: &SagaLease, entry: &ReconciledEntry) -> SagaResult {
        let plan = match self.plan_sync_to_proxy(entry).await {
            Ok(plan) => plan,
            Err(e) => {
                return self
                    .reject(SYNC_TO_PROXY, vec![entry.domain.clone()], EntityType::Proxy, e)
                    .await;
            }
        };
        self.execute(plan, EntityType::Proxy).await
    }

    async fn plan_sync_to_proxy(&self, entry: &ReconciledEntry) -> Result<Plan> {
        expect_status(entry, SyncStatus::OrphanedDns)?;
        self.check_unclaimed(&entry.domain, true, false).await?;
        let mut plan = Plan::new(SYNC_TO_PROXY, entry.domain.clone());
        plan.push(Step::shared(STEP_BACKUP, Action::BackupConfig))
            .push(Step::for_item(
                0,
                "append generated proxy block",
                Action::AppendProxyBlock(self.default_block(&entry.domain)),
            ))
            .push(Step::shared(STEP_RELOAD, Action::ValidateAndReload));
        Ok(plan)
    }

    /// Create a DNS record for a proxy-only domain
    pub async fn sync_to_dns(&self, _lease: &SagaLease, entry: &ReconciledEntry) -> SagaResult {
        let plan = match self.plan_sync_to_dns(entry).await {
            Ok(plan) => plan,
            Err(e) => {
                return self
                    .reject(SYNC_TO_DNS, vec![entry.domain.clone()], EntityType::Dns, e)
                    .await;
            }
        };
        self.execute(plan, EntityType::Dns).await
    }

    async fn plan_sync_to_dns(&self, entry: &ReconciledEntry) -> Result<Plan> {
        expect_status(entry, SyncStatus::OrphanedProxy)?;
        if let Some(proxy) = &entry.proxy {
            self.check_fresh(proxy)?;
        }
        self.check_unclaimed(&entry.domain, false, true).await?;
        let mut plan = Plan::new(SYNC_TO_DNS, entry.domain.clone());
        plan.push(Step::for_item(
            0,
            format!("create DNS record {}", entry.domain),
            Action::CreateDnsRecord(self.default_record(&entry.domain)?),
        ));
        Ok(plan)
    }

    /// Delete several entries with one backup and one reload
    pub async fn batch_delete(
        &self,
        _lease: &SagaLease,
        entries: &[ReconciledEntry],
        request: DeleteRequest,
    ) -> SagaResult {
        let domains: Vec<String> = entries.iter().map(|e| e.domain.clone()).collect();
        let entity = EntityType::from_sides(request.dns, request.proxy).unwrap_or(EntityType::Both);

        let plan = match self.plan_batch_delete(entries, request) {
            Ok(plan) => plan,
            Err(e) => return self.reject(BATCH_DELETE, domains, entity, e).await,
        };
        self.execute(plan, entity).await
    }

    fn plan_batch_delete(&self, entries: &[ReconciledEntry], request: DeleteRequest) -> Result<Plan> {
        if entries.is_empty() {
            return Err(Error::invalid_input("No entries selected"));
        }

        let mut removals = Vec::new();
        let mut deletions = Vec::new();
        let mut seen_blocks = HashSet::new();
        for (item, entry) in entries.iter().enumerate() {
            if let Some(proxy) = entry.proxy.as_ref().filter(|_| request.proxy) {
                self.check_fresh(proxy)?;
                // Several selected domains may share one block.
                if seen_blocks.insert(proxy.handle()) {
                    removals.push(Step::for_item(
                        item,
                        format!("remove proxy block {}", entry.domain),
                        Action::RemoveProxyBlock(entry.domain.clone()),
                    ));
                }
            }
            if let Some(record) = entry.dns.as_ref().filter(|_| request.dns) {
                deletions.push(Step::for_item(
                    item,
                    format!("delete DNS record {}", record.name),
                    Action::DeleteDnsRecord(record.clone()),
                ));
            }
        }
        if removals.is_empty() && deletions.is_empty() {
            return Err(Error::not_found("Selected entries have nothing to delete"));
        }

        let mut plan = Plan::batch(BATCH_DELETE, entries.iter().map(|e| e.domain.clone()).collect());
        if !removals.is_empty() {
            plan.push(Step::shared(STEP_BACKUP, Action::BackupConfig));
            plan.steps.append(&mut removals);
            plan.push(Step::shared(STEP_RELOAD, Action::ValidateAndReload));
        }
        plan.steps.append(&mut deletions);
        Ok(plan)
    }

    /// Sync several orphans with one backup and one reload
    ///
    /// DNS-only domains get a generated proxy block, proxy-only domains a DNS
    /// record from the defaults. Synced entries are skipped.
    pub async fn batch_sync(&self, _lease: &SagaLease, entries: &[ReconciledEntry]) -> SagaResult {
        let orphans: Vec<&ReconciledEntry> = entries
            .iter()
            .filter(|e| e.status != SyncStatus::Synced)
            .collect();
        let domains: Vec<String> = orphans.iter().map(|e| e.domain.clone()).collect();

        let plan = match self.plan_batch_sync(&orphans).await {
            Ok(plan) => plan,
            Err(e) => return self.reject(BATCH_SYNC, domains, EntityType::Both, e).await,
        };
        let entity = plan.entity_type().unwrap_or(EntityType::Both);
        self.execute(plan, entity).await
    }

    async fn plan_batch_sync(&self, orphans: &[&ReconciledEntry]) -> Result<Plan> {
        if orphans.is_empty() {
            return Err(Error::invalid_input("No orphaned entries selected"));
        }
        let mut selected = HashSet::new();
        for entry in orphans {
            if !selected.insert(normalize_fqdn(&entry.domain)) {
                return Err(Error::invalid_input(format!("{} selected twice", entry.domain)));
            }
            let to_proxy = entry.status == SyncStatus::OrphanedDns;
            self.check_unclaimed(&entry.domain, to_proxy, !to_proxy).await?;
        }

        let mut plan = Plan::batch(BATCH_SYNC, orphans.iter().map(|e| e.domain.clone()).collect());
        let touches_proxy = orphans.iter().any(|e| e.status == SyncStatus::OrphanedDns);
        if touches_proxy {
            plan.push(Step::shared(STEP_BACKUP, Action::BackupConfig));
        }
        for (item, entry) in orphans.iter().enumerate() {
            match entry.status {
                SyncStatus::OrphanedDns => {
                    plan.push(Step::for_item(
                        item,
                        format!("append proxy block {}", entry.domain),
                        Action::AppendProxyBlock(self.default_block(&entry.domain)),
                    ));
                }
                SyncStatus::OrphanedProxy => {
                    if let Some(proxy) = &entry.proxy {
                        self.check_fresh(proxy)?;
                    }
                    plan.push(Step::for_item(
                        item,
                        format!("create DNS record {}", entry.domain),
                        Action::CreateDnsRecord(self.default_record(&entry.domain)?),
                    ));
                }
                SyncStatus::Synced => {}
            }
        }
        if touches_proxy {
            plan.push(Step::shared(STEP_RELOAD, Action::ValidateAndReload));
        }
        Ok(plan)
    }

    /// Add a snippet at the top of the config
    pub async fn create_snippet(&self, _lease: &SagaLease, name: &str, content: &str) -> SagaResult {
        let plan = match self.plan_create_snippet(name, content).await {
            Ok(plan) => plan,
            Err(e) => {
                return self
                    .reject(CREATE_SNIPPET, vec![name.to_string()], EntityType::Proxy, e)
                    .await;
            }
        };
        self.execute(plan, EntityType::Proxy).await
    }

    async fn plan_create_snippet(&self, name: &str, content: &str) -> Result<Plan> {
        validate_snippet_name(name)?;
        let snapshot = self.load_snapshot().await?;
        if snapshot.snippet(name).is_some() {
            return Err(Error::conflict(format!("snippet '{}' already exists", name)));
        }
        let snippet = self.collaborators.proxy.generate_snippet(name, content);
        let mut text = snippet.trim_end().to_string();
        text.push_str("\n\n");
        text.push_str(snapshot.text());
        Ok(self.write_plan(CREATE_SNIPPET, name, text))
    }

    /// Replace the body of an existing snippet
    pub async fn update_snippet(&self, _lease: &SagaLease, name: &str, content: &str) -> SagaResult {
        let plan = match self.plan_update_snippet(name, content).await {
            Ok(plan) => plan,
            Err(e) => {
                return self
                    .reject(UPDATE_SNIPPET, vec![name.to_string()], EntityType::Proxy, e)
                    .await;
            }
        };
        self.execute(plan, EntityType::Proxy).await
    }

    async fn plan_update_snippet(&self, name: &str, content: &str) -> Result<Plan> {
        let snapshot = self.load_snapshot().await?;
        let existing = snapshot
            .snippet(name)
            .ok_or_else(|| Error::not_found(format!("snippet '{}'", name)))?;
        let snippet = self.collaborators.proxy.generate_snippet(name, content);
        let text = replace_lines(snapshot.text(), existing.source_lines, Some(snippet.trim_end()));
        Ok(self.write_plan(UPDATE_SNIPPET, name, text))
    }

    /// Remove a snippet no entry imports
    pub async fn delete_snippet(&self, _lease: &SagaLease, name: &str) -> SagaResult {
        let plan = match self.plan_delete_snippet(name).await {
            Ok(plan) => plan,
            Err(e) => {
                return self
                    .reject(DELETE_SNIPPET, vec![name.to_string()], EntityType::Proxy, e)
                    .await;
            }
        };
        self.execute(plan, EntityType::Proxy).await
    }

    async fn plan_delete_snippet(&self, name: &str) -> Result<Plan> {
        let snapshot = self.load_snapshot().await?;
        let existing = snapshot
            .snippet(name)
            .ok_or_else(|| Error::not_found(format!("snippet '{}'", name)))?;
        let usage = snapshot.snippet_usage(name);
        if usage > 0 {
            return Err(Error::ReferentialIntegrity {
                name: name.to_string(),
                usage,
            });
        }
        let text = replace_lines(snapshot.text(), existing.source_lines, None);
        Ok(self.write_plan(DELETE_SNIPPET, name, text))
    }

    fn write_plan(&self, operation: &'static str, name: &str, text: String) -> Plan {
        let mut plan = Plan::new(operation, name);
        plan.push(Step::shared(STEP_BACKUP, Action::BackupConfig))
            .push(Step::for_item(0, STEP_WRITE, Action::WriteConfig(text)))
            .push(Step::shared(STEP_RELOAD, Action::ValidateAndReload));
        plan
    }

    async fn execute(&self, plan: Plan, fallback: EntityType) -> SagaResult {
        let entity = plan.entity_type().unwrap_or(fallback);
        let collaborators = &self.collaborators;
        let ctx = StepContext {
            dns: collaborators.dns.as_ref(),
            proxy: collaborators.proxy.as_ref(),
            reloader: collaborators.reloader.as_ref(),
            runtime: collaborators.runtime.as_deref(),
            backups: collaborators.backups.as_ref(),
            zone_id: &self.config.dns.zone_id,
            settings: &self.config.proxy,
        };

        let report = run_plan(&ctx, &plan).await;
        if report.wrote_file {
            let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
            debug!("Config rewritten, now at generation {}", generation);
            match self.load_snapshot().await {
                Ok(snapshot) => self.view.write().await.snapshot = snapshot,
                Err(e) => warn!("Could not re-parse config after {}: {}", plan.operation, e),
            }
        }
        if plan.touches_dns() {
            match self.list_records().await {
                Ok(records) => self.view.write().await.records = records,
                Err(e) => warn!("Could not re-list DNS records after {}: {}", plan.operation, e),
            }
        }

        let result = report.result;
        if result.success {
            info!("{} {} committed", plan.operation, plan.primary_domain());
        }
        self.record(entity, &result).await;
        result
    }

    async fn reject(
        &self,
        operation: &'static str,
        domains: Vec<String>,
        entity: EntityType,
        cause: Error,
    ) -> SagaResult {
        warn!("{} refused: {}", operation, cause);
        let result = SagaResult::rejected(operation, domains, cause);
        self.record(entity, &result).await;
        result
    }

    async fn record(&self, entity: EntityType, result: &SagaResult) {
        let entry = AuditEntry {
            timestamp: chrono::Utc::now(),
            operation: result.operation.to_string(),
            entity_type: entity,
            domain: result.affected_domains.first().cloned().unwrap_or_default(),
            result: if result.success {
                AuditResult::Success
            } else {
                AuditResult::Failure
            },
            batch_count: is_batch(result.operation).then_some(result.total_items),
            failed_step: result.failed_step.clone(),
            error: result.cause.as_ref().map(ToString::to_string),
        };
        if let Err(e) = self.collaborators.audit.log(entry).await {
            warn!("Failed to write audit entry for {}: {}", result.operation, e);
        }
    }

    async fn list_records(&self) -> Result<Vec<DnsRecord>> {
        let zone_id = &self.config.dns.zone_id;
        let mut records = Vec::new();
        for record_type in &self.config.dns.record_types {
            let mut listed = self
                .collaborators
                .dns
                .list_records(zone_id, Some(record_type))
                .await?;
            debug!("Listed {} {} record(s)", listed.len(), record_type);
            records.append(&mut listed);
        }
        Ok(records)
    }

    /// Refuse to add a side `domain` already has in the last known state
    ///
    /// Catches intents replayed from a reconciliation taken before an
    /// earlier saga gave the domain that side.
    async fn check_unclaimed(&self, domain: &str, proxy: bool, dns: bool) -> Result<()> {
        let wanted = normalize_fqdn(domain);
        let view = self.view.read().await;
        if proxy && view.snapshot.find_domain(&wanted).is_some() {
            return Err(Error::conflict(format!("{} already has a proxy block", domain)));
        }
        if dns && view.records.iter().any(|r| normalize_fqdn(&r.name) == wanted) {
            return Err(Error::conflict(format!("{} already has a DNS record", domain)));
        }
        Ok(())
    }

    async fn load_snapshot(&self) -> Result<Arc<ConfigSnapshot>> {
        let path = &self.config.proxy.config_path;
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} does not exist yet, treating as empty", path.display());
                String::new()
            }
            Err(e) => return Err(e.into()),
        };
        let parsed = self.collaborators.proxy.parse(&text)?;
        Ok(Arc::new(ConfigSnapshot::new(self.generation(), text, parsed)))
    }

    fn check_fresh(&self, entry: &ProxyEntry) -> Result<()> {
        let current = self.generation();
        let handle = entry.handle().generation();
        if handle != current {
            return Err(Error::StaleEntry { handle, current });
        }
        Ok(())
    }

    fn default_block(&self, domain: &str) -> String {
        let defaults = &self.config.defaults;
        let mut params = BlockParams::new(domain, defaults.upstream_host.clone(), defaults.upstream_port);
        params.tls = defaults.tls;
        params.marker = defaults.mark_managed;
        self.collaborators.proxy.generate(&params)
    }

    fn default_record(&self, domain: &str) -> Result<DnsRecord> {
        let defaults = &self.config.defaults;
        if defaults.dns_target.trim().is_empty() {
            return Err(Error::config(
                "No default DNS target configured for syncing proxy entries to DNS",
            ));
        }
        Ok(DnsSettings::from_defaults(defaults).draft(&self.config.dns.zone_id, domain))
    }
}

fn is_batch(operation: &str) -> bool {
    operation == BATCH_DELETE || operation == BATCH_SYNC
}

fn expect_status(entry: &ReconciledEntry, status: SyncStatus) -> Result<()> {
    if entry.status != status {
        return Err(Error::invalid_input(format!(
            "{} is {:?}, expected {:?}",
            entry.domain, entry.status, status
        )));
    }
    Ok(())
}

fn validate_domain(domain: &str) -> Result<()> {
    let valid = !domain.is_empty()
        && domain.len() <= 253
        && domain.contains('.')
        && domain.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '*')
        });
    if !valid {
        return Err(Error::invalid_input(format!("'{}' is not a valid domain name", domain)));
    }
    Ok(())
}

fn validate_snippet_name(name: &str) -> Result<()> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::invalid_input(format!("'{}' is not a valid snippet name", name)));
    }
    Ok(())
}

/// Replace (or drop) the 1-based inclusive `range` of lines in `text`
fn replace_lines(text: &str, range: LineRange, replacement: Option<&str>) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut inserted = false;
    for (index, line) in text.lines().enumerate() {
        let number = index + 1;
        if number < range.start || number > range.end {
            out.push(line);
            continue;
        }
        if !inserted {
            inserted = true;
            if let Some(replacement) = replacement {
                out.extend(replacement.lines());
            }
        }
    }

    // Collapse the blank line left behind by a removed block.
    if replacement.is_none() {
        let at = range.start.saturating_sub(1);
        if at < out.len() && out[at].trim().is_empty() && (at == 0 || out[at - 1].trim().is_empty()) {
            out.remove(at);
        }
    }

    let mut joined = out.join("\n");
    if text.ends_with('\n') {
        joined.push('\n');
    }
    joined
}
