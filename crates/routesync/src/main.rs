// # routesync - DNS / Caddy route synchroniser
//
// This binary is a THIN integration layer: it reads configuration from the
// environment, wires the collaborators together and runs one command through
// a `Session`. Reconciliation, sagas and rollback live in routesync-core.
//
// ## Commands
//
// - `status`: classify every domain as synced, DNS-only or proxy-only
// - `sync [DOMAIN...]`: create the missing side of orphaned domains
// - `backups`: list Caddyfile backups, newest first
// - `prune`: apply the backup retention policy
// - `history [--limit N]`: show the audit log
//
// ## Configuration
//
// ### DNS
// - `ROUTESYNC_ZONE_ID`: Zone holding the managed records (required)
// - `ROUTESYNC_PROVIDER`: Provider type (default: cloudflare)
// - `ROUTESYNC_API_TOKEN`: Provider API token (required)
// - `ROUTESYNC_RECORD_TYPES`: Record types to reconcile (default: A,AAAA,CNAME)
//
// ### Caddy
// - `ROUTESYNC_CADDYFILE`: Caddyfile on the host (required)
// - `ROUTESYNC_CONTAINER_CADDYFILE`: Same file inside the container
// - `ROUTESYNC_RELOAD_METHOD`: exec, restart or host (default: exec)
// - `ROUTESYNC_CONTAINER_NAME`: Container running Caddy
// - `ROUTESYNC_CONTAINER_IMAGE`: Image used to find it (default: caddy)
// - `ROUTESYNC_DOCKER_BIN`, `ROUTESYNC_CADDY_BIN`: Executables
//
// ### Sync defaults
// - `ROUTESYNC_DNS_TARGET`, `ROUTESYNC_DNS_RECORD_TYPE`, `ROUTESYNC_PROXIED`, `ROUTESYNC_TTL`
// - `ROUTESYNC_UPSTREAM_HOST`, `ROUTESYNC_UPSTREAM_PORT`, `ROUTESYNC_TLS`, `ROUTESYNC_MARK_MANAGED`
//
// ### Backups and audit
// - `ROUTESYNC_BACKUP_MAX_AGE_SECS`, `ROUTESYNC_BACKUP_MAX_COUNT`, `ROUTESYNC_BACKUP_MAX_BYTES`
// - `ROUTESYNC_AUDIT_LOG`: JSON-lines audit file (in-memory when unset)
// - `ROUTESYNC_LOG_LEVEL`: trace, debug, info, warn, error (default: info)
//
// ## Example
//
// ```bash
// export ROUTESYNC_ZONE_ID=023e105f4ecef8ad9ca31a8372d0c353
// export ROUTESYNC_API_TOKEN=your_token
// export ROUTESYNC_CADDYFILE=/srv/caddy/Caddyfile
// export ROUTESYNC_DNS_TARGET=proxy.example.com
// export ROUTESYNC_UPSTREAM_PORT=8080
//
// routesync status
// routesync sync app.example.com
// ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use routesync_caddy::{Binaries, CaddyConfigurator, CaddyReloader, DockerRuntime};
use routesync_core::config::{AuditConfig, DnsConfig, ProxyConfig, SyncDefaults};
use routesync_core::reconcile::normalize_fqdn;
use routesync_core::saga::Reconciliation;
use routesync_core::traits::ReloadMethod;
use routesync_core::{
    AuditSink, BackupStore, ClientRegistry, Collaborators, ContainerRuntime, DnsClient,
    FileAuditSink, FileBackupStore, Intent, MemoryAuditSink, Message, ProviderConfig,
    ReconciledEntry, RecordType, RetentionPolicy, RouteSyncConfig, SagaExecutor, SagaOutcome,
    SagaResult, Session, SyncStatus,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Exit codes
///
/// - 0: Command succeeded
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
/// - 3: Operation failed; nothing left half-done, or it is reported as such
/// - 4: Rollback failed; the Caddyfile needs manual inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteSyncExitCode {
    Success = 0,
    ConfigError = 1,
    RuntimeError = 2,
    OperationFailed = 3,
    NeedsInspection = 4,
}

impl From<RouteSyncExitCode> for ExitCode {
    fn from(code: RouteSyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the reconciliation of DNS records and Caddy routes
    Status,
    /// Create the missing side of orphaned domains (all orphans when none given)
    Sync { domains: Vec<String> },
    /// List Caddyfile backups
    Backups,
    /// Delete backups according to the retention policy
    Prune,
    /// Show the audit log
    History {
        /// Number of most recent entries to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

/// Everything read from the environment
struct Settings {
    config: RouteSyncConfig,
    binaries: Binaries,
    log_level: String,
}

impl Settings {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let provider = match var("ROUTESYNC_PROVIDER").as_deref().unwrap_or("cloudflare") {
            "cloudflare" => ProviderConfig::Cloudflare {
                api_token: var("ROUTESYNC_API_TOKEN").unwrap_or_default(),
            },
            other => anyhow::bail!(
                "ROUTESYNC_PROVIDER '{}' is not supported. Supported providers: cloudflare",
                other
            ),
        };

        let record_types = match var("ROUTESYNC_RECORD_TYPES") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(RecordType::parse)
                .collect(),
            None => vec![RecordType::A, RecordType::Aaaa, RecordType::Cname],
        };

        let reload_method = match var("ROUTESYNC_RELOAD_METHOD").as_deref() {
            None | Some("exec") => ReloadMethod::Exec,
            Some("restart") => ReloadMethod::Restart,
            Some("host") => ReloadMethod::Host,
            Some(other) => anyhow::bail!(
                "ROUTESYNC_RELOAD_METHOD '{}' is not valid. Valid methods: exec, restart, host",
                other
            ),
        };

        let mut defaults = SyncDefaults::default();
        if let Some(record_type) = var("ROUTESYNC_DNS_RECORD_TYPE") {
            defaults.record_type = RecordType::parse(&record_type);
        }
        defaults.dns_target = var("ROUTESYNC_DNS_TARGET").unwrap_or_default();
        defaults.proxied = parse_var(&var, "ROUTESYNC_PROXIED", parse_bool)?.unwrap_or(true);
        defaults.ttl = parse_var(&var, "ROUTESYNC_TTL", u32::from_str)?.unwrap_or(defaults.ttl);
        if let Some(host) = var("ROUTESYNC_UPSTREAM_HOST") {
            defaults.upstream_host = host;
        }
        defaults.upstream_port = parse_var(&var, "ROUTESYNC_UPSTREAM_PORT", u16::from_str)?;
        defaults.tls = parse_var(&var, "ROUTESYNC_TLS", parse_bool)?.unwrap_or(false);
        defaults.mark_managed =
            parse_var(&var, "ROUTESYNC_MARK_MANAGED", parse_bool)?.unwrap_or(true);

        let mut proxy = ProxyConfig {
            config_path: var("ROUTESYNC_CADDYFILE").map(PathBuf::from).unwrap_or_default(),
            container_config_path: PathBuf::from("/etc/caddy/Caddyfile"),
            reload_method,
            container_name: var("ROUTESYNC_CONTAINER_NAME"),
            container_image: "caddy".to_string(),
        };
        if let Some(path) = var("ROUTESYNC_CONTAINER_CADDYFILE") {
            proxy.container_config_path = PathBuf::from(path);
        }
        if let Some(image) = var("ROUTESYNC_CONTAINER_IMAGE") {
            proxy.container_image = image;
        }

        let backups = RetentionPolicy {
            max_age_secs: parse_var(&var, "ROUTESYNC_BACKUP_MAX_AGE_SECS", u64::from_str)?,
            max_count: parse_var(&var, "ROUTESYNC_BACKUP_MAX_COUNT", usize::from_str)?,
            max_total_bytes: parse_var(&var, "ROUTESYNC_BACKUP_MAX_BYTES", u64::from_str)?,
        };

        let mut binaries = Binaries::default();
        if let Some(docker) = var("ROUTESYNC_DOCKER_BIN") {
            binaries.docker = docker;
        }
        if let Some(caddy) = var("ROUTESYNC_CADDY_BIN") {
            binaries.caddy = caddy;
        }

        Ok(Self {
            config: RouteSyncConfig {
                dns: DnsConfig {
                    zone_id: var("ROUTESYNC_ZONE_ID").unwrap_or_default(),
                    provider,
                    record_types,
                },
                proxy,
                defaults,
                backups,
                audit: AuditConfig {
                    path: var("ROUTESYNC_AUDIT_LOG").map(PathBuf::from),
                },
            },
            binaries,
            log_level: var("ROUTESYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// On top of [`RouteSyncConfig::validate`]: placeholder tokens, the
    /// default DNS target's shape, file locations and the log level.
    fn validate(&self) -> Result<()> {
        self.config
            .validate()
            .context("Invalid configuration (check the ROUTESYNC_* variables)")?;

        if let ProviderConfig::Cloudflare { api_token } = &self.config.dns.provider {
            // Cloudflare API tokens are 40 characters
            if api_token.len() < 20 {
                anyhow::bail!(
                    "ROUTESYNC_API_TOKEN appears too short ({} chars). \
                    Cloudflare tokens are typically 40 characters.",
                    api_token.len()
                );
            }
            let lower = api_token.to_lowercase();
            if lower.contains("your_token") || lower.contains("replace_me") || lower == "token" {
                anyhow::bail!(
                    "ROUTESYNC_API_TOKEN appears to be a placeholder. \
                    Use an actual API token from your DNS provider."
                );
            }
        }

        let defaults = &self.config.defaults;
        if defaults.record_type == RecordType::Cname && !defaults.dns_target.is_empty() {
            validate_domain_name(&defaults.dns_target)
                .context("ROUTESYNC_DNS_TARGET is not a valid host name")?;
        }

        if let Some(parent) = self.config.proxy.config_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            anyhow::bail!(
                "ROUTESYNC_CADDYFILE directory does not exist: {}",
                parent.display()
            );
        }

        if let Some(path) = &self.config.audit.path
            && let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            anyhow::bail!(
                "ROUTESYNC_AUDIT_LOG directory does not exist: {}. \
                Create it first: mkdir -p {}",
                parent.display(),
                parent.display()
            );
        }

        log_level(&self.log_level)?;
        Ok(())
    }
}

fn parse_var<T, E>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    parse: impl Fn(&str) -> std::result::Result<T, E>,
) -> Result<Option<T>>
where
    E: std::fmt::Display,
{
    match var(key) {
        Some(value) => parse(&value)
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", key, value, e)),
        None => Ok(None),
    }
}

fn parse_bool(value: &str) -> std::result::Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err("expected true or false".to_string()),
    }
}

fn log_level(level: &str) -> Result<Level> {
    Ok(match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => anyhow::bail!(
            "ROUTESYNC_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level
        ),
    })
}

/// Validate that a string is a valid domain name
///
/// Basic RFC 1035 checks; catches common errors, not every invalid name.
fn validate_domain_name(domain: &str) -> Result<()> {
    let domain = domain.strip_suffix('.').unwrap_or(domain);
    if domain.is_empty() {
        anyhow::bail!("Domain name cannot be empty");
    }
    if domain.len() > 253 {
        anyhow::bail!("Domain name too long: {} chars (max 253)", domain.len());
    }

    for label in domain.split('.') {
        if label.is_empty() {
            anyhow::bail!("Domain name has empty label: '{}'", domain);
        }
        if label.len() > 63 {
            anyhow::bail!("Domain label too long: {} chars (max 63)", label.len());
        }
        if !label
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '*' || c == '_')
        {
            anyhow::bail!("Domain label contains invalid characters: '{}'", label);
        }
        if label.starts_with('-') || label.ends_with('-') {
            anyhow::bail!("Domain label cannot start or end with hyphen: '{}'", label);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return RouteSyncExitCode::ConfigError.into();
        }
    };
    if let Err(e) = settings.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return RouteSyncExitCode::ConfigError.into();
    }

    let level = log_level(&settings.log_level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return RouteSyncExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return RouteSyncExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run(cli.command, settings).await {
            Ok(code) => code,
            Err(e) => {
                error!("{:#}", e);
                RouteSyncExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Wire collaborators into a session
async fn build_session(settings: &Settings) -> Result<Session> {
    let config = &settings.config;

    let registry = ClientRegistry::new();
    #[cfg(feature = "cloudflare")]
    routesync_provider_cloudflare::register(&registry);
    info!("Available DNS clients: {:?}", registry.list_clients());

    let dns: Arc<dyn DnsClient> = Arc::from(
        registry
            .create_client(&config.dns.provider)
            .context("Failed to create DNS client")?,
    );

    let audit: Arc<dyn AuditSink> = match &config.audit.path {
        Some(path) => Arc::new(
            FileAuditSink::new(path)
                .await
                .with_context(|| format!("Failed to open audit log {}", path.display()))?,
        ),
        None => Arc::new(MemoryAuditSink::new()),
    };

    let runtime: Option<Arc<dyn ContainerRuntime>> = match config.proxy.reload_method {
        ReloadMethod::Host => None,
        ReloadMethod::Exec | ReloadMethod::Restart => {
            Some(Arc::new(DockerRuntime::new(settings.binaries.clone())))
        }
    };

    let collaborators = Collaborators {
        dns,
        proxy: Arc::new(CaddyConfigurator::new()),
        reloader: Arc::new(CaddyReloader::new(settings.binaries.clone())),
        runtime,
        backups: Arc::new(FileBackupStore::new()),
        audit,
    };

    let executor = SagaExecutor::new(config.clone(), collaborators)?;
    Ok(Session::new(Arc::new(executor)))
}

async fn run(command: Command, settings: Settings) -> Result<RouteSyncExitCode> {
    match command {
        Command::Status => {
            let mut session = build_session(&settings).await?;
            let reconciliation = refresh(&mut session).await?;
            print_status(&reconciliation);
            Ok(RouteSyncExitCode::Success)
        }
        Command::Sync { domains } => {
            for domain in &domains {
                validate_domain_name(domain)?;
            }
            let mut session = build_session(&settings).await?;
            let reconciliation = refresh(&mut session).await?;
            let selected = select_orphans(&reconciliation.entries, &domains);
            if selected.is_empty() {
                println!("Nothing to sync");
                return Ok(RouteSyncExitCode::Success);
            }

            info!("Syncing {} orphaned domain(s)", selected.len());
            session.dispatch(Intent::BatchSync(selected));
            let result = session
                .settle()
                .await
                .into_iter()
                .find_map(|message| match message {
                    Message::SagaFinished(result) => Some(result),
                    _ => None,
                })
                .context("sync produced no result")?;
            Ok(print_result(&result))
        }
        Command::Backups => {
            let store = FileBackupStore::new();
            let backups = store.list_backups(&settings.config.proxy.config_path).await?;
            if backups.is_empty() {
                println!("No backups of {}", settings.config.proxy.config_path.display());
            }
            for backup in backups {
                println!(
                    "{}  {:>10} B  {}",
                    backup.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
                    backup.size_bytes,
                    backup.path.display()
                );
            }
            Ok(RouteSyncExitCode::Success)
        }
        Command::Prune => {
            if settings.config.backups.is_empty() {
                println!("No retention policy configured; nothing to prune");
                return Ok(RouteSyncExitCode::Success);
            }
            let mut session = build_session(&settings).await?;
            session.dispatch(Intent::PruneBackups);
            for message in session.settle().await {
                if let Message::Pruned(report) = message {
                    let report = report?;
                    println!(
                        "Removed {} backup(s) (policy matches: age {}, count {}, size {})",
                        report.removed.len(),
                        report.by_age,
                        report.by_count,
                        report.by_size
                    );
                }
            }
            Ok(RouteSyncExitCode::Success)
        }
        Command::History { limit } => {
            if settings.config.audit.path.is_none() {
                warn!("ROUTESYNC_AUDIT_LOG is not set; no history is kept between runs");
            }
            let session = build_session(&settings).await?;
            let logs = session.executor().audit().load_logs().await?;
            let skip = logs.len().saturating_sub(limit);
            for entry in logs.into_iter().skip(skip) {
                let batch = entry
                    .batch_count
                    .map(|n| format!(" ({} items)", n))
                    .unwrap_or_default();
                let error = entry
                    .error
                    .map(|e| format!(": {}", e))
                    .unwrap_or_default();
                println!(
                    "{}  {:?}  {} {:?} {}{}{}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.result,
                    entry.operation,
                    entry.entity_type,
                    entry.domain,
                    batch,
                    error
                );
            }
            Ok(RouteSyncExitCode::Success)
        }
    }
}

async fn refresh(session: &mut Session) -> Result<Reconciliation> {
    session.dispatch(Intent::Refresh);
    for message in session.settle().await {
        if let Message::Refreshed(Err(e)) = message {
            return Err(anyhow::Error::from(e).context("Failed to reconcile DNS and Caddy"));
        }
    }
    session
        .latest()
        .cloned()
        .context("reconciliation produced no result")
}

/// Orphans to sync; all of them when `domains` is empty
fn select_orphans(entries: &[ReconciledEntry], domains: &[String]) -> Vec<ReconciledEntry> {
    let wanted: Vec<String> = domains.iter().map(|d| normalize_fqdn(d)).collect();
    for domain in &wanted {
        match entries.iter().find(|e| &e.domain == domain) {
            None => warn!("{} is neither in DNS nor in the Caddyfile", domain),
            Some(entry) if entry.status == SyncStatus::Synced => {
                warn!("{} is already synced", domain)
            }
            Some(_) => {}
        }
    }

    entries
        .iter()
        .filter(|e| e.status != SyncStatus::Synced)
        .filter(|e| wanted.is_empty() || wanted.contains(&e.domain))
        .cloned()
        .collect()
}

fn status_label(status: SyncStatus) -> &'static str {
    match status {
        SyncStatus::Synced => "synced",
        SyncStatus::OrphanedDns => "dns-only",
        SyncStatus::OrphanedProxy => "proxy-only",
    }
}

fn print_status(reconciliation: &Reconciliation) {
    for entry in &reconciliation.entries {
        let dns = entry
            .dns
            .as_ref()
            .map(|r| format!("{} {}", r.record_type, r.content))
            .unwrap_or_else(|| "-".to_string());
        let proxy = entry
            .proxy
            .as_ref()
            .map(|p| p.upstream())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<11} {:<40} {:<36} {}",
            status_label(entry.status),
            entry.domain,
            dns,
            proxy
        );
    }

    let summary = &reconciliation.summary;
    println!(
        "\n{} synced, {} DNS-only, {} proxy-only ({} total)",
        summary.synced, summary.orphaned_dns, summary.orphaned_proxy, summary.total()
    );
}

fn print_result(result: &SagaResult) -> RouteSyncExitCode {
    println!("{}", result.summary());
    for failure in &result.rollback_failures {
        println!("  rollback: {}", failure);
    }

    match result.outcome {
        SagaOutcome::Succeeded => RouteSyncExitCode::Success,
        SagaOutcome::Critical => {
            if let Some(backup) = &result.backup_path {
                eprintln!(
                    "The Caddyfile may be half-written. Compare it with {} before retrying.",
                    backup.display()
                );
            }
            RouteSyncExitCode::NeedsInspection
        }
        SagaOutcome::Inconsistent => {
            eprintln!("DNS and Caddy disagree until the next successful sync.");
            RouteSyncExitCode::OperationFailed
        }
        SagaOutcome::RolledBack | SagaOutcome::Failed => RouteSyncExitCode::OperationFailed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| env.get(key).cloned())
    }

    const BASE: &[(&str, &str)] = &[
        ("ROUTESYNC_ZONE_ID", "zone-1"),
        ("ROUTESYNC_API_TOKEN", "0123456789abcdef0123456789abcdef01234567"),
        ("ROUTESYNC_CADDYFILE", "Caddyfile"),
    ];

    #[test]
    fn minimal_environment_is_valid() {
        let settings = settings(BASE).unwrap();
        settings.validate().unwrap();
        assert_eq!(settings.config.proxy.reload_method, ReloadMethod::Exec);
        assert_eq!(settings.config.dns.record_types.len(), 3);
        assert!(settings.config.backups.is_empty());
        assert!(settings.config.defaults.proxied);
    }

    #[test]
    fn overrides_are_read() {
        let mut pairs = BASE.to_vec();
        pairs.extend([
            ("ROUTESYNC_RELOAD_METHOD", "host"),
            ("ROUTESYNC_UPSTREAM_PORT", "8080"),
            ("ROUTESYNC_PROXIED", "no"),
            ("ROUTESYNC_BACKUP_MAX_COUNT", "10"),
            ("ROUTESYNC_RECORD_TYPES", "a, cname"),
        ]);
        let settings = settings(&pairs).unwrap();
        assert_eq!(settings.config.proxy.reload_method, ReloadMethod::Host);
        assert_eq!(settings.config.defaults.upstream_port, Some(8080));
        assert!(!settings.config.defaults.proxied);
        assert_eq!(settings.config.backups.max_count, Some(10));
        assert_eq!(
            settings.config.dns.record_types,
            vec![RecordType::A, RecordType::Cname]
        );
    }

    #[test]
    fn bad_values_are_rejected() {
        let mut pairs = BASE.to_vec();
        pairs.push(("ROUTESYNC_UPSTREAM_PORT", "99999"));
        assert!(settings(&pairs).is_err());

        let mut pairs = BASE.to_vec();
        pairs.push(("ROUTESYNC_RELOAD_METHOD", "signal"));
        assert!(settings(&pairs).is_err());

        let mut pairs = BASE.to_vec();
        pairs[1] = ("ROUTESYNC_API_TOKEN", "short");
        assert!(settings(&pairs).unwrap().validate().is_err());

        let mut pairs = BASE.to_vec();
        pairs.push(("ROUTESYNC_LOG_LEVEL", "loud"));
        assert!(settings(&pairs).unwrap().validate().is_err());

        let mut pairs = BASE.to_vec();
        pairs.push(("ROUTESYNC_BACKUP_MAX_AGE_SECS", "18446744073709551615"));
        assert!(settings(&pairs).unwrap().validate().is_err());
    }

    #[test]
    fn missing_zone_fails_validation() {
        let settings = settings(&BASE[1..]).unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn domain_names() {
        assert!(validate_domain_name("app.example.com").is_ok());
        assert!(validate_domain_name("*.example.com.").is_ok());
        assert!(validate_domain_name("-bad.example.com").is_err());
        assert!(validate_domain_name("a..b").is_err());
    }
}
