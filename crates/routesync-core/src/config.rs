//! Configuration types for routesync
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::backup::RetentionPolicy;
use crate::model::{RecordType, TTL_AUTO};
use crate::traits::ReloadMethod;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSyncConfig {
    /// DNS side
    pub dns: DnsConfig,

    /// Reverse-proxy side
    pub proxy: ProxyConfig,

    /// Values used when syncing an orphan to the other side
    #[serde(default)]
    pub defaults: SyncDefaults,

    /// Backup retention
    #[serde(default)]
    pub backups: RetentionPolicy,

    /// Audit log
    #[serde(default)]
    pub audit: AuditConfig,
}

impl RouteSyncConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.dns.validate()?;
        self.proxy.validate()?;
        self.defaults.validate()?;
        self.backups.validate()?;
        Ok(())
    }
}

/// DNS provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Zone holding the managed records
    pub zone_id: String,

    /// Provider credentials
    pub provider: ProviderConfig,

    /// Record types fetched for reconciliation
    #[serde(default = "default_record_types")]
    pub record_types: Vec<RecordType>,
}

impl DnsConfig {
    /// Validate the DNS configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.zone_id.trim().is_empty() {
            return Err(crate::Error::config("DNS zone ID cannot be empty"));
        }
        if self.record_types.is_empty() {
            return Err(crate::Error::config("At least one DNS record type must be fetched"));
        }
        self.provider.validate()
    }
}

/// DNS provider selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Cloudflare provider
    Cloudflare {
        /// Cloudflare API token
        api_token: String,
    },

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Cloudflare { api_token } => {
                if api_token.is_empty() {
                    return Err(crate::Error::config("Cloudflare API token cannot be empty"));
                }
                Ok(())
            }
            ProviderConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom provider factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom provider config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Cloudflare { .. } => "cloudflare",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Reverse-proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Config file on the host
    pub config_path: PathBuf,

    /// Same file as seen from inside the container
    #[serde(default = "default_container_config_path")]
    pub container_config_path: PathBuf,

    /// How to make the daemon pick up changes
    #[serde(default)]
    pub reload_method: ReloadMethod,

    /// Container name to target (first running container of the image otherwise)
    #[serde(default)]
    pub container_name: Option<String>,

    /// Image used to find the container
    #[serde(default = "default_container_image")]
    pub container_image: String,
}

impl ProxyConfig {
    /// Validate the proxy configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.config_path.as_os_str().is_empty() {
            return Err(crate::Error::config("Proxy config path cannot be empty"));
        }
        if self.reload_method != ReloadMethod::Host
            && self.container_name.is_none()
            && self.container_image.is_empty()
        {
            return Err(crate::Error::config(
                "Either a container name or a container image is required unless the reload method is 'host'",
            ));
        }
        Ok(())
    }
}

/// Defaults applied when one side is generated from the other
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncDefaults {
    /// Record type created for orphaned proxy entries
    #[serde(default = "default_record_type")]
    pub record_type: RecordType,

    /// Record content (IP for A/AAAA, hostname for CNAME)
    #[serde(default)]
    pub dns_target: String,

    /// Create records as proxied
    #[serde(default = "default_true")]
    pub proxied: bool,

    /// TTL for created records
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Upstream host for generated proxy blocks
    #[serde(default = "default_upstream_host")]
    pub upstream_host: String,

    /// Upstream port for generated proxy blocks
    #[serde(default)]
    pub upstream_port: Option<u16>,

    /// Emit `tls` in generated blocks
    #[serde(default)]
    pub tls: bool,

    /// Mark generated blocks as managed
    #[serde(default = "default_true")]
    pub mark_managed: bool,
}

impl SyncDefaults {
    /// Validate the defaults
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self.record_type {
            RecordType::A | RecordType::Aaaa if !self.dns_target.is_empty() => {
                self.dns_target.parse::<std::net::IpAddr>().map_err(|_| {
                    crate::Error::config(format!(
                        "Default DNS target '{}' is not an IP address but the record type is {}",
                        self.dns_target, self.record_type
                    ))
                })?;
            }
            RecordType::A | RecordType::Aaaa | RecordType::Cname => {}
            ref other => {
                return Err(crate::Error::config(format!(
                    "Record type {other} cannot be used for synced entries"
                )));
            }
        }
        if self.upstream_host.is_empty() {
            return Err(crate::Error::config("Default upstream host cannot be empty"));
        }
        Ok(())
    }
}

impl Default for SyncDefaults {
    fn default() -> Self {
        Self {
            record_type: default_record_type(),
            dns_target: String::new(),
            proxied: true,
            ttl: default_ttl(),
            upstream_host: default_upstream_host(),
            upstream_port: None,
            tls: false,
            mark_managed: true,
        }
    }
}

/// Audit log configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    /// JSON-lines file; in-memory only when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_record_types() -> Vec<RecordType> {
    vec![RecordType::A, RecordType::Aaaa, RecordType::Cname]
}

fn default_container_config_path() -> PathBuf {
    PathBuf::from("/etc/caddy/Caddyfile")
}

fn default_container_image() -> String {
    "caddy".to_string()
}

fn default_record_type() -> RecordType {
    RecordType::Cname
}

fn default_ttl() -> u32 {
    TTL_AUTO
}

fn default_upstream_host() -> String {
    "localhost".to_string()
}

fn default_true() -> bool {
    true
}
