//! Data model shared by the reconciliation engine and the saga executor
//!
//! `DnsRecord` and `ProxyEntry` are view objects rebuilt on every refresh;
//! the core never persists them. Proxy entries carry a generation-stamped
//! [`EntryHandle`] so that an entry parsed before a file rewrite cannot be
//! fed back into a mutation after it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// TTL value meaning "automatic" at the provider
pub const TTL_AUTO: u32 = 1;

/// DNS record type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// IPv4 address record
    A,
    /// IPv6 address record
    #[serde(rename = "AAAA")]
    Aaaa,
    /// Canonical name record
    #[serde(rename = "CNAME")]
    Cname,
    /// Text record
    #[serde(rename = "TXT")]
    Txt,
    /// Mail exchange record
    #[serde(rename = "MX")]
    Mx,
    /// Any other type, kept verbatim
    #[serde(untagged)]
    Other(String),
}

impl RecordType {
    /// Wire name of the type
    pub fn as_str(&self) -> &str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Cname => "CNAME",
            Self::Txt => "TXT",
            Self::Mx => "MX",
            Self::Other(other) => other,
        }
    }

    /// Parse a wire name, case-insensitively
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "A" => Self::A,
            "AAAA" => Self::Aaaa,
            "CNAME" => Self::Cname,
            "TXT" => Self::Txt,
            "MX" => Self::Mx,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A DNS record as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Provider-assigned id; empty for records not yet created
    pub id: String,
    /// Record type
    pub record_type: RecordType,
    /// Fully-qualified name
    pub name: String,
    /// Target (IP address or canonical name)
    pub content: String,
    /// Whether the provider proxies traffic for this record
    pub proxied: bool,
    /// TTL in seconds, [`TTL_AUTO`] for automatic
    pub ttl: u32,
    /// Zone the record lives in
    pub zone_id: String,
}

impl DnsRecord {
    /// Build a record that has not been created yet
    pub fn draft(
        zone_id: impl Into<String>,
        name: impl Into<String>,
        record_type: RecordType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            record_type,
            name: name.into(),
            content: content.into(),
            proxied: false,
            ttl: TTL_AUTO,
            zone_id: zone_id.into(),
        }
    }

    /// Set the proxied flag
    pub fn with_proxied(mut self, proxied: bool) -> Self {
        self.proxied = proxied;
        self
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// True when the user-editable fields of `other` differ from this record
    pub fn differs_from(&self, other: &DnsRecord) -> bool {
        self.record_type != other.record_type
            || self.name != other.name
            || self.content != other.content
            || self.proxied != other.proxied
            || self.ttl != other.ttl
    }
}

/// Inclusive, 1-based line range inside the parsed config text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    /// First line (1-based)
    pub start: usize,
    /// Last line (inclusive)
    pub end: usize,
}

impl LineRange {
    /// Create a range
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Positional identity of a proxy entry within one parse of the config
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryHandle {
    generation: u64,
    index: usize,
}

impl EntryHandle {
    /// Generation of the parse that produced the entry (0 = never stamped)
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Position of the entry within its parse
    pub fn index(&self) -> usize {
        self.index
    }
}

/// A site block of the reverse-proxy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyEntry {
    /// Site addresses; the first is the primary domain
    pub domains: Vec<String>,
    /// Upstream host
    pub target: String,
    /// Upstream port
    pub port: Option<u16>,
    /// TLS enabled for the site
    pub tls_enabled: bool,
    /// Access restricted by client IP
    pub ip_restricted: bool,
    /// Forwards authenticated-user headers
    pub oauth_headers: bool,
    /// WebSocket upgrade headers configured
    pub web_socket: bool,
    /// Snippets imported by the block
    pub imports: BTreeSet<String>,
    /// Raw text of the block
    pub raw_block: String,
    /// Where the block sits in the parsed text (marker comment included)
    pub source_lines: LineRange,
    /// Block carries the managed-by marker comment
    pub has_marker: bool,
    handle: EntryHandle,
}

impl ProxyEntry {
    /// Create an entry with defaults for everything but domains and target
    pub fn new(domains: Vec<String>, target: impl Into<String>) -> Self {
        Self {
            domains,
            target: target.into(),
            port: None,
            tls_enabled: false,
            ip_restricted: false,
            oauth_headers: false,
            web_socket: false,
            imports: BTreeSet::new(),
            raw_block: String::new(),
            source_lines: LineRange::default(),
            has_marker: false,
            handle: EntryHandle::default(),
        }
    }

    /// Primary domain of the block
    pub fn primary_domain(&self) -> Option<&str> {
        self.domains.first().map(String::as_str)
    }

    /// Generation-stamped handle
    pub fn handle(&self) -> EntryHandle {
        self.handle
    }

    /// Upstream as `host:port`
    pub fn upstream(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.target, port),
            None => self.target.clone(),
        }
    }

    pub(crate) fn stamp(&mut self, generation: u64, index: usize) {
        self.handle = EntryHandle { generation, index };
    }
}

/// Snippet category, detected from content or declared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnippetCategory {
    /// Client IP allow/deny lists
    IpRestriction,
    /// Security or auth headers
    Headers,
    /// TLS settings
    Tls,
    /// Logging
    Logging,
    /// Reverse-proxy transport tweaks
    ProxyOptions,
    /// Anything else
    Other,
}

/// A named reusable config fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    /// Unique name
    pub name: String,
    /// Category
    pub category: SnippetCategory,
    /// Body text (without the surrounding braces)
    pub content: String,
    /// Where the snippet sits in the parsed text
    pub source_lines: LineRange,
    /// Category was guessed from the content
    pub auto_detected: bool,
    /// Confidence of the guess, 0.0..=1.0
    pub confidence: f32,
}

/// Result of parsing the proxy configuration text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedConfig {
    /// Site blocks in file order
    pub entries: Vec<ProxyEntry>,
    /// Snippets in file order
    pub snippets: Vec<Snippet>,
}

/// A parse of the config stamped with the generation it belongs to
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    generation: u64,
    text: String,
    entries: Vec<Arc<ProxyEntry>>,
    snippets: Vec<Snippet>,
}

impl ConfigSnapshot {
    /// Stamp every entry of `parsed` with `generation`
    pub fn new(generation: u64, text: String, parsed: ParsedConfig) -> Self {
        let entries = parsed
            .entries
            .into_iter()
            .enumerate()
            .map(|(index, mut entry)| {
                entry.stamp(generation, index);
                Arc::new(entry)
            })
            .collect();

        Self {
            generation,
            text,
            entries,
            snippets: parsed.snippets,
        }
    }

    /// Generation of this snapshot
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Raw text that was parsed
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Proxy entries in file order
    pub fn entries(&self) -> &[Arc<ProxyEntry>] {
        &self.entries
    }

    /// Snippets in file order
    pub fn snippets(&self) -> &[Snippet] {
        &self.snippets
    }

    /// Resolve a handle, rejecting handles from other generations
    pub fn get(&self, handle: EntryHandle) -> crate::Result<&Arc<ProxyEntry>> {
        if handle.generation != self.generation {
            return Err(crate::Error::StaleEntry {
                handle: handle.generation,
                current: self.generation,
            });
        }
        self.entries
            .get(handle.index)
            .ok_or_else(|| crate::Error::not_found(format!("proxy entry #{}", handle.index)))
    }

    /// Entry serving `domain`, if any
    pub fn find_domain(&self, domain: &str) -> Option<&Arc<ProxyEntry>> {
        let wanted = crate::reconcile::normalize_fqdn(domain);
        self.entries.iter().find(|entry| {
            entry
                .domains
                .iter()
                .any(|d| crate::reconcile::normalize_fqdn(d) == wanted)
        })
    }

    /// Snippet by name
    pub fn snippet(&self, name: &str) -> Option<&Snippet> {
        self.snippets.iter().find(|s| s.name == name)
    }

    /// Number of entries importing `name`
    pub fn snippet_usage(&self, name: &str) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.imports.contains(name))
            .count()
    }
}

/// Reconciliation status of one domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncStatus {
    /// Present on both sides
    Synced,
    /// DNS record without proxy route
    OrphanedDns,
    /// Proxy route without DNS record
    OrphanedProxy,
}

/// One row of reconciliation output
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledEntry {
    /// Normalized FQDN
    pub domain: String,
    /// Classification
    pub status: SyncStatus,
    /// DNS side, if present
    pub dns: Option<DnsRecord>,
    /// Proxy side, if present (shared by every domain of the block)
    pub proxy: Option<Arc<ProxyEntry>>,
}

/// A snapshot of the config file on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    /// Path of the backup file
    pub path: PathBuf,
    /// Creation time encoded in the file name
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Size in bytes
    pub size_bytes: u64,
}
