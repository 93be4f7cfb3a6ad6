//! Step table for one user-level operation
//!
//! A [`Plan`] is an ordered list of [`Step`]s. The first
//! [`Action::ValidateAndReload`] step is the commit boundary: everything up
//! to and including it is compensable, everything after it is not.

use std::fmt;

use crate::model::DnsRecord;
use crate::traits::EntityType;

/// What a step does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Snapshot the proxy config file; compensated by restoring it
    BackupConfig,
    /// Create a DNS record; compensated by deleting it
    CreateDnsRecord(DnsRecord),
    /// Update a DNS record; compensated by writing `previous` back
    UpdateDnsRecord {
        /// Record as it was before the step
        previous: DnsRecord,
        /// Record as it should be after the step
        desired: DnsRecord,
    },
    /// Delete a DNS record; never compensated
    DeleteDnsRecord(DnsRecord),
    /// Append a block to the proxy config
    AppendProxyBlock(String),
    /// Remove the proxy block serving a domain
    RemoveProxyBlock(String),
    /// Replace the whole proxy config text
    WriteConfig(String),
    /// Validate the config and reload the daemon as one unit
    ValidateAndReload,
}

impl Action {
    /// True for actions that change the proxy config file
    pub fn writes_config(&self) -> bool {
        matches!(
            self,
            Self::AppendProxyBlock(_) | Self::RemoveProxyBlock(_) | Self::WriteConfig(_)
        )
    }

    /// True for actions that call the DNS provider
    pub fn touches_dns(&self) -> bool {
        matches!(
            self,
            Self::CreateDnsRecord(_) | Self::UpdateDnsRecord { .. } | Self::DeleteDnsRecord(_)
        )
    }
}

/// One named step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Name reported when the step fails
    pub name: String,
    /// What the step does
    pub action: Action,
    /// Batch item the step belongs to; `None` for shared steps
    pub item: Option<usize>,
}

impl Step {
    /// Step shared by the whole operation
    pub fn shared(name: impl Into<String>, action: Action) -> Self {
        Self {
            name: name.into(),
            action,
            item: None,
        }
    }

    /// Step belonging to batch item `item`
    pub fn for_item(item: usize, name: impl Into<String>, action: Action) -> Self {
        Self {
            name: name.into(),
            action,
            item: Some(item),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Ordered steps of one user-level operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Operation name used for audit and logs
    pub operation: &'static str,
    /// Steps in execution order
    pub steps: Vec<Step>,
    /// Domains the operation is about
    pub affected_domains: Vec<String>,
    /// Number of batch items (1 for single-entry operations)
    pub total_items: usize,
}

impl Plan {
    /// Empty plan for a single-entry operation
    pub fn new(operation: &'static str, domain: impl Into<String>) -> Self {
        Self {
            operation,
            steps: Vec::new(),
            affected_domains: vec![domain.into()],
            total_items: 1,
        }
    }

    /// Empty plan for a batch operation
    pub fn batch(operation: &'static str, domains: Vec<String>) -> Self {
        Self {
            operation,
            total_items: domains.len(),
            affected_domains: domains,
            steps: Vec::new(),
        }
    }

    /// Append a step
    pub fn push(&mut self, step: Step) -> &mut Self {
        self.steps.push(step);
        self
    }

    /// Index of the commit boundary step, if the plan touches the proxy
    pub fn commit_index(&self) -> Option<usize> {
        self.steps
            .iter()
            .position(|s| s.action == Action::ValidateAndReload)
    }

    /// True when some step writes the proxy config
    pub fn touches_proxy(&self) -> bool {
        self.steps.iter().any(|s| s.action.writes_config())
    }

    /// True when some step calls the DNS provider
    pub fn touches_dns(&self) -> bool {
        self.steps.iter().any(|s| s.action.touches_dns())
    }

    /// Audit entity derived from the sides the plan touches
    pub fn entity_type(&self) -> Option<EntityType> {
        EntityType::from_sides(self.touches_dns(), self.touches_proxy())
    }

    /// First affected domain, used as the audit representative
    pub fn primary_domain(&self) -> &str {
        self.affected_domains
            .first()
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// True when the plan has nothing to do
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
