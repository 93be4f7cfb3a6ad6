// # Reverse-Proxy Collaborators
//
// The core treats the proxy configuration language as a black box. It needs
// four things from it:
//
// - parse text into entries and snippets,
// - render a new site block or snippet,
// - append or remove a block in the file on disk,
// - validate the file and make the running daemon pick it up.
//
// Process control (restarting the container that runs the daemon) is a
// separate collaborator so that reload strategies can be swapped.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::model::ParsedConfig;

/// Parameters for rendering a site block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockParams {
    /// Site addresses; the first is the primary domain
    pub domains: Vec<String>,
    /// Upstream host
    pub target: String,
    /// Upstream port
    pub port: Option<u16>,
    /// Emit a `tls` directive
    pub tls: bool,
    /// Restrict access by client IP
    pub ip_restricted: bool,
    /// Forward authenticated-user headers
    pub oauth_headers: bool,
    /// Pass WebSocket upgrade headers
    pub web_socket: bool,
    /// Snippets to import
    pub imports: BTreeSet<String>,
    /// Prefix the block with the managed-by marker comment
    pub marker: bool,
}

impl BlockParams {
    /// Minimal block proxying `domain` to `target:port`
    pub fn new(domain: impl Into<String>, target: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            domains: vec![domain.into()],
            target: target.into(),
            port,
            tls: false,
            ip_restricted: false,
            oauth_headers: false,
            web_socket: false,
            imports: BTreeSet::new(),
            marker: true,
        }
    }

    /// Primary domain
    pub fn primary_domain(&self) -> Option<&str> {
        self.domains.first().map(String::as_str)
    }
}

/// Parser / generator / editor for the proxy configuration format
#[async_trait]
pub trait ProxyConfigurator: Send + Sync {
    /// Parse configuration text
    fn parse(&self, text: &str) -> Result<ParsedConfig, crate::Error>;

    /// Render a site block
    fn generate(&self, params: &BlockParams) -> String;

    /// Render a snippet definition
    fn generate_snippet(&self, name: &str, content: &str) -> String;

    /// Append a rendered block to the file at `path`
    async fn append(&self, path: &Path, block: &str) -> Result<(), crate::Error>;

    /// Remove the block serving `domain` from the file at `path`
    async fn remove_entry(&self, path: &Path, domain: &str) -> Result<(), crate::Error>;
}

/// How the running daemon is told about a new configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadMethod {
    /// Graceful reload executed inside the container
    #[default]
    Exec,
    /// Restart the container
    Restart,
    /// Daemon runs on the host; invoke its CLI directly
    Host,
}

/// Handle to a running container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    /// Container id
    pub id: String,
    /// Container name
    pub name: String,
    /// Image the container runs
    pub image: String,
}

/// Everything the reloader needs to validate and reload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadTarget {
    /// Config path on the host
    pub config_host_path: PathBuf,
    /// Config path as seen inside the container
    pub config_container_path: PathBuf,
    /// Container running the daemon (None for [`ReloadMethod::Host`])
    pub container: Option<ContainerHandle>,
    /// Reload strategy
    pub method: ReloadMethod,
}

/// Syntax-checks the configuration and triggers a live reload, as one unit
///
/// A rejected configuration is reported as
/// [`Error::Validation`](crate::Error::Validation); a failed reload as
/// [`Error::Reload`](crate::Error::Reload).
#[async_trait]
pub trait ProxyReloader: Send + Sync {
    async fn validate_and_reload(&self, target: &ReloadTarget) -> Result<(), crate::Error>;
}

/// Process/container control
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Restart a container
    async fn restart(&self, handle: &ContainerHandle) -> Result<(), crate::Error>;

    /// Running containers, optionally only those started from `image`
    async fn list_running(&self, image: Option<&str>) -> Result<Vec<ContainerHandle>, crate::Error>;
}
