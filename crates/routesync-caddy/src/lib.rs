// # Caddy Collaborators
//
// Everything routesync needs to know about Caddy lives in this crate:
//
// - `CaddyConfigurator` parses a Caddyfile into site entries and snippets,
//   renders new blocks, and edits the file in place (append / remove).
// - `CaddyReloader` validates a Caddyfile and reloads the daemon.
// - `DockerRuntime` finds and restarts the container running Caddy.
//
// The parser is shallow: it understands top-level blocks and a
// few directives, and keeps the rest of each block as raw text. Anything it
// does not understand is preserved byte for byte on removal of other blocks.

mod parse;
mod process;

pub use parse::{MARKER, detect_category, parse_config};
pub use process::{Binaries, CaddyReloader, DockerRuntime, Invocation};

use async_trait::async_trait;
use routesync_core::model::{LineRange, ParsedConfig};
use routesync_core::reconcile::normalize_fqdn;
use routesync_core::traits::{BlockParams, ProxyConfigurator};
use routesync_core::{Error, Result};
use std::path::Path;
use tracing::debug;

/// [`ProxyConfigurator`] for Caddyfiles
#[derive(Debug, Clone, Copy, Default)]
pub struct CaddyConfigurator;

impl CaddyConfigurator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProxyConfigurator for CaddyConfigurator {
    fn parse(&self, text: &str) -> Result<ParsedConfig> {
        parse_config(text)
    }

    fn generate(&self, params: &BlockParams) -> String {
        let mut block = String::new();
        if params.marker {
            block.push_str(MARKER);
            block.push('\n');
        }
        block.push_str(&params.domains.join(", "));
        block.push_str(" {\n");

        for name in &params.imports {
            block.push_str(&format!("\timport {}\n", name));
        }
        if params.tls {
            block.push_str("\ttls internal\n");
        }
        if params.ip_restricted {
            block.push_str("\t@blocked not remote_ip private_ranges\n");
            block.push_str("\trespond @blocked 403\n");
        }

        let upstream = match params.port {
            Some(port) => format!("{}:{}", params.target, port),
            None => params.target.clone(),
        };
        if params.oauth_headers || params.web_socket {
            block.push_str(&format!("\treverse_proxy {} {{\n", upstream));
            if params.oauth_headers {
                for header in ["X-Forwarded-User", "X-Forwarded-Email"] {
                    block.push_str(&format!(
                        "\t\theader_up {header} {{http.request.header.{header}}}\n"
                    ));
                }
            }
            if params.web_socket {
                for header in ["Connection", "Upgrade"] {
                    block.push_str(&format!(
                        "\t\theader_up {header} {{http.request.header.{header}}}\n"
                    ));
                }
            }
            block.push_str("\t}\n");
        } else {
            block.push_str(&format!("\treverse_proxy {}\n", upstream));
        }

        block.push('}');
        block
    }

    fn generate_snippet(&self, name: &str, content: &str) -> String {
        let body: Vec<String> = content
            .trim_matches('\n')
            .lines()
            .map(|line| {
                let line = line.trim_end();
                if line.is_empty() {
                    String::new()
                } else {
                    format!("\t{}", line)
                }
            })
            .collect();
        format!("({}) {{\n{}\n}}", name, body.join("\n"))
    }

    async fn append(&self, path: &Path, block: &str) -> Result<()> {
        let mut text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        if !text.trim().is_empty() {
            if !text.ends_with('\n') {
                text.push('\n');
            }
            text.push('\n');
        }
        text.push_str(block.trim_end());
        text.push('\n');

        tokio::fs::write(path, text).await?;
        debug!("appended block to {}", path.display());
        Ok(())
    }

    async fn remove_entry(&self, path: &Path, domain: &str) -> Result<()> {
        let text = tokio::fs::read_to_string(path).await?;
        let parsed = parse_config(&text)?;
        let wanted = normalize_fqdn(domain);
        let entry = parsed
            .entries
            .iter()
            .find(|entry| entry.domains.iter().any(|d| normalize_fqdn(d) == wanted))
            .ok_or_else(|| Error::not_found(format!("Caddyfile block for {}", domain)))?;

        tokio::fs::write(path, remove_lines(&text, entry.source_lines)).await?;
        debug!(
            "removed block for {} (lines {}-{}) from {}",
            domain,
            entry.source_lines.start,
            entry.source_lines.end,
            path.display()
        );
        Ok(())
    }
}

/// Drop `range` from `text`, collapsing the blank line it leaves behind
fn remove_lines(text: &str, range: LineRange) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let before = &lines[..range.start.saturating_sub(1).min(lines.len())];
    let mut after = &lines[range.end.min(lines.len())..];

    let blank_before = before.last().is_none_or(|line| line.trim().is_empty());
    if blank_before && after.first().is_some_and(|line| line.trim().is_empty()) {
        after = &after[1..];
    }

    let kept: Vec<&str> = before.iter().chain(after).copied().collect();
    if kept.is_empty() {
        return String::new();
    }
    let mut out = kept.join("\n");
    out.push('\n');
    out
}
