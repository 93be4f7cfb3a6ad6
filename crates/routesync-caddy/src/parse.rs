//! Caddyfile block scanner
//!
//! Only the top level of the file is structured here: site blocks, snippet
//! definitions `(name) { ... }` and the global options block. Directives
//! inside a site block are scanned line by line for the handful of features
//! the reconciliation view reports; everything else is kept verbatim in
//! `raw_block`.

use routesync_core::model::{LineRange, ParsedConfig, ProxyEntry, Snippet, SnippetCategory};
use routesync_core::{Error, Result};
use tracing::debug;

/// Comment line placed directly above blocks written by routesync
pub const MARKER: &str = "# Managed by routesync";

/// A top-level `header { ... }` block, 0-based inclusive line indices
#[derive(Debug)]
struct RawBlock<'a> {
    header: &'a str,
    start: usize,
    end: usize,
    body: Vec<&'a str>,
}

/// Parse Caddyfile text into site entries and snippets
pub fn parse_config(text: &str) -> Result<ParsedConfig> {
    let lines: Vec<&str> = text.lines().collect();
    let mut parsed = ParsedConfig::default();

    for block in scan_blocks(&lines)? {
        let header = block.header;
        if header.is_empty() {
            // Global options.
            continue;
        }
        if let Some(name) = header.strip_prefix('(').and_then(|h| h.strip_suffix(')')) {
            parsed.snippets.push(snippet(name.trim(), &block));
            continue;
        }
        if header.starts_with("&(") {
            debug!("skipping named route {} at line {}", header, block.start + 1);
            continue;
        }
        match site_entry(&lines, &block) {
            Some(entry) => parsed.entries.push(entry),
            None => debug!("skipping block without a host at line {}", block.start + 1),
        }
    }

    Ok(parsed)
}

fn scan_blocks<'a>(lines: &[&'a str]) -> Result<Vec<RawBlock<'a>>> {
    let mut blocks = Vec::new();
    let mut depth: i64 = 0;
    let mut open: Option<(usize, &'a str)> = None;

    for (index, &line) in lines.iter().enumerate() {
        let code = strip_comment(line);
        let (opens, closes) = count_braces(code);

        if depth == 0 {
            if opens == 0 {
                if closes > 0 {
                    return Err(unmatched(index));
                }
                continue;
            }
            let header = code.split('{').next().unwrap_or_default().trim();
            open = Some((index, header));
        }

        depth += opens - closes;
        if depth < 0 {
            return Err(unmatched(index));
        }

        if depth == 0 {
            if let Some((start, header)) = open.take() {
                let body = if start == index {
                    inline_body(code).into_iter().collect()
                } else {
                    lines[start + 1..index].to_vec()
                };
                blocks.push(RawBlock {
                    header,
                    start,
                    end: index,
                    body,
                });
            }
        }
    }

    if let Some((start, header)) = open {
        return Err(Error::invalid_input(format!(
            "Caddyfile line {}: block '{}' is never closed",
            start + 1,
            header
        )));
    }
    Ok(blocks)
}

fn unmatched(index: usize) -> Error {
    Error::invalid_input(format!("Caddyfile line {}: unmatched '}}'", index + 1))
}

/// Body of a block opened and closed on one line
fn inline_body(code: &str) -> Option<&str> {
    let open = code.find('{')?;
    let close = code.rfind('}')?;
    let body = code.get(open + 1..close)?.trim();
    (!body.is_empty()).then_some(body)
}

/// Cut a trailing comment; `#` only starts one at line start or after whitespace
fn strip_comment(line: &str) -> &str {
    let mut in_quote = false;
    let mut prev = ' ';
    for (pos, c) in line.char_indices() {
        match c {
            '"' if prev != '\\' => in_quote = !in_quote,
            '#' if !in_quote && prev.is_whitespace() => return &line[..pos],
            _ => {}
        }
        prev = c;
    }
    line
}

fn count_braces(code: &str) -> (i64, i64) {
    let mut in_quote = false;
    let mut prev = ' ';
    let (mut opens, mut closes) = (0, 0);
    for c in code.chars() {
        match c {
            '"' if prev != '\\' => in_quote = !in_quote,
            '{' if !in_quote => opens += 1,
            '}' if !in_quote => closes += 1,
            _ => {}
        }
        prev = c;
    }
    (opens, closes)
}

fn site_entry(lines: &[&str], block: &RawBlock<'_>) -> Option<ProxyEntry> {
    let domains: Vec<String> = block
        .header
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter_map(address_host)
        .collect();
    if domains.is_empty() {
        return None;
    }

    let has_marker = block.start > 0 && lines[block.start - 1].trim() == MARKER;
    let first = if has_marker { block.start - 1 } else { block.start };

    let mut entry = ProxyEntry::new(domains, "");
    entry.has_marker = has_marker;
    entry.source_lines = LineRange::new(first + 1, block.end + 1);
    entry.raw_block = lines[first..=block.end].join("\n");

    for line in &block.body {
        scan_directive(&mut entry, strip_comment(line));
    }
    Some(entry)
}

fn scan_directive(entry: &mut ProxyEntry, line: &str) {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(&directive) = tokens.first() else {
        return;
    };

    match directive {
        "reverse_proxy" if entry.target.is_empty() => {
            let upstream = tokens[1..]
                .iter()
                .find(|t| !t.starts_with(['@', '/', '*', '{']));
            if let Some(upstream) = upstream {
                let (host, port) = split_upstream(upstream);
                entry.target = host;
                entry.port = port;
            }
        }
        "tls" => entry.tls_enabled = true,
        "import" => {
            if let Some(name) = tokens.get(1) {
                entry.imports.insert((*name).to_string());
            }
        }
        "forward_auth" => entry.oauth_headers = true,
        _ => {}
    }

    if tokens.iter().any(|t| *t == "remote_ip" || *t == "client_ip") {
        entry.ip_restricted = true;
    }
    let lower = line.to_ascii_lowercase();
    if lower.contains("x-forwarded-user") || lower.contains("remote-user") {
        entry.oauth_headers = true;
    }
    if lower.contains("upgrade") {
        entry.web_socket = true;
    }
}

/// Host part of a site address, `None` for port-only addresses like `:80`
fn address_host(address: &str) -> Option<String> {
    let address = address.trim();
    let address = address
        .strip_prefix("https://")
        .or_else(|| address.strip_prefix("http://"))
        .unwrap_or(address);
    let address = address.split('/').next().unwrap_or_default();
    let (host, _) = split_host_port(address);
    (!host.is_empty()).then(|| host.to_string())
}

fn split_upstream(upstream: &str) -> (String, Option<u16>) {
    let upstream = ["http://", "https://", "h2c://"]
        .iter()
        .find_map(|scheme| upstream.strip_prefix(scheme))
        .unwrap_or(upstream);
    let (host, port) = split_host_port(upstream);
    (host.to_string(), port)
}

fn split_host_port(value: &str) -> (&str, Option<u16>) {
    if let Some(rest) = value.strip_prefix('[') {
        // [v6]:port
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').and_then(|p| p.parse().ok());
            return (host, port);
        }
    }
    match value.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse() {
            Ok(port) => (host, Some(port)),
            Err(_) => (value, None),
        },
        _ => (value, None),
    }
}

fn snippet(name: &str, block: &RawBlock<'_>) -> Snippet {
    let content = dedent(&block.body);
    let declared = block.body.iter().find_map(|line| {
        line.trim()
            .strip_prefix("# category:")
            .and_then(|c| category_by_name(c.trim()))
    });
    let (category, auto_detected, confidence) = match declared {
        Some(category) => (category, false, 1.0),
        None => {
            let (category, confidence) = detect_category(&content);
            (category, true, confidence)
        }
    };

    Snippet {
        name: name.to_string(),
        category,
        content,
        source_lines: LineRange::new(block.start + 1, block.end + 1),
        auto_detected,
        confidence,
    }
}

fn category_by_name(name: &str) -> Option<SnippetCategory> {
    Some(match name {
        "ip_restriction" => SnippetCategory::IpRestriction,
        "headers" => SnippetCategory::Headers,
        "tls" => SnippetCategory::Tls,
        "logging" => SnippetCategory::Logging,
        "proxy_options" => SnippetCategory::ProxyOptions,
        "other" => SnippetCategory::Other,
        _ => return None,
    })
}

const CATEGORY_RULES: &[(SnippetCategory, &[&str], f32)] = &[
    (SnippetCategory::IpRestriction, &["remote_ip", "client_ip"], 0.95),
    (SnippetCategory::Tls, &["tls", "protocols", "ciphers"], 0.9),
    (SnippetCategory::Headers, &["header"], 0.85),
    (SnippetCategory::Logging, &["log", "output", "format"], 0.9),
    (
        SnippetCategory::ProxyOptions,
        &["reverse_proxy", "transport", "lb_policy", "header_up", "header_down"],
        0.7,
    ),
];

/// Guess a snippet category from its directives
///
/// The category matching the most directive lines wins (earlier rules win
/// ties); confidence is the rule's base weight scaled by the share of lines
/// it matched.
pub fn detect_category(content: &str) -> (SnippetCategory, f32) {
    let directives: Vec<Vec<&str>> = content
        .lines()
        .map(|line| strip_comment(line).split_whitespace().collect::<Vec<_>>())
        .filter(|tokens| !tokens.is_empty() && tokens != &["}"])
        .collect();
    if directives.is_empty() {
        return (SnippetCategory::Other, 0.0);
    }

    let mut best = (SnippetCategory::Other, 0usize, 0.0f32);
    for (category, keywords, weight) in CATEGORY_RULES {
        let hits = directives
            .iter()
            .filter(|tokens| tokens.iter().any(|t| keywords.contains(t)))
            .count();
        if hits > best.1 {
            best = (*category, hits, *weight);
        }
    }

    let (category, hits, weight) = best;
    if hits == 0 {
        return (SnippetCategory::Other, 0.0);
    }
    (category, weight * hits as f32 / directives.len() as f32)
}

fn dedent(body: &[&str]) -> String {
    let indent = body
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    let lines: Vec<&str> = body
        .iter()
        .map(|line| line.get(indent..).unwrap_or("").trim_end())
        .collect();
    lines.join("\n").trim_matches('\n').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "{
\temail ops@x.com
}

(secure) {
\theader Strict-Transport-Security max-age=31536000
}

# Managed by routesync
app.x.com, www.x.com {
\timport secure
\ttls internal
\treverse_proxy app:8080
}

api.x.com {
\t@blocked not remote_ip private_ranges
\trespond @blocked 403
\treverse_proxy http://10.0.0.5:9000 {
\t\theader_up X-Forwarded-User {http.request.header.X-Forwarded-User}
\t\theader_up Upgrade {http.request.header.Upgrade}
\t}
}

:80 {
\trespond ok
}
";

    #[test]
    fn parses_sites_and_snippets() {
        let parsed = parse_config(SAMPLE).unwrap();
        assert_eq!(parsed.entries.len(), 2);
        assert_eq!(parsed.snippets.len(), 1);

        let app = &parsed.entries[0];
        assert_eq!(app.domains, vec!["app.x.com", "www.x.com"]);
        assert_eq!(app.target, "app");
        assert_eq!(app.port, Some(8080));
        assert!(app.tls_enabled);
        assert!(app.has_marker);
        assert!(app.imports.contains("secure"));
        assert_eq!(app.source_lines, LineRange::new(9, 14));
        assert!(app.raw_block.starts_with(MARKER));

        let api = &parsed.entries[1];
        assert_eq!(api.target, "10.0.0.5");
        assert_eq!(api.port, Some(9000));
        assert!(api.ip_restricted);
        assert!(api.oauth_headers);
        assert!(api.web_socket);
        assert!(!api.has_marker);
        assert_eq!(api.source_lines, LineRange::new(16, 23));
    }

    #[test]
    fn snippet_body_is_dedented() {
        let parsed = parse_config(SAMPLE).unwrap();
        let snippet = &parsed.snippets[0];
        assert_eq!(snippet.name, "secure");
        assert_eq!(snippet.content, "header Strict-Transport-Security max-age=31536000");
        assert_eq!(snippet.category, SnippetCategory::Headers);
        assert!(snippet.auto_detected);
        assert_eq!(snippet.source_lines, LineRange::new(5, 7));
    }

    #[test]
    fn declared_category_wins() {
        let text = "(mixed) {\n\t# category: logging\n\theader X-A 1\n}\n";
        let snippet = &parse_config(text).unwrap().snippets[0];
        assert_eq!(snippet.category, SnippetCategory::Logging);
        assert!(!snippet.auto_detected);
        assert_eq!(snippet.confidence, 1.0);
    }

    #[test]
    fn category_confidence_scales_with_share() {
        assert_eq!(
            detect_category("remote_ip 10.0.0.0/8"),
            (SnippetCategory::IpRestriction, 0.95)
        );
        let (category, confidence) = detect_category("header X-A 1\nlog");
        assert_eq!(category, SnippetCategory::Headers);
        assert!((confidence - 0.425).abs() < f32::EPSILON);
        assert_eq!(detect_category("encode gzip"), (SnippetCategory::Other, 0.0));
    }

    #[test]
    fn unbalanced_braces_are_rejected() {
        assert!(parse_config("a.x.com {\n\treverse_proxy a:1\n").is_err());
        assert!(parse_config("}\n").is_err());
    }

    #[test]
    fn quoted_and_commented_braces_are_ignored() {
        let text = "a.x.com { # trailing {\n\trespond \"}\" 200\n\treverse_proxy a:1\n}\n";
        let parsed = parse_config(text).unwrap();
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].target, "a");
    }

    #[test]
    fn one_line_block() {
        let parsed = parse_config("a.x.com { reverse_proxy a:1 }\n").unwrap();
        assert_eq!(parsed.entries[0].port, Some(1));
        assert_eq!(parsed.entries[0].source_lines, LineRange::new(1, 1));
    }

    #[test]
    fn address_forms() {
        assert_eq!(address_host("https://a.x.com:8443").as_deref(), Some("a.x.com"));
        assert_eq!(address_host("a.x.com/api").as_deref(), Some("a.x.com"));
        assert_eq!(address_host(":80"), None);
        assert_eq!(split_upstream("[::1]:8080"), ("::1".to_string(), Some(8080)));
        assert_eq!(split_upstream("unix//run/app.sock"), ("unix//run/app.sock".to_string(), None));
    }
}
