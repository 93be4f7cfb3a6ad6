//! Reconciliation engine
//!
//! Classifies every domain known to either side:
//!
//! ```text
//!   DNS records ──┐
//!                 ├──► union of FQDNs ──► Synced | OrphanedDns | OrphanedProxy
//!   proxy blocks ─┘
//! ```
//!
//! Pure and total: no I/O, never fails, output order unspecified.
//!
//! When one FQDN appears under several DNS records (an A and a CNAME, say),
//! the record listed last by the provider is the one reported. That is a
//! property of the upstream data, not a tie-break policy.

use crate::model::{DnsRecord, ProxyEntry, ReconciledEntry, SyncStatus};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Canonical form used to match names across the two sides
pub fn normalize_fqdn(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Classify every domain present in `dns` or `proxy`
pub fn reconcile(dns: &[DnsRecord], proxy: &[Arc<ProxyEntry>]) -> Vec<ReconciledEntry> {
    let mut dns_by_name: HashMap<String, &DnsRecord> = HashMap::with_capacity(dns.len());
    for record in dns {
        dns_by_name.insert(normalize_fqdn(&record.name), record);
    }

    let mut proxy_by_name: HashMap<String, &Arc<ProxyEntry>> = HashMap::new();
    for entry in proxy {
        for domain in &entry.domains {
            proxy_by_name
                .entry(normalize_fqdn(domain))
                .or_insert(entry);
        }
    }

    let mut domains: Vec<&String> = dns_by_name.keys().chain(proxy_by_name.keys()).collect();
    domains.sort_unstable();
    domains.dedup();

    domains
        .into_iter()
        .filter_map(|domain| {
            let record = dns_by_name.get(domain).map(|r| (*r).clone());
            let entry = proxy_by_name.get(domain).map(|e| Arc::clone(*e));
            let status = match (&record, &entry) {
                (Some(_), Some(_)) => SyncStatus::Synced,
                (Some(_), None) => SyncStatus::OrphanedDns,
                (None, Some(_)) => SyncStatus::OrphanedProxy,
                (None, None) => return None,
            };
            Some(ReconciledEntry {
                domain: domain.clone(),
                status,
                dns: record,
                proxy: entry,
            })
        })
        .collect()
}

/// Counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub synced: usize,
    pub orphaned_dns: usize,
    pub orphaned_proxy: usize,
}

impl ReconcileSummary {
    pub fn total(&self) -> usize {
        self.synced + self.orphaned_dns + self.orphaned_proxy
    }
}

/// Count entries per status
pub fn summarize(entries: &[ReconciledEntry]) -> ReconcileSummary {
    entries
        .iter()
        .fold(ReconcileSummary::default(), |mut acc, entry| {
            match entry.status {
                SyncStatus::Synced => acc.synced += 1,
                SyncStatus::OrphanedDns => acc.orphaned_dns += 1,
                SyncStatus::OrphanedProxy => acc.orphaned_proxy += 1,
            }
            acc
        })
}

/// Number of distinct proxy blocks importing each snippet
///
/// Multi-domain blocks appear once per domain in `entries` but count once.
pub fn snippet_usage(entries: &[ReconciledEntry]) -> BTreeMap<String, usize> {
    let mut seen = std::collections::HashSet::new();
    let mut usage = BTreeMap::new();
    for entry in entries.iter().filter_map(|e| e.proxy.as_ref()) {
        if !seen.insert(Arc::as_ptr(entry)) {
            continue;
        }
        for name in &entry.imports {
            *usage.entry(name.clone()).or_insert(0) += 1;
        }
    }
    usage
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RecordType, TTL_AUTO};
    use std::collections::HashSet;

    fn record(name: &str, record_type: RecordType, content: &str) -> DnsRecord {
        let mut r = DnsRecord::draft("zone", name, record_type, content);
        r.id = format!("id-{name}");
        r
    }

    fn entry(domains: &[&str]) -> Arc<ProxyEntry> {
        Arc::new(ProxyEntry::new(
            domains.iter().map(|d| d.to_string()).collect(),
            "app",
        ))
    }

    fn by_domain(entries: &[ReconciledEntry]) -> HashMap<&str, &ReconciledEntry> {
        entries.iter().map(|e| (e.domain.as_str(), e)).collect()
    }

    #[test]
    fn empty_inputs_produce_empty_output() {
        assert!(reconcile(&[], &[]).is_empty());
    }

    #[test]
    fn one_sided_domains_are_orphans_and_shared_ones_synced() {
        let dns = vec![
            record("both.x.com", RecordType::A, "1.2.3.4"),
            record("dns-only.x.com", RecordType::A, "1.2.3.4"),
        ];
        let proxy = vec![entry(&["both.x.com"]), entry(&["proxy-only.x.com"])];

        let out = reconcile(&dns, &proxy);
        assert_eq!(out.len(), 3);
        let map = by_domain(&out);

        let both = map["both.x.com"];
        assert_eq!(both.status, SyncStatus::Synced);
        assert!(both.dns.is_some() && both.proxy.is_some());

        let dns_only = map["dns-only.x.com"];
        assert_eq!(dns_only.status, SyncStatus::OrphanedDns);
        assert!(dns_only.proxy.is_none());

        let proxy_only = map["proxy-only.x.com"];
        assert_eq!(proxy_only.status, SyncStatus::OrphanedProxy);
        assert!(proxy_only.dns.is_none());
    }

    #[test]
    fn multi_domain_block_expands_sharing_one_entry() {
        let proxy = vec![entry(&["a.x.com", "b.x.com"])];
        let out = reconcile(&[], &proxy);

        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|e| e.status == SyncStatus::OrphanedProxy));
        let first = out[0].proxy.as_ref().unwrap();
        let second = out[1].proxy.as_ref().unwrap();
        assert!(Arc::ptr_eq(first, second));
        assert!(Arc::ptr_eq(first, &proxy[0]));
    }

    #[test]
    fn proxied_cname_without_block_is_orphaned_dns() {
        let cname = record("app.x.com", RecordType::Cname, "proxy.x.com")
            .with_proxied(true)
            .with_ttl(TTL_AUTO);
        let out = reconcile(&[cname.clone()], &[]);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].domain, "app.x.com");
        assert_eq!(out[0].status, SyncStatus::OrphanedDns);
        assert_eq!(out[0].dns.as_ref(), Some(&cname));
        assert!(out[0].proxy.is_none());
    }

    #[test]
    fn reconcile_is_referentially_transparent() {
        let dns = vec![
            record("a.x.com", RecordType::A, "1.1.1.1"),
            record("c.x.com", RecordType::Cname, "a.x.com"),
        ];
        let proxy = vec![entry(&["a.x.com", "b.x.com"]), entry(&["d.x.com"])];

        let first = reconcile(&dns, &proxy);
        let second = reconcile(&dns, &proxy);

        let as_set = |v: &[ReconciledEntry]| -> HashSet<(String, SyncStatus)> {
            v.iter().map(|e| (e.domain.clone(), e.status)).collect()
        };
        assert_eq!(as_set(&first), as_set(&second));
        assert_eq!(first, second);
    }

    #[test]
    fn domains_are_unique_and_matched_case_insensitively() {
        let dns = vec![record("App.X.com.", RecordType::A, "1.1.1.1")];
        let proxy = vec![entry(&["app.x.com"]), entry(&["app.x.com", "other.x.com"])];

        let out = reconcile(&dns, &proxy);
        let names: Vec<_> = out.iter().map(|e| e.domain.as_str()).collect();
        assert_eq!(names.len(), names.iter().collect::<HashSet<_>>().len());
        assert_eq!(by_domain(&out)["app.x.com"].status, SyncStatus::Synced);
    }

    #[test]
    fn summary_and_snippet_usage() {
        let mut imported = ProxyEntry::new(vec!["a.x.com".into(), "b.x.com".into()], "app");
        imported.imports.insert("auth".into());
        let proxy = vec![Arc::new(imported), entry(&["c.x.com"])];
        let dns = vec![record("a.x.com", RecordType::A, "1.1.1.1"), record("z.x.com", RecordType::A, "1.1.1.1")];

        let out = reconcile(&dns, &proxy);
        let summary = summarize(&out);
        assert_eq!(summary, ReconcileSummary { synced: 1, orphaned_dns: 1, orphaned_proxy: 2 });
        assert_eq!(summary.total(), out.len());
        assert_eq!(snippet_usage(&out).get("auth"), Some(&1));
    }
}
