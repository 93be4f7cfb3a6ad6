//! Contract Test: Update Entry Saga
//!
//! Constraints verified:
//! - DNS and proxy changes commit together
//! - A failure before the reload reverts the DNS update and restores the file
//! - Unchanged sides are skipped
//! - Handles parsed before a rewrite are refused

mod common;

use common::*;
use routesync_core::ErrorKind;
use routesync_core::model::RecordType;
use routesync_core::saga::{DeleteRequest, DnsSettings, SagaOutcome, UpdateRequest};
use routesync_core::traits::{AuditSink, BlockParams};

fn dns(content: &str) -> DnsSettings {
    DnsSettings {
        record_type: RecordType::A,
        content: content.into(),
        proxied: true,
        ttl: 1,
    }
}

#[tokio::test]
async fn update_changes_both_sides() {
    let h = Harness::new(SITE_A);
    h.dns.seed("a.x.com", RecordType::A, "203.0.113.7");
    let entry = h.entry("a.x.com").await;
    let lease = h.gate.try_acquire().unwrap();

    let request = UpdateRequest {
        block: Some(BlockParams::new("a.x.com", "app-v2", Some(9000))),
        dns: Some(dns("203.0.113.8")),
    };
    let result = h.executor.update_entry(&lease, &entry, request).await;

    assert!(result.success, "{}", result.summary());
    assert_eq!(h.dns.get("a.x.com").unwrap().content, "203.0.113.8");
    assert!(h.text().contains("reverse_proxy app-v2:9000"));
    assert!(!h.text().contains("app:8080"));
    assert_eq!(h.reloader.calls(), 1);
}

#[tokio::test]
async fn reload_failure_reverts_dns_update() {
    let h = Harness::new(SITE_A);
    let original = h.dns.seed("a.x.com", RecordType::A, "203.0.113.7");
    let entry = h.entry("a.x.com").await;
    h.reloader.fail_with(ReloadFailure::Validation);
    let lease = h.gate.try_acquire().unwrap();

    let request = UpdateRequest {
        block: Some(BlockParams::new("a.x.com", "app-v2", None)),
        dns: Some(dns("203.0.113.8")),
    };
    let result = h.executor.update_entry(&lease, &entry, request).await;

    assert_eq!(result.outcome, SagaOutcome::RolledBack);
    assert_eq!(h.dns.update_calls(), 2);
    assert_eq!(h.dns.get("a.x.com").unwrap(), original);
    assert_eq!(h.text(), SITE_A);
}

#[tokio::test]
async fn unchanged_dns_is_not_sent() {
    let h = Harness::new(SITE_A);
    h.dns.seed("a.x.com", RecordType::A, "203.0.113.7");
    let entry = h.entry("a.x.com").await;
    let lease = h.gate.try_acquire().unwrap();

    let request = UpdateRequest {
        block: None,
        dns: Some(dns("203.0.113.7")),
    };
    let result = h.executor.update_entry(&lease, &entry, request).await;

    assert!(result.success);
    assert_eq!(h.dns.update_calls(), 0);
    assert_eq!(h.backup_count().await, 0);
    assert_eq!(h.audit.load_logs().await.unwrap().len(), 1);
}

#[tokio::test]
async fn dns_only_update_needs_no_reload() {
    let h = Harness::new(SITE_A);
    h.dns.seed("a.x.com", RecordType::A, "203.0.113.7");
    let entry = h.entry("a.x.com").await;
    let lease = h.gate.try_acquire().unwrap();

    let request = UpdateRequest {
        block: None,
        dns: Some(dns("198.51.100.1")),
    };
    let result = h.executor.update_entry(&lease, &entry, request).await;

    assert!(result.success);
    assert_eq!(h.reloader.calls(), 0);
    assert_eq!(h.dns.get("a.x.com").unwrap().content, "198.51.100.1");
}

#[tokio::test]
async fn stale_handle_is_refused_after_rewrite() {
    let two_sites = format!("{SITE_A}\nb.x.com {{\n\treverse_proxy b:80\n}}\n");
    let h = Harness::new(&two_sites);
    let stale_b = h.entry("b.x.com").await;
    let a = h.entry("a.x.com").await;
    let lease = h.gate.try_acquire().unwrap();

    // Rewrites the file and bumps the generation.
    let deleted = h.executor.delete_entry(&lease, &a, DeleteRequest::both()).await;
    assert!(deleted.success);

    let request = UpdateRequest {
        block: Some(BlockParams::new("b.x.com", "b", Some(81))),
        dns: None,
    };
    let result = h.executor.update_entry(&lease, &stale_b, request).await;

    assert!(!result.success);
    let cause = result.cause.as_ref().unwrap();
    assert!(matches!(cause, routesync_core::Error::StaleEntry { .. }));
    assert_eq!(cause.kind(), ErrorKind::InvalidInput);
    assert!(h.text().contains("reverse_proxy b:80"));

    // A fresh handle works.
    let fresh_b = h.entry("b.x.com").await;
    let request = UpdateRequest {
        block: Some(BlockParams::new("b.x.com", "b", Some(81))),
        dns: None,
    };
    assert!(h.executor.update_entry(&lease, &fresh_b, request).await.success);
    assert!(h.text().contains("reverse_proxy b:81"));
}

#[tokio::test]
async fn updating_missing_side_is_invalid() {
    let h = Harness::new(SITE_A);
    let entry = h.entry("a.x.com").await;
    let lease = h.gate.try_acquire().unwrap();

    let request = UpdateRequest {
        block: None,
        dns: Some(dns("203.0.113.8")),
    };
    let result = h.executor.update_entry(&lease, &entry, request).await;

    assert_eq!(result.outcome, SagaOutcome::Failed);
    assert_eq!(result.cause.as_ref().unwrap().kind(), ErrorKind::InvalidInput);
}
