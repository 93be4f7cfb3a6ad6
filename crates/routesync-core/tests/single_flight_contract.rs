//! Contract Test: Single Outstanding Saga
//!
//! Constraints verified:
//! - A mutating intent issued while one is in flight is ignored, not queued
//! - Each command posts exactly one message
//! - Applying a saga result frees the gate and refreshes reconciliation
//!
//! If this test fails, two sagas can interleave writes to the config file.

mod common;

use common::*;
use routesync_core::model::{RecordType, SyncStatus};
use routesync_core::session::{Dispatch, Intent, Message, Session};

#[tokio::test]
async fn second_intent_is_ignored_while_busy() {
    let h = Harness::new("");
    h.dns.seed("app.x.com", RecordType::Cname, "proxy.x.com");
    let mut session = Session::new(h.executor.clone());

    assert_eq!(session.dispatch(Intent::Refresh), Dispatch::Started);
    assert!(session.gate().is_busy());
    assert_eq!(session.dispatch(Intent::PruneBackups), Dispatch::Ignored);

    let envelope = session.next().await.unwrap();
    assert!(matches!(envelope.message(), Message::Refreshed(Ok(_))));
    session.apply(envelope);
    assert!(!session.gate().is_busy());

    let entry = session.latest().unwrap().entries[0].clone();
    assert_eq!(entry.status, SyncStatus::OrphanedDns);

    assert_eq!(session.dispatch(Intent::SyncToProxy(entry.clone())), Dispatch::Started);
    assert_eq!(session.dispatch(Intent::SyncToProxy(entry)), Dispatch::Ignored);

    let messages = session.settle().await;
    // The saga result, then the refresh it scheduled.
    assert_eq!(messages.len(), 2);
    match &messages[0] {
        Message::SagaFinished(result) => assert!(result.success, "{}", result.summary()),
        other => panic!("expected saga result, got {:?}", other),
    }
    assert!(matches!(messages[1], Message::Refreshed(Ok(_))));

    // Only one sync ran.
    assert_eq!(h.reloader.calls(), 1);
    assert_eq!(h.audit.len().await, 1);
    assert_eq!(
        session.latest().unwrap().entries[0].status,
        SyncStatus::Synced
    );
    assert!(!session.gate().is_busy());
}
