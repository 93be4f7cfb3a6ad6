//! Cooperative update loop
//!
//! The presentation layer turns user input into [`Intent`]s and hands them to
//! [`Session::dispatch`]. A mutating intent is only started when the
//! [`SagaGate`] is free; while a saga is in flight further intents are
//! ignored, not queued. Each started command runs on its own tokio task and
//! posts exactly one [`Envelope`] back. [`Session::apply`] frees the gate and,
//! after a saga, schedules a refresh so the reconciliation input is rebuilt
//! from the rewritten config.
//!
//! ```text
//!  dispatch(intent) ──► gate free? ──no──► Ignored
//!                          │yes
//!                          ▼
//!                   spawn(run intent) ──► mpsc ──► next() ──► apply()
//!                                                               │
//!                                               saga finished ──┴──► dispatch(Refresh)
//! ```

pub mod gate;

pub use gate::{SagaGate, SagaLease};

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::backup::CleanupReport;
use crate::error::Result;
use crate::model::ReconciledEntry;
use crate::saga::{
    DeleteRequest, EntryRequest, Reconciliation, SagaExecutor, SagaOutcome, SagaResult,
    UpdateRequest,
};

/// A user request
#[derive(Debug, Clone)]
pub enum Intent {
    /// Re-list DNS, re-parse the config and reconcile
    Refresh,
    CreateEntry(EntryRequest),
    UpdateEntry {
        current: ReconciledEntry,
        request: UpdateRequest,
    },
    DeleteEntry {
        current: ReconciledEntry,
        request: DeleteRequest,
    },
    SyncToProxy(ReconciledEntry),
    SyncToDns(ReconciledEntry),
    BatchDelete {
        entries: Vec<ReconciledEntry>,
        request: DeleteRequest,
    },
    BatchSync(Vec<ReconciledEntry>),
    CreateSnippet {
        name: String,
        content: String,
    },
    UpdateSnippet {
        name: String,
        content: String,
    },
    DeleteSnippet {
        name: String,
    },
    /// Run the configured retention policies
    PruneBackups,
}

/// Result posted back by a finished command
#[derive(Debug)]
pub enum Message {
    Refreshed(Result<Reconciliation>),
    SagaFinished(SagaResult),
    Pruned(Result<CleanupReport>),
}

/// Message plus the lease of the command that produced it
#[derive(Debug)]
pub struct Envelope {
    message: Message,
    lease: SagaLease,
}

impl Envelope {
    /// The posted message
    pub fn message(&self) -> &Message {
        &self.message
    }
}

/// What [`Session::dispatch`] did with an intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A command was spawned
    Started,
    /// A saga was already in flight
    Ignored,
}

/// One running instance's update loop
pub struct Session {
    executor: Arc<SagaExecutor>,
    gate: SagaGate,
    tx: mpsc::Sender<Envelope>,
    rx: mpsc::Receiver<Envelope>,
    latest: Option<Reconciliation>,
}

impl Session {
    /// Create a session around an executor
    pub fn new(executor: Arc<SagaExecutor>) -> Self {
        // One command in flight at a time, so one slot is enough.
        let (tx, rx) = mpsc::channel(1);
        Self {
            executor,
            gate: SagaGate::new(),
            tx,
            rx,
            latest: None,
        }
    }

    /// The gate, visible for inspection
    pub fn gate(&self) -> &SagaGate {
        &self.gate
    }

    /// Executor driven by this session
    pub fn executor(&self) -> &Arc<SagaExecutor> {
        &self.executor
    }

    /// Last successful reconciliation
    pub fn latest(&self) -> Option<&Reconciliation> {
        self.latest.as_ref()
    }

    /// Start `intent` unless a command is already in flight
    pub fn dispatch(&self, intent: Intent) -> Dispatch {
        let Some(lease) = self.gate.try_acquire() else {
            debug!("Saga in flight, ignoring {}", intent_name(&intent));
            return Dispatch::Ignored;
        };

        let executor = Arc::clone(&self.executor);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let message = run_intent(&executor, &lease, intent).await;
            if tx.send(Envelope { message, lease }).await.is_err() {
                warn!("Session closed before the command result was delivered");
            }
        });
        Dispatch::Started
    }

    /// Wait for the next posted result
    pub async fn next(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Apply a posted result: free the gate, keep reconciliation current
    pub fn apply(&mut self, envelope: Envelope) -> Message {
        let Envelope { message, lease } = envelope;
        drop(lease);

        match &message {
            Message::Refreshed(Ok(reconciliation)) => {
                self.latest = Some(reconciliation.clone());
            }
            Message::Refreshed(Err(e)) => warn!("Refresh failed: {}", e),
            Message::SagaFinished(result) => {
                report(result);
                self.dispatch(Intent::Refresh);
            }
            Message::Pruned(Ok(report)) => {
                debug!("Pruned {} backup file(s)", report.removed.len());
            }
            Message::Pruned(Err(e)) => warn!("Backup pruning failed: {}", e),
        }
        message
    }

    /// Apply results until no command is in flight
    pub async fn settle(&mut self) -> Vec<Message> {
        let mut applied = Vec::new();
        while self.gate.is_busy() {
            let Some(envelope) = self.next().await else {
                break;
            };
            applied.push(self.apply(envelope));
        }
        applied
    }
}

async fn run_intent(executor: &SagaExecutor, lease: &SagaLease, intent: Intent) -> Message {
    match intent {
        Intent::Refresh => Message::Refreshed(executor.refresh().await),
        Intent::PruneBackups => Message::Pruned(executor.prune_backups(lease).await),
        Intent::CreateEntry(request) => {
            Message::SagaFinished(executor.create_entry(lease, request).await)
        }
        Intent::UpdateEntry { current, request } => {
            Message::SagaFinished(executor.update_entry(lease, &current, request).await)
        }
        Intent::DeleteEntry { current, request } => {
            Message::SagaFinished(executor.delete_entry(lease, &current, request).await)
        }
        Intent::SyncToProxy(entry) => {
            Message::SagaFinished(executor.sync_to_proxy(lease, &entry).await)
        }
        Intent::SyncToDns(entry) => Message::SagaFinished(executor.sync_to_dns(lease, &entry).await),
        Intent::BatchDelete { entries, request } => {
            Message::SagaFinished(executor.batch_delete(lease, &entries, request).await)
        }
        Intent::BatchSync(entries) => {
            Message::SagaFinished(executor.batch_sync(lease, &entries).await)
        }
        Intent::CreateSnippet { name, content } => {
            Message::SagaFinished(executor.create_snippet(lease, &name, &content).await)
        }
        Intent::UpdateSnippet { name, content } => {
            Message::SagaFinished(executor.update_snippet(lease, &name, &content).await)
        }
        Intent::DeleteSnippet { name } => {
            Message::SagaFinished(executor.delete_snippet(lease, &name).await)
        }
    }
}

fn report(result: &SagaResult) {
    match result.outcome {
        SagaOutcome::Succeeded => info!("{}", result.summary()),
        SagaOutcome::Critical => error!("{}", result.summary()),
        _ => warn!("{}", result.summary()),
    }
}

fn intent_name(intent: &Intent) -> &'static str {
    match intent {
        Intent::Refresh => "refresh",
        Intent::CreateEntry(_) => "create entry",
        Intent::UpdateEntry { .. } => "update entry",
        Intent::DeleteEntry { .. } => "delete entry",
        Intent::SyncToProxy(_) => "sync to proxy",
        Intent::SyncToDns(_) => "sync to DNS",
        Intent::BatchDelete { .. } => "batch delete",
        Intent::BatchSync(_) => "batch sync",
        Intent::CreateSnippet { .. } => "create snippet",
        Intent::UpdateSnippet { .. } => "update snippet",
        Intent::DeleteSnippet { .. } => "delete snippet",
        Intent::PruneBackups => "prune backups",
    }
}
