//! Single-flight gate
//!
//! At most one saga may be outstanding per running instance. The gate is
//! explicit state: taking it yields a [`SagaLease`], every mutating executor
//! operation demands one, and dropping the lease frees the gate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Busy/free flag guarding the config file
#[derive(Debug, Clone, Default)]
pub struct SagaGate {
    busy: Arc<AtomicBool>,
}

impl SagaGate {
    /// Create a free gate
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the gate, or `None` if a saga is already in flight
    pub fn try_acquire(&self) -> Option<SagaLease> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SagaLease {
                busy: Arc::clone(&self.busy),
            })
    }

    /// True while a lease is held
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Proof that the holder owns the gate; frees it on drop
#[derive(Debug)]
pub struct SagaLease {
    busy: Arc<AtomicBool>,
}

impl Drop for SagaLease {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
