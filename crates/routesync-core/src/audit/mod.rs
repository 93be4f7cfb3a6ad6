// # Audit Sink Implementations
//
// This module provides implementations of the AuditSink trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::FileAuditSink;
pub use memory::MemoryAuditSink;
