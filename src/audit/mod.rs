//! Tamper-evident audit trail for impersonation.
//!
//! Every session transition, every step-up attempt, and every gate decision
//! made for a presented session is written here before the caller is allowed
//! to proceed. Entries form a SHA-256 hash chain with gap-detectable sequence
//! numbers; [`AuditRecorder::verify`] replays it.

pub mod actions;
mod entry;
mod recorder;
mod sink;

pub use entry::{AuditEntry, AuditOutcome, AuditRecord};
pub use recorder::{AuditRecorder, ChainVerification, GENESIS_HASH};
pub use sink::{AuditSink, InMemoryAuditSink};
