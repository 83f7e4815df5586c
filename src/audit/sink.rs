use super::entry::AuditEntry;
use crate::error::{ImpersonationError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Durable, append-only storage for audit entries.
///
/// Entries are never updated or deleted.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist an entry. Must not return `Ok` unless the entry is durable.
    async fn append(&self, entry: &AuditEntry) -> Result<()>;

    /// The entry with the highest sequence, used to resume the chain.
    async fn last_entry(&self) -> Result<Option<AuditEntry>>;

    /// Entries for one session, in sequence order.
    async fn entries_for_session(&self, session_id: &str) -> Result<Vec<AuditEntry>>;

    /// Most recent entries for an operator, newest first.
    async fn entries_for_operator(&self, operator_id: &str, limit: usize)
        -> Result<Vec<AuditEntry>>;

    /// Every entry, in sequence order.
    async fn all_entries(&self) -> Result<Vec<AuditEntry>>;
}

/// In-memory audit sink.
///
/// `set_available(false)` makes appends fail, for exercising fail-closed
/// behavior. `set_rejected_action` fails only entries with one action.
#[derive(Clone)]
pub struct InMemoryAuditSink {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
    available: Arc<AtomicBool>,
    rejected_action: Arc<RwLock<Option<String>>>,
}

impl Default for InMemoryAuditSink {
    fn default() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            available: Arc::new(AtomicBool::new(true)),
            rejected_action: Arc::new(RwLock::new(None)),
        }
    }
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn set_rejected_action(&self, action: Option<&str>) {
        *self.rejected_action.write().await = action.map(str::to_string);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, entry: &AuditEntry) -> Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(ImpersonationError::storage("audit sink unavailable"));
        }
        if self.rejected_action.read().await.as_deref() == Some(entry.action.as_str()) {
            return Err(ImpersonationError::storage(format!(
                "audit sink rejected {}",
                entry.action
            )));
        }

        let mut entries = self.entries.write().await;
        let expected = entries.last().map_or(1, |last| last.sequence + 1);
        if entry.sequence != expected {
            return Err(ImpersonationError::storage(format!(
                "out-of-order audit sequence {} (expected {expected})",
                entry.sequence
            )));
        }
        entries.push(entry.clone());
        Ok(())
    }

    async fn last_entry(&self) -> Result<Option<AuditEntry>> {
        Ok(self.entries.read().await.last().cloned())
    }

    async fn entries_for_session(&self, session_id: &str) -> Result<Vec<AuditEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn entries_for_operator(
        &self,
        operator_id: &str,
        limit: usize,
    ) -> Result<Vec<AuditEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .rev()
            .filter(|e| e.operator_id == operator_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn all_entries(&self) -> Result<Vec<AuditEntry>> {
        Ok(self.entries.read().await.clone())
    }
}
