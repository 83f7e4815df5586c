use super::entry::{AuditEntry, AuditRecord};
use super::sink::AuditSink;
use crate::clock::Clock;
use crate::error::{ImpersonationError, Result};
use std::sync::Arc;
use tokio::sync::Mutex;

/// `prev_hash` of the first entry in a log.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Result of verifying the audit hash chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    /// Total entries verified.
    pub total_entries: u64,
    /// Every hash matches its content and its successor's `prev_hash`.
    pub chain_intact: bool,
    /// Sequence of the first entry where the chain breaks.
    pub first_break_at: Option<u64>,
    /// Missing sequence numbers (gap detection).
    pub missing_sequences: Vec<u64>,
}

impl ChainVerification {
    pub fn is_valid(&self) -> bool {
        self.chain_intact && self.missing_sequences.is_empty()
    }
}

#[derive(Clone)]
struct ChainHead {
    sequence: u64,
    hash: String,
}

struct Inner {
    sink: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    head: Mutex<Option<ChainHead>>,
}

/// Writes hash-chained audit entries and refuses to let callers proceed
/// when the sink is unavailable.
///
/// Clones share one chain head, so every writer in a process appends to the
/// same chain.
#[derive(Clone)]
pub struct AuditRecorder {
    inner: Arc<Inner>,
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                sink,
                clock,
                head: Mutex::new(None),
            }),
        }
    }

    /// Append an entry and return it once the sink has accepted it.
    ///
    /// Any sink failure becomes [`ImpersonationError::AuditUnavailable`]; the
    /// caller must treat the triggering action as not having happened.
    pub async fn record(&self, record: AuditRecord) -> Result<AuditEntry> {
        let mut head = self.inner.head.lock().await;

        let current = match head.as_ref() {
            Some(current) => current.clone(),
            None => self.load_head().await?,
        };

        let mut entry = AuditEntry {
            id: uuid::Uuid::new_v4().to_string(),
            sequence: current.sequence + 1,
            session_id: record.session_id,
            operator_id: record.operator_id,
            target_tenant_id: record.target_tenant_id,
            target_user_id: record.target_user_id,
            action: record.action,
            timestamp: self.inner.clock.now(),
            outcome: record.outcome,
            detail: record.detail,
            prev_hash: current.hash,
            hash: String::new(),
        };
        entry.hash = entry.compute_hash();

        if let Err(e) = self.inner.sink.append(&entry).await {
            // Reload from the sink next time; a failed append may still have landed.
            *head = None;
            tracing::error!(
                target: "impersonation.audit.unavailable",
                session_id = %entry.session_id,
                action = %entry.action,
                error = %e,
                "Audit write failed"
            );
            return Err(ImpersonationError::audit_unavailable(e.to_string()));
        }

        *head = Some(ChainHead {
            sequence: entry.sequence,
            hash: entry.hash.clone(),
        });
        Ok(entry)
    }

    async fn load_head(&self) -> Result<ChainHead> {
        let last = self
            .inner
            .sink
            .last_entry()
            .await
            .map_err(|e| ImpersonationError::audit_unavailable(e.to_string()))?;
        Ok(match last {
            Some(entry) => ChainHead {
                sequence: entry.sequence,
                hash: entry.hash,
            },
            None => ChainHead {
                sequence: 0,
                hash: GENESIS_HASH.to_string(),
            },
        })
    }

    /// Entries for a session, in order.
    pub async fn entries_for_session(&self, session_id: &str) -> Result<Vec<AuditEntry>> {
        self.inner.sink.entries_for_session(session_id).await
    }

    /// Most recent entries for an operator, newest first.
    pub async fn entries_for_operator(
        &self,
        operator_id: &str,
        limit: usize,
    ) -> Result<Vec<AuditEntry>> {
        self.inner.sink.entries_for_operator(operator_id, limit).await
    }

    /// Verify the whole stored chain from genesis.
    pub async fn verify(&self) -> Result<ChainVerification> {
        let entries = self.inner.sink.all_entries().await?;
        Ok(Self::verify_chain(&entries, GENESIS_HASH))
    }

    /// Verify a run of entries in sequence order.
    ///
    /// `expected_prev_hash` is what the first entry's `prev_hash` should be
    /// (`GENESIS_HASH` for a log verified from the beginning).
    #[must_use]
    pub fn verify_chain(entries: &[AuditEntry], expected_prev_hash: &str) -> ChainVerification {
        let mut chain_intact = true;
        let mut first_break_at = None;
        let mut missing_sequences = Vec::new();
        let mut prev_hash = expected_prev_hash;
        let mut expected_sequence = if expected_prev_hash == GENESIS_HASH {
            Some(1)
        } else {
            entries.first().map(|e| e.sequence)
        };

        for entry in entries {
            if let Some(expected) = expected_sequence {
                if entry.sequence > expected {
                    missing_sequences.extend(expected..entry.sequence);
                }
            }

            if (entry.prev_hash != prev_hash || !entry.hash_is_valid()) && first_break_at.is_none() {
                chain_intact = false;
                first_break_at = Some(entry.sequence);
            }

            prev_hash = &entry.hash;
            expected_sequence = Some(entry.sequence + 1);
        }

        ChainVerification {
            total_entries: entries.len() as u64,
            chain_intact,
            first_break_at,
            missing_sequences,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditOutcome, InMemoryAuditSink, actions};
    use crate::clock::ManualClock;

    fn record(session: &str, action: &str) -> AuditRecord {
        AuditRecord {
            session_id: session.to_string(),
            operator_id: "op-1".to_string(),
            target_tenant_id: "t-1".to_string(),
            target_user_id: Some("u-1".to_string()),
            action: action.to_string(),
            outcome: AuditOutcome::Success,
            detail: serde_json::json!({"duration_minutes": 30}),
        }
    }

    async fn recorder_with_entries(n: usize) -> (AuditRecorder, InMemoryAuditSink) {
        let sink = InMemoryAuditSink::new();
        let recorder = AuditRecorder::new(Arc::new(sink.clone()), Arc::new(ManualClock::default()));
        for i in 0..n {
            recorder
                .record(record(&format!("imp_{i}"), actions::session::REQUESTED))
                .await
                .unwrap();
        }
        (recorder, sink)
    }

    #[tokio::test]
    async fn test_chain_links_entries() {
        let (recorder, sink) = recorder_with_entries(3).await;
        let entries = sink.all_entries().await.unwrap();

        assert_eq!(entries[0].prev_hash, GENESIS_HASH);
        assert_eq!(entries[1].prev_hash, entries[0].hash);
        assert_eq!(
            entries.iter().map(|e| e.sequence).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(recorder.verify().await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn test_verify_detects_modification() {
        let (_, sink) = recorder_with_entries(3).await;
        let mut entries = sink.all_entries().await.unwrap();
        entries[1].outcome = AuditOutcome::Denied;

        let result = AuditRecorder::verify_chain(&entries, GENESIS_HASH);
        assert!(!result.chain_intact);
        assert_eq!(result.first_break_at, Some(2));
    }

    #[tokio::test]
    async fn test_verify_detects_deletion_and_reordering() {
        let (_, sink) = recorder_with_entries(4).await;
        let entries = sink.all_entries().await.unwrap();

        let deleted = vec![entries[0].clone(), entries[2].clone(), entries[3].clone()];
        let result = AuditRecorder::verify_chain(&deleted, GENESIS_HASH);
        assert!(!result.is_valid());
        assert_eq!(result.missing_sequences, vec![2]);
        assert_eq!(result.first_break_at, Some(3));

        let reordered = vec![
            entries[0].clone(),
            entries[2].clone(),
            entries[1].clone(),
            entries[3].clone(),
        ];
        assert!(!AuditRecorder::verify_chain(&reordered, GENESIS_HASH).chain_intact);
    }

    #[tokio::test]
    async fn test_sink_failure_is_audit_unavailable() {
        let (recorder, sink) = recorder_with_entries(1).await;
        sink.set_available(false);

        let result = recorder.record(record("imp_x", actions::session::ACTIVATED)).await;
        assert!(matches!(result, Err(ImpersonationError::AuditUnavailable(_))));

        sink.set_available(true);
        let entry = recorder
            .record(record("imp_x", actions::session::ACTIVATED))
            .await
            .unwrap();
        assert_eq!(entry.sequence, 2);
        assert!(recorder.verify().await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn test_new_recorder_resumes_chain() {
        let (_, sink) = recorder_with_entries(2).await;
        let resumed = AuditRecorder::new(Arc::new(sink.clone()), Arc::new(ManualClock::default()));
        let entry = resumed
            .record(record("imp_y", actions::session::ENDED))
            .await
            .unwrap();

        assert_eq!(entry.sequence, 3);
        assert!(resumed.verify().await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn test_queries() {
        let (recorder, _) = recorder_with_entries(3).await;
        assert_eq!(recorder.entries_for_session("imp_1").await.unwrap().len(), 1);

        let recent = recorder.entries_for_operator("op-1", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].sequence, 3);
    }
}
