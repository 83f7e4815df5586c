use crate::session::ImpersonationSession;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Result of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Denied,
    Error,
}

/// What the caller wants recorded. The recorder fills in sequence, time and hashes.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub session_id: String,
    pub operator_id: String,
    pub target_tenant_id: String,
    pub target_user_id: Option<String>,
    pub action: String,
    pub outcome: AuditOutcome,
    pub detail: serde_json::Value,
}

impl AuditRecord {
    /// A record about `session`, with an empty detail object.
    pub fn for_session(
        session: &ImpersonationSession,
        action: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            session_id: session.id.clone(),
            operator_id: session.operator_id.clone(),
            target_tenant_id: session.target_tenant_id.clone(),
            target_user_id: session.target_user_id.clone(),
            action: action.into(),
            outcome,
            detail: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    /// Attach structured detail. Never put codes, secrets or free-text PII here.
    #[must_use]
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// One immutable, hash-chained audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    /// Monotonic, starting at 1, for gap detection.
    pub sequence: u64,
    pub session_id: String,
    pub operator_id: String,
    pub target_tenant_id: String,
    pub target_user_id: Option<String>,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub outcome: AuditOutcome,
    pub detail: serde_json::Value,
    /// Hash of the previous entry, or the genesis hash for the first.
    pub prev_hash: String,
    /// SHA-256 of this entry's canonical JSON, excluding this field.
    pub hash: String,
}

#[derive(Serialize)]
struct HashInput<'a> {
    id: &'a str,
    sequence: u64,
    session_id: &'a str,
    operator_id: &'a str,
    target_tenant_id: &'a str,
    target_user_id: Option<&'a str>,
    action: &'a str,
    timestamp: &'a DateTime<Utc>,
    outcome: AuditOutcome,
    detail: &'a serde_json::Value,
    prev_hash: &'a str,
}

impl AuditEntry {
    /// Compute the SHA-256 hash of this entry's canonical JSON.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        let input = HashInput {
            id: &self.id,
            sequence: self.sequence,
            session_id: &self.session_id,
            operator_id: &self.operator_id,
            target_tenant_id: &self.target_tenant_id,
            target_user_id: self.target_user_id.as_deref(),
            action: &self.action,
            timestamp: &self.timestamp,
            outcome: self.outcome,
            detail: &self.detail,
            prev_hash: &self.prev_hash,
        };
        let json = serde_json::to_vec(&input).unwrap_or_default();
        hex::encode(Sha256::digest(&json))
    }

    /// The stored hash matches the entry's content.
    pub fn hash_is_valid(&self) -> bool {
        self.hash == self.compute_hash()
    }
}
