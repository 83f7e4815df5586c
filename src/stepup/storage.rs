//! Operator second-factor storage.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;

/// Trait for reading an operator's second-factor enrollment.
///
/// Implement this for your database layer. Backup codes are stored as
/// digests (see [`hash_backup_code`](super::hash_backup_code)), never plain.
///
/// # Example
///
/// ```rust,ignore
/// use gangway::stepup::SecondFactorStore;
/// use async_trait::async_trait;
///
/// struct PgSecondFactors {
///     pool: PgPool,
/// }
///
/// #[async_trait]
/// impl SecondFactorStore for PgSecondFactors {
///     async fn get_totp_secret(&self, operator_id: &str) -> Result<Option<String>> {
///         // SELECT totp_secret FROM operator_mfa WHERE operator_id = $1
///     }
///
///     // ... implement other methods
/// }
/// ```
#[async_trait]
pub trait SecondFactorStore: Send + Sync {
    /// Get the TOTP secret for an operator (None if not enrolled).
    async fn get_totp_secret(&self, operator_id: &str) -> Result<Option<String>>;

    /// Record that a TOTP time step was used.
    ///
    /// Returns `false` if `step` is not newer than the last accepted step,
    /// which means the code is a replay. Must be atomic per operator.
    async fn record_totp_step(&self, operator_id: &str, step: u64) -> Result<bool>;

    /// Remove the backup code with this digest.
    ///
    /// Returns `true` only if the digest was present. Must be atomic so a
    /// code cannot be spent twice.
    async fn consume_backup_code(&self, operator_id: &str, code_hash: &str) -> Result<bool>;

    /// Get count of remaining backup codes.
    async fn backup_codes_remaining(&self, operator_id: &str) -> Result<usize>;
}

#[derive(Default)]
struct Enrollment {
    totp_secret: Option<String>,
    last_totp_step: Option<u64>,
    backup_hashes: Vec<String>,
}

/// In-memory second-factor store for development and tests.
#[derive(Clone, Default)]
pub struct InMemorySecondFactorStore {
    operators: Arc<RwLock<HashMap<String, Enrollment>>>,
}

impl InMemorySecondFactorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enroll an operator's TOTP secret.
    pub async fn set_totp_secret(&self, operator_id: &str, secret: impl Into<String>) {
        let mut operators = self.operators.write().await;
        let enrollment = operators.entry(operator_id.to_string()).or_default();
        enrollment.totp_secret = Some(secret.into());
        enrollment.last_totp_step = None;
    }

    /// Replace an operator's backup code digests.
    pub async fn set_backup_codes(&self, operator_id: &str, hashes: Vec<String>) {
        self.operators
            .write()
            .await
            .entry(operator_id.to_string())
            .or_default()
            .backup_hashes = hashes;
    }
}

#[async_trait]
impl SecondFactorStore for InMemorySecondFactorStore {
    async fn get_totp_secret(&self, operator_id: &str) -> Result<Option<String>> {
        Ok(self
            .operators
            .read()
            .await
            .get(operator_id)
            .and_then(|e| e.totp_secret.clone()))
    }

    async fn record_totp_step(&self, operator_id: &str, step: u64) -> Result<bool> {
        let mut operators = self.operators.write().await;
        let enrollment = operators.entry(operator_id.to_string()).or_default();
        if enrollment.last_totp_step.is_some_and(|last| step <= last) {
            return Ok(false);
        }
        enrollment.last_totp_step = Some(step);
        Ok(true)
    }

    async fn consume_backup_code(&self, operator_id: &str, code_hash: &str) -> Result<bool> {
        let mut operators = self.operators.write().await;
        let Some(enrollment) = operators.get_mut(operator_id) else {
            return Ok(false);
        };

        let mut found = None;
        for (idx, stored) in enrollment.backup_hashes.iter().enumerate() {
            if bool::from(stored.as_bytes().ct_eq(code_hash.as_bytes())) && found.is_none() {
                found = Some(idx);
            }
        }

        match found {
            Some(idx) => {
                enrollment.backup_hashes.swap_remove(idx);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn backup_codes_remaining(&self, operator_id: &str) -> Result<usize> {
        Ok(self
            .operators
            .read()
            .await
            .get(operator_id)
            .map(|e| e.backup_hashes.len())
            .unwrap_or(0))
    }
}
