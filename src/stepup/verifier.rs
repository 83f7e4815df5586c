use super::backup::{hash_backup_code, normalize_backup_code};
use super::challenge::{FailureReason, StepUpMethod};
use super::storage::SecondFactorStore;
use super::totp::TotpVerifier;
use crate::clock::Clock;
use crate::error::{ImpersonationError, Result};
use std::sync::Arc;

/// Outcome of checking one code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Verified,
    Rejected(FailureReason),
}

impl Verification {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }
}

/// Checks a second-factor code against the operator's own enrollment.
///
/// Only the operator's credentials are ever consulted. The impersonated
/// target plays no part in step-up.
#[derive(Clone)]
pub struct StepUpVerifier {
    factors: Arc<dyn SecondFactorStore>,
    totp: TotpVerifier,
    clock: Arc<dyn Clock>,
}

impl StepUpVerifier {
    pub fn new(
        factors: Arc<dyn SecondFactorStore>,
        totp: TotpVerifier,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            factors,
            totp,
            clock,
        }
    }

    pub fn totp(&self) -> &TotpVerifier {
        &self.totp
    }

    /// Verify `code` for `operator_id` using `method`.
    ///
    /// Storage failures are errors; a wrong code is `Ok(Rejected(..))`.
    pub async fn verify(
        &self,
        operator_id: &str,
        code: &str,
        method: StepUpMethod,
    ) -> Result<Verification> {
        match method {
            StepUpMethod::Totp => self.verify_totp(operator_id, code).await,
            StepUpMethod::BackupCode => self.verify_backup_code(operator_id, code).await,
        }
    }

    async fn verify_totp(&self, operator_id: &str, code: &str) -> Result<Verification> {
        let Some(secret) = self.factors.get_totp_secret(operator_id).await? else {
            return Ok(Verification::Rejected(FailureReason::NotEnrolled));
        };
        let Some(code) = self.totp.normalize_code(code) else {
            return Ok(Verification::Rejected(FailureReason::Malformed));
        };

        let now = u64::try_from(self.clock.now().timestamp())
            .map_err(|_| ImpersonationError::internal("clock is before the Unix epoch"))?;

        match self.totp.matching_step(&secret, &code, now)? {
            None => Ok(Verification::Rejected(FailureReason::InvalidCode)),
            Some(step) => {
                if self.factors.record_totp_step(operator_id, step).await? {
                    Ok(Verification::Verified)
                } else {
                    Ok(Verification::Rejected(FailureReason::Replayed))
                }
            }
        }
    }

    async fn verify_backup_code(&self, operator_id: &str, code: &str) -> Result<Verification> {
        let Some(normalized) = normalize_backup_code(code) else {
            return Ok(Verification::Rejected(FailureReason::Malformed));
        };
        if self
            .factors
            .consume_backup_code(operator_id, &hash_backup_code(&normalized))
            .await?
        {
            Ok(Verification::Verified)
        } else {
            Ok(Verification::Rejected(FailureReason::InvalidCode))
        }
    }
}
