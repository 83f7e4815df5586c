use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Second-factor method used for a step-up attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepUpMethod {
    Totp,
    BackupCode,
}

impl StepUpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Totp => "totp",
            Self::BackupCode => "backup_code",
        }
    }
}

/// Internal reason a code was rejected.
///
/// Recorded on the challenge and in the audit trail. Clients only ever see
/// `invalid_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The code did not match.
    InvalidCode,
    /// The operator has no enrollment for the chosen method.
    NotEnrolled,
    /// A TOTP code for an already-used time step.
    Replayed,
    /// The code was not in the expected format.
    Malformed,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCode => "invalid_code",
            Self::NotEnrolled => "not_enrolled",
            Self::Replayed => "replayed",
            Self::Malformed => "malformed",
        }
    }
}

/// Pending step-up verification for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepUpChallenge {
    pub session_id: String,
    pub operator_id: String,
    /// Method of the most recent attempt.
    pub method: StepUpMethod,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub issued_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub last_failure_reason: Option<FailureReason>,
    /// Set once the owning session leaves pending verification.
    pub consumed: bool,
}

impl StepUpChallenge {
    pub fn new(
        session_id: impl Into<String>,
        operator_id: impl Into<String>,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            operator_id: operator_id.into(),
            method: StepUpMethod::Totp,
            attempt_count: 0,
            max_attempts,
            issued_at: now,
            verified_at: None,
            last_failure_reason: None,
            consumed: false,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.verified_at.is_none() && self.attempt_count >= self.max_attempts
    }

    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempt_count)
    }

    /// Count a failed attempt. Returns `true` if the challenge is now exhausted.
    pub fn record_failure(&mut self, method: StepUpMethod, reason: FailureReason) -> bool {
        self.method = method;
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.last_failure_reason = Some(reason);
        self.is_exhausted()
    }

    pub fn record_success(&mut self, method: StepUpMethod, now: DateTime<Utc>) {
        self.method = method;
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.verified_at = Some(now);
        self.consumed = true;
    }

    pub fn consume(&mut self) {
        self.consumed = true;
    }
}
