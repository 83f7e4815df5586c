use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What an impersonation session is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpersonationMode {
    /// Observe only. Mutating requests are always refused.
    ViewOnly,
    /// Act with the target's own effective permissions.
    ActAs,
}

impl ImpersonationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ViewOnly => "view_only",
            Self::ActAs => "act_as",
        }
    }
}

/// Category of the reason given for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JustificationType {
    Ticket,
    TestCase,
    Support,
    Debugging,
    Other,
}

/// Reason an operator gives when requesting a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Justification {
    #[serde(rename = "type")]
    pub kind: JustificationType,
    pub text: String,
}

impl Justification {
    pub fn new(kind: JustificationType, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn ticket(text: impl Into<String>) -> Self {
        Self::new(JustificationType::Ticket, text)
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Requested,
    PendingStepUp,
    Active,
    Expired,
    EndedByOperator,
    Revoked,
    DeniedStepUp,
}

impl SessionStatus {
    /// No further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Expired | Self::EndedByOperator | Self::Revoked | Self::DeniedStepUp
        )
    }

    /// Counts against the one-open-session-per-operator rule.
    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::PendingStepUp => "pending_step_up",
            Self::Active => "active",
            Self::Expired => "expired",
            Self::EndedByOperator => "ended_by_operator",
            Self::Revoked => "revoked",
            Self::DeniedStepUp => "denied_step_up",
        }
    }
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Expired,
    EndedByOperator,
    Revoked,
    DeniedStepUp,
}

/// Why step-up verification was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialCause {
    AttemptsExhausted,
    Timeout,
}

impl DenialCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AttemptsExhausted => "attempts_exhausted",
            Self::Timeout => "timeout",
        }
    }
}

/// Input to [`SessionManager::request_session`](super::SessionManager::request_session).
#[derive(Debug, Clone, Deserialize)]
pub struct SessionRequest {
    pub operator_id: String,
    pub tenant_id: String,
    /// `None` requests a pre-tenant session.
    #[serde(default)]
    pub user_id: Option<String>,
    pub mode: ImpersonationMode,
    pub justification: Justification,
    pub duration_minutes: u32,
}

impl SessionRequest {
    pub fn new(
        operator_id: impl Into<String>,
        tenant_id: impl Into<String>,
        user_id: Option<String>,
        mode: ImpersonationMode,
        justification: Justification,
        duration_minutes: u32,
    ) -> Self {
        Self {
            operator_id: operator_id.into(),
            tenant_id: tenant_id.into(),
            user_id,
            mode,
            justification,
            duration_minutes,
        }
    }
}

/// A privileged impersonation session.
///
/// Fields are mutated only through the transition methods in
/// [`machine`](super::machine); storage backends persist whatever they are
/// handed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpersonationSession {
    pub id: String,
    pub operator_id: String,
    pub target_tenant_id: String,
    pub target_user_id: Option<String>,
    pub is_pre_tenant: bool,
    pub mode: ImpersonationMode,
    pub justification_type: JustificationType,
    pub justification_text: String,
    pub requested_duration_minutes: u32,
    pub status: SessionStatus,
    pub requires_step_up: bool,
    pub requested_at: DateTime<Utc>,
    /// Deadline for finishing step-up; set only while verification is required.
    pub step_up_deadline: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<EndReason>,
    /// Set with `DeniedStepUp`.
    #[serde(default)]
    pub denial_cause: Option<DenialCause>,
    pub revocation_reason: Option<String>,
}

/// The resolved identity a request executes as.
///
/// Built per request from a live session and passed down explicitly; there is
/// no process-wide "current impersonation".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveContext {
    pub session_id: String,
    pub operator_id: String,
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub mode: ImpersonationMode,
    pub expires_at: DateTime<Utc>,
}

/// Read-only status for UI surfaces. Never used to authorize anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatusView {
    pub session_id: String,
    pub status: SessionStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub mode: ImpersonationMode,
}
