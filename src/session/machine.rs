//! Session state machine.
//!
//! Transitions are pure functions of the current session and an explicit
//! `now`. They never read a clock, touch storage, or write audit entries; the
//! [`SessionManager`](super::SessionManager) does that around them.
//!
//! ```text
//! Requested ──▶ Active ──▶ Expired | EndedByOperator | Revoked
//!     │           ▲
//!     ▼           │
//! PendingStepUp ──┘
//!     │
//!     ▼
//! DeniedStepUp | Revoked
//! ```

use super::types::{
    DenialCause, EndReason, ImpersonationMode, ImpersonationSession, JustificationType, SessionStatus,
};
use crate::error::ImpersonationError;
use chrono::{DateTime, Duration, Utc};

/// A transition was attempted from a state that does not allow it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot {action} a session in state {from:?}")]
pub struct InvalidTransition {
    pub from: SessionStatus,
    pub action: &'static str,
}

impl From<InvalidTransition> for ImpersonationError {
    fn from(err: InvalidTransition) -> Self {
        ImpersonationError::internal(err.to_string())
    }
}

/// Evidence presented when activating a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationProof {
    /// The session never required step-up.
    NotRequired,
    /// A step-up challenge succeeded at the given instant.
    StepUpVerified { verified_at: DateTime<Utc> },
}

/// Everything needed to open a session, already validated.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub operator_id: String,
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub mode: ImpersonationMode,
    pub justification_type: JustificationType,
    pub justification_text: String,
    pub duration_minutes: u32,
    pub requires_step_up: bool,
}

/// Generate an opaque session id.
pub fn generate_session_id() -> String {
    format!("imp_{}", uuid::Uuid::new_v4().simple())
}

impl ImpersonationSession {
    /// Create a session in the `Requested` state.
    pub fn new(params: NewSession, now: DateTime<Utc>) -> Self {
        let is_pre_tenant = params.user_id.is_none();
        Self {
            id: generate_session_id(),
            operator_id: params.operator_id,
            target_tenant_id: params.tenant_id,
            target_user_id: params.user_id,
            is_pre_tenant,
            mode: params.mode,
            justification_type: params.justification_type,
            justification_text: params.justification_text,
            requested_duration_minutes: params.duration_minutes,
            status: SessionStatus::Requested,
            requires_step_up: params.requires_step_up,
            requested_at: now,
            step_up_deadline: None,
            started_at: None,
            expires_at: None,
            ended_at: None,
            end_reason: None,
            denial_cause: None,
            revocation_reason: None,
        }
    }

    /// Length of the session once active.
    pub fn duration(&self) -> Duration {
        Duration::minutes(i64::from(self.requested_duration_minutes))
    }

    /// `Requested → PendingStepUp`.
    pub fn await_step_up(&mut self, deadline: DateTime<Utc>) -> Result<(), InvalidTransition> {
        if self.status != SessionStatus::Requested || !self.requires_step_up {
            return Err(self.invalid("await step-up for"));
        }
        self.status = SessionStatus::PendingStepUp;
        self.step_up_deadline = Some(deadline);
        Ok(())
    }

    /// `Requested → Active` or `PendingStepUp → Active`.
    ///
    /// A session that requires step-up only activates from `PendingStepUp`
    /// with a verified proof. `expires_at` is fixed here and never moves.
    pub fn activate(
        &mut self,
        now: DateTime<Utc>,
        proof: ActivationProof,
    ) -> Result<(), InvalidTransition> {
        match (self.status, self.requires_step_up, proof) {
            (SessionStatus::Requested, false, ActivationProof::NotRequired) => {}
            (SessionStatus::PendingStepUp, true, ActivationProof::StepUpVerified { .. }) => {}
            _ => return Err(self.invalid("activate")),
        }
        self.status = SessionStatus::Active;
        self.started_at = Some(now);
        self.expires_at = Some(now + self.duration());
        Ok(())
    }

    /// `PendingStepUp → DeniedStepUp`.
    pub fn deny_step_up(
        &mut self,
        now: DateTime<Utc>,
        cause: DenialCause,
    ) -> Result<(), InvalidTransition> {
        if self.status != SessionStatus::PendingStepUp {
            return Err(self.invalid("deny step-up for"));
        }
        self.denial_cause = Some(cause);
        self.finish(SessionStatus::DeniedStepUp, EndReason::DeniedStepUp, now);
        Ok(())
    }

    /// `Active → Expired`. The end time is the fixed expiry, not `now`.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        if self.status != SessionStatus::Active {
            return Err(self.invalid("expire"));
        }
        let ended_at = self.expires_at.unwrap_or(now).min(now);
        self.finish(SessionStatus::Expired, EndReason::Expired, ended_at);
        Ok(())
    }

    /// `Active → EndedByOperator`.
    pub fn end_by_operator(&mut self, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        if self.status != SessionStatus::Active {
            return Err(self.invalid("end"));
        }
        self.finish(SessionStatus::EndedByOperator, EndReason::EndedByOperator, now);
        Ok(())
    }

    /// `Active → Revoked` or `PendingStepUp → Revoked`.
    pub fn revoke(
        &mut self,
        now: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Result<(), InvalidTransition> {
        if !matches!(
            self.status,
            SessionStatus::Active | SessionStatus::PendingStepUp | SessionStatus::Requested
        ) {
            return Err(self.invalid("revoke"));
        }
        self.revocation_reason = Some(reason.into());
        self.finish(SessionStatus::Revoked, EndReason::Revoked, now);
        Ok(())
    }

    /// Active and not yet past `expires_at`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Active && self.expires_at.is_some_and(|exp| now < exp)
    }

    /// Pending verification whose window has closed.
    pub fn step_up_timed_out(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::PendingStepUp
            && self.step_up_deadline.is_some_and(|deadline| now >= deadline)
    }

    /// The status as of `now`, accounting for deadlines that have passed but
    /// not yet been persisted.
    pub fn effective_status(&self, now: DateTime<Utc>) -> SessionStatus {
        match self.status {
            SessionStatus::Active if !self.is_live(now) => SessionStatus::Expired,
            SessionStatus::PendingStepUp if self.step_up_timed_out(now) => {
                SessionStatus::DeniedStepUp
            }
            status => status,
        }
    }

    fn finish(&mut self, status: SessionStatus, reason: EndReason, at: DateTime<Utc>) {
        self.status = status;
        self.end_reason = Some(reason);
        self.ended_at = Some(at);
    }

    fn invalid(&self, action: &'static str) -> InvalidTransition {
        InvalidTransition {
            from: self.status,
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_session(mode: ImpersonationMode, requires_step_up: bool) -> ImpersonationSession {
        ImpersonationSession::new(
            NewSession {
                operator_id: "op-1".into(),
                tenant_id: "tenant-1".into(),
                user_id: Some("user-1".into()),
                mode,
                justification_type: JustificationType::Ticket,
                justification_text: "TICKET-1: investigate".into(),
                duration_minutes: 30,
                requires_step_up,
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_direct_activation_fixes_expiry() {
        let mut session = new_session(ImpersonationMode::ViewOnly, false);
        let now = Utc::now();
        session.activate(now, ActivationProof::NotRequired).unwrap();

        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.started_at, Some(now));
        assert_eq!(session.expires_at, Some(now + Duration::minutes(30)));
        assert!(session.id.starts_with("imp_"));
    }

    #[test]
    fn test_step_up_required_blocks_direct_activation() {
        let mut session = new_session(ImpersonationMode::ActAs, true);
        let now = Utc::now();

        assert!(session.activate(now, ActivationProof::NotRequired).is_err());
        assert!(
            session
                .activate(now, ActivationProof::StepUpVerified { verified_at: now })
                .is_err(),
            "proof alone is not enough outside PendingStepUp"
        );

        session.await_step_up(now + Duration::minutes(5)).unwrap();
        assert!(session.activate(now, ActivationProof::NotRequired).is_err());
        session
            .activate(now, ActivationProof::StepUpVerified { verified_at: now })
            .unwrap();
        assert_eq!(session.status, SessionStatus::Active);
    }

    #[test]
    fn test_await_step_up_rejected_when_not_required() {
        let mut session = new_session(ImpersonationMode::ViewOnly, false);
        let err = session.await_step_up(Utc::now()).unwrap_err();
        assert_eq!(err.from, SessionStatus::Requested);
    }

    #[test]
    fn test_denied_only_from_pending() {
        let now = Utc::now();
        let mut session = new_session(ImpersonationMode::ActAs, true);
        assert!(session.deny_step_up(now, DenialCause::Timeout).is_err());
        assert_eq!(session.denial_cause, None);

        session.await_step_up(now + Duration::minutes(5)).unwrap();
        session.deny_step_up(now, DenialCause::AttemptsExhausted).unwrap();
        assert_eq!(session.status, SessionStatus::DeniedStepUp);
        assert_eq!(session.end_reason, Some(EndReason::DeniedStepUp));
        assert_eq!(session.denial_cause, Some(DenialCause::AttemptsExhausted));

        // terminal
        assert!(session.activate(now, ActivationProof::StepUpVerified { verified_at: now }).is_err());
        assert!(session.revoke(now, "late").is_err());
    }

    #[test]
    fn test_effective_status_is_time_driven() {
        let start = Utc::now();
        let mut session = new_session(ImpersonationMode::ViewOnly, false);
        session.activate(start, ActivationProof::NotRequired).unwrap();

        assert_eq!(session.effective_status(start), SessionStatus::Active);
        let expiry = start + Duration::minutes(30);
        assert!(session.is_live(expiry - Duration::seconds(1)));
        assert!(!session.is_live(expiry));
        assert_eq!(session.effective_status(expiry), SessionStatus::Expired);

        session.expire(expiry + Duration::hours(1)).unwrap();
        assert_eq!(session.ended_at, Some(expiry));
    }

    #[test]
    fn test_pending_timeout_reported_as_denied() {
        let now = Utc::now();
        let mut session = new_session(ImpersonationMode::ActAs, true);
        session.await_step_up(now + Duration::minutes(5)).unwrap();

        assert!(!session.step_up_timed_out(now));
        assert!(session.step_up_timed_out(now + Duration::minutes(5)));
        assert_eq!(
            session.effective_status(now + Duration::minutes(6)),
            SessionStatus::DeniedStepUp
        );
    }

    #[test]
    fn test_end_and_revoke() {
        let now = Utc::now();
        let mut session = new_session(ImpersonationMode::ViewOnly, false);
        assert!(session.end_by_operator(now).is_err());

        session.activate(now, ActivationProof::NotRequired).unwrap();
        session.revoke(now, "kill switch").unwrap();
        assert_eq!(session.status, SessionStatus::Revoked);
        assert_eq!(session.revocation_reason.as_deref(), Some("kill switch"));
        assert!(!session.is_live(now));
        assert!(session.end_by_operator(now).is_err());
    }
}
