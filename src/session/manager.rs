use super::locks::KeyedLocks;
use super::machine::{ActivationProof, NewSession};
use super::policy::ImpersonationPolicy;
use super::storage::ImpersonationStore;
use super::types::{
    DenialCause, EffectiveContext, ImpersonationSession, SessionRequest, SessionStatus,
    SessionStatusView,
};
use crate::audit::{AuditEntry, AuditOutcome, AuditRecord, AuditRecorder, AuditSink, actions};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::directory::{Directory, resolve_target};
use crate::error::{ImpersonationError, Result};
use crate::stepup::{
    SecondFactorStore, StepUpChallenge, StepUpMethod, StepUpVerifier, TotpConfig, TotpVerifier,
    Verification,
};
use crate::tier::{
    OperatorTier, OperatorTiers, StepUpPolicy, TierExemptionPolicy, require_operator,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;

/// Counts from one [`SessionManager::sweep`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Active sessions moved to `Expired`.
    pub expired: usize,
    /// Pending sessions denied because verification timed out.
    pub timed_out: usize,
    /// Pending sessions whose exhausted challenge had not been recorded as a denial.
    pub exhausted: usize,
    /// Consumed challenges removed.
    pub purged_challenges: usize,
}

/// Owns the impersonation session lifecycle.
///
/// All writes to sessions and challenges go through here. Requests are
/// serialized per operator (one open session each) and transitions per
/// session id, always in that order.
///
/// # Example
///
/// ```rust,ignore
/// let manager = SessionManager::builder()
///     .store(InMemoryImpersonationStore::new())
///     .directory(directory)
///     .operator_tiers(tiers)
///     .second_factors(factors)
///     .audit_sink(InMemoryAuditSink::new())
///     .build()?;
///
/// let session = manager.request_session(SessionRequest::new(
///     "op-1", "tenant-1", Some("user-1".into()),
///     ImpersonationMode::ActAs,
///     Justification::ticket("TICKET-1: investigate"),
///     60,
/// )).await?;
///
/// manager.begin_step_up(&session.id).await?;
/// let session = manager.complete_step_up(&session.id, "123456", StepUpMethod::Totp).await?;
/// ```
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn ImpersonationStore>,
    directory: Arc<dyn Directory>,
    tiers: Arc<dyn OperatorTiers>,
    step_up_policy: Arc<dyn StepUpPolicy>,
    verifier: StepUpVerifier,
    audit: AuditRecorder,
    clock: Arc<dyn Clock>,
    policy: ImpersonationPolicy,
    operator_locks: KeyedLocks,
    session_locks: KeyedLocks,
}

impl SessionManager {
    pub fn builder() -> SessionManagerBuilder {
        SessionManagerBuilder::default()
    }

    pub fn policy(&self) -> &ImpersonationPolicy {
        &self.policy
    }

    pub fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    pub fn directory(&self) -> &dyn Directory {
        self.directory.as_ref()
    }

    pub fn verifier(&self) -> &StepUpVerifier {
        &self.verifier
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The caller's operator tier, or `NotOperator`.
    pub async fn operator_tier(&self, operator_id: &str) -> Result<OperatorTier> {
        require_operator(self.tiers.as_ref(), operator_id).await
    }

    /// Request a new session.
    ///
    /// View-only sessions and exempt operators go straight to `Active`;
    /// everything else lands in `PendingStepUp`. Nothing is stored unless the
    /// request passes validation and its audit entries are written.
    pub async fn request_session(&self, req: SessionRequest) -> Result<ImpersonationSession> {
        if let Err(e) = self.validate_request(&req) {
            reject(&req, &e);
            return Err(e);
        }
        let justification_text = match self.policy.normalize_justification(&req.justification.text)
        {
            Ok(text) => text,
            Err(e) => {
                reject(&req, &e);
                return Err(e);
            }
        };

        let tier = match require_operator(self.tiers.as_ref(), &req.operator_id).await {
            Ok(tier) => tier,
            Err(e) => {
                reject(&req, &e);
                return Err(e);
            }
        };
        if let Err(e) =
            resolve_target(self.directory.as_ref(), &req.tenant_id, req.user_id.as_deref()).await
        {
            reject(&req, &e);
            return Err(e);
        }

        let _operator_guard = self.operator_locks.lock(&req.operator_id).await;

        if let Some(existing) = self.store.open_session_for_operator(&req.operator_id).await? {
            if !self.close_if_stale(&existing.id).await?.status.is_terminal() {
                let err = ImpersonationError::ConcurrentSessionExists;
                tracing::warn!(
                    target: "impersonation.session.rejected",
                    operator_id = %req.operator_id,
                    existing_session = %existing.id,
                    reason = err.code(),
                    "Session request rejected: operator already has an open session"
                );
                return Err(err);
            }
        }

        let requires_step_up = self.step_up_policy.requires_step_up(&tier, req.mode);
        let now = self.clock.now();
        let mut session = ImpersonationSession::new(
            NewSession {
                operator_id: req.operator_id,
                tenant_id: req.tenant_id,
                user_id: req.user_id,
                mode: req.mode,
                justification_type: req.justification.kind,
                justification_text,
                duration_minutes: req.duration_minutes,
                requires_step_up,
            },
            now,
        );

        self.audit
            .record(
                AuditRecord::for_session(&session, actions::session::REQUESTED, AuditOutcome::Success)
                    .with_detail(json!({
                        "mode": session.mode,
                        "justification_type": session.justification_type,
                        "duration_minutes": session.requested_duration_minutes,
                        "requires_step_up": requires_step_up,
                        "is_pre_tenant": session.is_pre_tenant,
                        "tier": tier.name,
                    })),
            )
            .await?;

        if requires_step_up {
            session.await_step_up(now + self.policy.step_up_window())?;
        } else {
            session.activate(now, ActivationProof::NotRequired)?;
            self.record_activated(&session).await?;
        }

        self.store.create_session(&session).await?;

        tracing::info!(
            target: "impersonation.session.requested",
            session_id = %session.id,
            operator_id = %session.operator_id,
            tenant_id = %session.target_tenant_id,
            user_id = session.target_user_id.as_deref().unwrap_or("none"),
            mode = session.mode.as_str(),
            duration_minutes = session.requested_duration_minutes,
            status = session.status.as_str(),
            "Impersonation session requested"
        );

        Ok(session)
    }

    fn validate_request(&self, req: &SessionRequest) -> Result<()> {
        self.policy.check_duration(req.duration_minutes)?;
        if req.tenant_id.trim().is_empty() {
            return Err(ImpersonationError::bad_request("tenant id is required"));
        }
        match req.user_id.as_deref() {
            Some(user_id) if user_id.trim().is_empty() => {
                return Err(ImpersonationError::bad_request("user id must not be empty"));
            }
            Some(user_id) if user_id == req.operator_id => {
                return Err(ImpersonationError::SelfImpersonation);
            }
            _ => {}
        }
        Ok(())
    }

    /// Issue (or return the existing) step-up challenge for a pending session.
    pub async fn begin_step_up(&self, session_id: &str) -> Result<StepUpChallenge> {
        let _guard = self.session_locks.lock(session_id).await;
        let mut session = self.load(session_id).await?;
        let now = self.clock.now();

        if session.status != SessionStatus::PendingStepUp {
            return Err(ImpersonationError::NotPending);
        }

        let existing = self.store.get_challenge(session_id).await?;
        if existing.as_ref().is_some_and(StepUpChallenge::is_exhausted) {
            self.deny_step_up(&mut session, now, DenialCause::AttemptsExhausted).await?;
            return Err(ImpersonationError::AttemptsExhausted);
        }
        if session.step_up_timed_out(now) {
            self.deny_step_up(&mut session, now, DenialCause::Timeout).await?;
            return Err(ImpersonationError::StepUpExpired);
        }

        match existing {
            Some(challenge) if !challenge.consumed => Ok(challenge),
            _ => self.issue_challenge(&session, now).await,
        }
    }

    async fn issue_challenge(
        &self,
        session: &ImpersonationSession,
        now: DateTime<Utc>,
    ) -> Result<StepUpChallenge> {
        let challenge = StepUpChallenge::new(
            &session.id,
            &session.operator_id,
            self.policy.max_step_up_attempts,
            now,
        );
        self.audit
            .record(
                AuditRecord::for_session(
                    session,
                    actions::step_up::CHALLENGE_ISSUED,
                    AuditOutcome::Success,
                )
                .with_detail(json!({ "max_attempts": challenge.max_attempts })),
            )
            .await?;
        self.store.save_challenge(&challenge).await?;

        tracing::info!(
            target: "impersonation.step_up.issued",
            session_id = %session.id,
            operator_id = %session.operator_id,
            max_attempts = challenge.max_attempts,
            "Step-up challenge issued"
        );
        Ok(challenge)
    }

    /// Check a second-factor code for a pending session.
    ///
    /// On success the session becomes `Active`. Each failure counts against
    /// the challenge; the last allowed failure denies the session, and any
    /// call after that returns `AttemptsExhausted` without checking the code.
    pub async fn complete_step_up(
        &self,
        session_id: &str,
        code: &str,
        method: StepUpMethod,
    ) -> Result<ImpersonationSession> {
        let _guard = self.session_locks.lock(session_id).await;
        let mut session = self.load(session_id).await?;
        let now = self.clock.now();
        match session.status {
            SessionStatus::PendingStepUp => {}
            SessionStatus::DeniedStepUp => return Err(denial_error(&session)),
            _ => return Err(ImpersonationError::NotPending),
        }

        let existing = self.store.get_challenge(session_id).await?;
        if existing.as_ref().is_some_and(StepUpChallenge::is_exhausted) {
            // Last failure was counted but its denial never made it to the audit log.
            self.deny_step_up(&mut session, now, DenialCause::AttemptsExhausted).await?;
            return Err(ImpersonationError::AttemptsExhausted);
        }
        if session.step_up_timed_out(now) {
            self.deny_step_up(&mut session, now, DenialCause::Timeout).await?;
            return Err(ImpersonationError::StepUpExpired);
        }

        let mut challenge = match existing {
            Some(challenge) if !challenge.consumed => challenge,
            _ => self.issue_challenge(&session, now).await?,
        };

        let verification = match self
            .verifier
            .verify(&session.operator_id, code, method)
            .await
        {
            Ok(verification) => verification,
            Err(e) => {
                let record = AuditRecord::for_session(
                    &session,
                    actions::step_up::ATTEMPT,
                    AuditOutcome::Error,
                )
                .with_detail(json!({ "method": method }));
                if let Err(audit_err) = self.audit.record(record).await {
                    tracing::error!(
                        target: "impersonation.step_up.error",
                        session_id = %session.id,
                        error = %audit_err,
                        "Failed to audit step-up verification error"
                    );
                }
                return Err(e);
            }
        };

        match verification {
            Verification::Verified => {
                challenge.record_success(method, now);
                self.audit
                    .record(
                        AuditRecord::for_session(
                            &session,
                            actions::step_up::ATTEMPT,
                            AuditOutcome::Success,
                        )
                        .with_detail(json!({
                            "method": method,
                            "attempt": challenge.attempt_count,
                        })),
                    )
                    .await?;

                session.activate(now, ActivationProof::StepUpVerified { verified_at: now })?;
                self.record_activated(&session).await?;
                self.store.update_session(&session).await?;
                self.store.save_challenge(&challenge).await?;

                tracing::info!(
                    target: "impersonation.step_up.verified",
                    session_id = %session.id,
                    operator_id = %session.operator_id,
                    method = method.as_str(),
                    "Step-up verified"
                );
                Ok(session)
            }
            Verification::Rejected(reason) => {
                let exhausted = challenge.record_failure(method, reason);
                self.store.save_challenge(&challenge).await?;

                tracing::warn!(
                    target: "impersonation.step_up.failed",
                    session_id = %session.id,
                    operator_id = %session.operator_id,
                    method = method.as_str(),
                    attempt = challenge.attempt_count,
                    remaining = challenge.remaining_attempts(),
                    "Step-up verification failed"
                );

                let attempt_logged = self
                    .audit
                    .record(
                        AuditRecord::for_session(
                            &session,
                            actions::step_up::ATTEMPT,
                            AuditOutcome::Denied,
                        )
                        .with_detail(json!({
                            "method": method,
                            "attempt": challenge.attempt_count,
                            "remaining": challenge.remaining_attempts(),
                            "reason": reason,
                        })),
                    )
                    .await;

                // The denial is written even when the attempt entry was not.
                if exhausted {
                    let denied = self
                        .deny_step_up(&mut session, now, DenialCause::AttemptsExhausted)
                        .await;
                    attempt_logged?;
                    denied?;
                    Err(ImpersonationError::AttemptsExhausted)
                } else {
                    attempt_logged?;
                    Err(ImpersonationError::InvalidCode)
                }
            }
        }
    }

    /// End an active session. Only the owning operator may do this.
    pub async fn end_session(&self, session_id: &str, operator_id: &str) -> Result<()> {
        let _guard = self.session_locks.lock(session_id).await;
        let mut session = self.load(session_id).await?;
        let now = self.clock.now();

        if session.operator_id != operator_id {
            tracing::warn!(
                target: "impersonation.session.rejected",
                session_id = %session_id,
                operator_id = %operator_id,
                reason = "not_owner",
                "End rejected: session belongs to another operator"
            );
            return Err(ImpersonationError::NotOwner);
        }
        if session.status == SessionStatus::Active && !session.is_live(now) {
            self.expire_session(&mut session, now).await?;
        }
        if session.status != SessionStatus::Active {
            return Err(ImpersonationError::NotActive);
        }

        session.end_by_operator(now)?;
        self.store.update_session(&session).await?;
        self.audit
            .record(AuditRecord::for_session(
                &session,
                actions::session::ENDED,
                AuditOutcome::Success,
            ))
            .await?;

        tracing::info!(
            target: "impersonation.session.ended",
            session_id = %session.id,
            operator_id = %session.operator_id,
            "Impersonation session ended"
        );
        Ok(())
    }

    /// Force-terminate a session. Bypasses ownership.
    ///
    /// Revoking a session that is already terminal is a no-op.
    pub async fn revoke_session(&self, session_id: &str, reason: &str) -> Result<()> {
        self.revoke(session_id, reason).await.map(|_| ())
    }

    /// Revoke every open session held by an operator. Returns how many were revoked.
    pub async fn revoke_sessions_for_operator(
        &self,
        operator_id: &str,
        reason: &str,
    ) -> Result<usize> {
        let sessions = self.store.list_open_sessions().await?;
        self.revoke_all(
            sessions.into_iter().filter(|s| s.operator_id == operator_id),
            reason,
        )
        .await
    }

    /// Revoke every open session targeting a tenant. Returns how many were revoked.
    pub async fn revoke_sessions_for_tenant(&self, tenant_id: &str, reason: &str) -> Result<usize> {
        let sessions = self.store.list_open_sessions().await?;
        self.revoke_all(
            sessions.into_iter().filter(|s| s.target_tenant_id == tenant_id),
            reason,
        )
        .await
    }

    async fn revoke_all(
        &self,
        sessions: impl Iterator<Item = ImpersonationSession>,
        reason: &str,
    ) -> Result<usize> {
        let mut revoked = 0;
        for session in sessions {
            if self.revoke(&session.id, reason).await? {
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn revoke(&self, session_id: &str, reason: &str) -> Result<bool> {
        let _guard = self.session_locks.lock(session_id).await;
        let mut session = self.load(session_id).await?;
        let now = self.clock.now();

        if session.status == SessionStatus::Active && !session.is_live(now) {
            self.expire_session(&mut session, now).await?;
        }
        if session.status.is_terminal() {
            tracing::debug!(
                target: "impersonation.session.revoked",
                session_id = %session_id,
                status = session.status.as_str(),
                "Revoke on terminal session ignored"
            );
            return Ok(false);
        }

        let was_pending = session.status == SessionStatus::PendingStepUp;
        session.revoke(now, reason)?;
        self.store.update_session(&session).await?;
        if was_pending {
            if let Some(mut challenge) = self.store.get_challenge(session_id).await? {
                challenge.consume();
                self.store.save_challenge(&challenge).await?;
            }
        }

        self.audit
            .record(
                AuditRecord::for_session(&session, actions::session::REVOKED, AuditOutcome::Success)
                    .with_detail(json!({ "reason": reason, "was_pending": was_pending })),
            )
            .await?;

        tracing::warn!(
            target: "impersonation.security_alert",
            alert = "session_revoked",
            session_id = %session.id,
            operator_id = %session.operator_id,
            tenant_id = %session.target_tenant_id,
            reason = %reason,
            "Impersonation session revoked"
        );
        Ok(true)
    }

    /// Resolve the identity a request should execute as.
    ///
    /// The only read path that may be used for authorization. Expiry is
    /// checked against the clock on every call; a session found past its
    /// `expires_at` is closed here whether or not a sweeper has run.
    pub async fn get_effective_context(&self, session_id: &str) -> Result<EffectiveContext> {
        let Some(session) = self.store.get_session(session_id).await? else {
            return Err(ImpersonationError::NotActive);
        };
        let now = self.clock.now();

        match session.status {
            SessionStatus::Active => match session.expires_at {
                Some(expires_at) if now < expires_at => Ok(EffectiveContext {
                    session_id: session.id,
                    operator_id: session.operator_id,
                    tenant_id: session.target_tenant_id,
                    user_id: session.target_user_id,
                    mode: session.mode,
                    expires_at,
                }),
                _ => {
                    if let Err(e) = self.close_if_stale(session_id).await {
                        tracing::error!(
                            target: "impersonation.session.expired",
                            session_id = %session_id,
                            error = %e,
                            "Failed to record lazy expiry"
                        );
                    }
                    Err(ImpersonationError::SessionExpired)
                }
            },
            SessionStatus::Expired => Err(ImpersonationError::SessionExpired),
            _ => Err(ImpersonationError::NotActive),
        }
    }

    /// Status for UI surfaces. Never used for authorization.
    pub async fn get_session_status(&self, session_id: &str) -> Result<SessionStatusView> {
        let session = self.load(session_id).await?;
        Ok(SessionStatusView {
            status: session.effective_status(self.clock.now()),
            session_id: session.id,
            expires_at: session.expires_at,
            mode: session.mode,
        })
    }

    pub async fn get_session(&self, session_id: &str) -> Result<ImpersonationSession> {
        self.load(session_id).await
    }

    pub async fn get_challenge(&self, session_id: &str) -> Result<Option<StepUpChallenge>> {
        self.store.get_challenge(session_id).await
    }

    /// Finalize sessions whose deadlines have passed and purge consumed challenges.
    ///
    /// Correctness never depends on this running; it keeps stored state and
    /// the audit trail tidy.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let now = self.clock.now();

        for session in self.store.list_open_sessions().await? {
            let stale_active = session.status == SessionStatus::Active && !session.is_live(now);
            let pending = session.status == SessionStatus::PendingStepUp;
            if !stale_active && !pending {
                continue;
            }
            match self.close_if_stale(&session.id).await {
                Ok(closed) => match (closed.status, closed.denial_cause) {
                    (SessionStatus::Expired, _) => report.expired += 1,
                    (SessionStatus::DeniedStepUp, Some(DenialCause::Timeout)) => {
                        report.timed_out += 1;
                    }
                    (SessionStatus::DeniedStepUp, _) => report.exhausted += 1,
                    _ => {}
                },
                Err(e) => tracing::error!(
                    target: "impersonation.sweeper",
                    session_id = %session.id,
                    error = %e,
                    "Failed to finalize stale session"
                ),
            }
        }

        report.purged_challenges = self.store.purge_consumed_challenges(now).await?;
        Ok(report)
    }

    /// Persist a transition that has already happened logically: an expiry,
    /// a closed verification window, or an exhausted challenge whose denial
    /// was never recorded.
    ///
    /// Returns the session as stored afterwards.
    async fn close_if_stale(&self, session_id: &str) -> Result<ImpersonationSession> {
        let _guard = self.session_locks.lock(session_id).await;
        let mut session = self.load(session_id).await?;
        let now = self.clock.now();

        match session.status {
            SessionStatus::Active if !session.is_live(now) => {
                self.expire_session(&mut session, now).await?;
            }
            SessionStatus::PendingStepUp => {
                let exhausted = self
                    .store
                    .get_challenge(session_id)
                    .await?
                    .is_some_and(|c| c.is_exhausted());
                if exhausted {
                    self.deny_step_up(&mut session, now, DenialCause::AttemptsExhausted).await?;
                } else if session.step_up_timed_out(now) {
                    self.deny_step_up(&mut session, now, DenialCause::Timeout).await?;
                }
            }
            _ => {}
        }
        Ok(session)
    }

    /// `Active → Expired`. Caller holds the session lock.
    ///
    /// The audit entry is written first: if it fails, the stored status stays
    /// `Active` and the clock keeps the session unusable until a later pass
    /// records it.
    async fn expire_session(
        &self,
        session: &mut ImpersonationSession,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut expired = session.clone();
        expired.expire(now)?;
        self.audit
            .record(
                AuditRecord::for_session(&expired, actions::session::EXPIRED, AuditOutcome::Success)
                    .with_detail(json!({ "expires_at": expired.expires_at })),
            )
            .await?;
        self.store.update_session(&expired).await?;
        *session = expired;

        tracing::info!(
            target: "impersonation.session.expired",
            session_id = %session.id,
            operator_id = %session.operator_id,
            "Impersonation session expired"
        );
        Ok(())
    }

    /// `PendingStepUp → DeniedStepUp`. Caller holds the session lock.
    ///
    /// Audited first, like expiry. If the entry cannot be written the stored
    /// session stays pending, and the exhausted challenge or the closed
    /// window keeps it unusable until a later call or sweep records it.
    async fn deny_step_up(
        &self,
        session: &mut ImpersonationSession,
        now: DateTime<Utc>,
        cause: DenialCause,
    ) -> Result<()> {
        let mut denied = session.clone();
        denied.deny_step_up(now, cause)?;
        self.record_denied(&denied, cause).await?;
        self.store.update_session(&denied).await?;
        if let Some(mut challenge) = self.store.get_challenge(&denied.id).await? {
            challenge.consume();
            self.store.save_challenge(&challenge).await?;
        }
        *session = denied;
        Ok(())
    }

    async fn record_activated(&self, session: &ImpersonationSession) -> Result<AuditEntry> {
        let entry = self
            .audit
            .record(
                AuditRecord::for_session(session, actions::session::ACTIVATED, AuditOutcome::Success)
                    .with_detail(json!({
                        "mode": session.mode,
                        "started_at": session.started_at,
                        "expires_at": session.expires_at,
                        "step_up": session.requires_step_up,
                    })),
            )
            .await?;

        tracing::info!(
            target: "impersonation.session.activated",
            session_id = %session.id,
            operator_id = %session.operator_id,
            tenant_id = %session.target_tenant_id,
            mode = session.mode.as_str(),
            "Impersonation session activated"
        );
        Ok(entry)
    }

    async fn record_denied(
        &self,
        session: &ImpersonationSession,
        cause: DenialCause,
    ) -> Result<()> {
        tracing::warn!(
            target: "impersonation.security_alert",
            alert = "step_up_denied",
            session_id = %session.id,
            operator_id = %session.operator_id,
            tenant_id = %session.target_tenant_id,
            cause = cause.as_str(),
            "Impersonation step-up denied"
        );
        self.audit
            .record(
                AuditRecord::for_session(
                    session,
                    actions::session::DENIED_STEP_UP,
                    AuditOutcome::Denied,
                )
                .with_detail(json!({ "cause": cause.as_str() })),
            )
            .await
            .map(|_| ())
    }

    async fn load(&self, session_id: &str) -> Result<ImpersonationSession> {
        self.store
            .get_session(session_id)
            .await?
            .ok_or(ImpersonationError::SessionNotFound)
    }
}

fn reject(req: &SessionRequest, err: &ImpersonationError) {
    tracing::warn!(
        target: "impersonation.session.rejected",
        operator_id = %req.operator_id,
        tenant_id = %req.tenant_id,
        reason = err.code(),
        "Session request rejected"
    );
}

/// Builder for [`SessionManager`].
///
/// Store, directory, operator tiers, second factors, and an audit sink are
/// required. The clock defaults to [`SystemClock`], the step-up strategy to
/// [`TierExemptionPolicy`].
#[must_use = "builder does nothing until you call build()"]
pub struct SessionManagerBuilder {
    store: Option<Arc<dyn ImpersonationStore>>,
    directory: Option<Arc<dyn Directory>>,
    tiers: Option<Arc<dyn OperatorTiers>>,
    factors: Option<Arc<dyn SecondFactorStore>>,
    audit_sink: Option<Arc<dyn AuditSink>>,
    step_up_policy: Arc<dyn StepUpPolicy>,
    clock: Arc<dyn Clock>,
    policy: ImpersonationPolicy,
    totp: TotpConfig,
}

impl Default for SessionManagerBuilder {
    fn default() -> Self {
        Self {
            store: None,
            directory: None,
            tiers: None,
            factors: None,
            audit_sink: None,
            step_up_policy: Arc::new(TierExemptionPolicy),
            clock: Arc::new(SystemClock),
            policy: ImpersonationPolicy::default(),
            totp: TotpConfig::default(),
        }
    }
}

impl SessionManagerBuilder {
    pub fn store(mut self, store: impl ImpersonationStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn directory(mut self, directory: impl Directory + 'static) -> Self {
        self.directory = Some(Arc::new(directory));
        self
    }

    pub fn operator_tiers(mut self, tiers: impl OperatorTiers + 'static) -> Self {
        self.tiers = Some(Arc::new(tiers));
        self
    }

    pub fn second_factors(mut self, factors: impl SecondFactorStore + 'static) -> Self {
        self.factors = Some(Arc::new(factors));
        self
    }

    pub fn audit_sink(mut self, sink: impl AuditSink + 'static) -> Self {
        self.audit_sink = Some(Arc::new(sink));
        self
    }

    pub fn step_up_policy(mut self, policy: impl StepUpPolicy + 'static) -> Self {
        self.step_up_policy = Arc::new(policy);
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn policy(mut self, policy: ImpersonationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn totp(mut self, totp: TotpConfig) -> Self {
        self.totp = totp;
        self
    }

    /// Take policy and TOTP settings from a loaded [`Config`].
    pub fn config(self, config: &Config) -> Self {
        self.policy(config.impersonation.clone())
            .totp(config.totp.clone())
    }

    /// Validate configuration and assemble the manager.
    ///
    /// # Errors
    ///
    /// Returns [`ImpersonationError::InvalidConfig`] if a required
    /// collaborator is missing or the policy or TOTP settings are invalid.
    pub fn build(self) -> Result<SessionManager> {
        self.policy.validate()?;
        self.totp.validate()?;

        let store = self.store.ok_or_else(|| missing("store"))?;
        let directory = self.directory.ok_or_else(|| missing("directory"))?;
        let tiers = self.tiers.ok_or_else(|| missing("operator_tiers"))?;
        let factors = self.factors.ok_or_else(|| missing("second_factors"))?;
        let audit_sink = self.audit_sink.ok_or_else(|| missing("audit_sink"))?;

        let verifier = StepUpVerifier::new(
            factors,
            TotpVerifier::new(self.totp),
            Arc::clone(&self.clock),
        );
        let audit = AuditRecorder::new(audit_sink, Arc::clone(&self.clock));

        Ok(SessionManager {
            store,
            directory,
            tiers,
            step_up_policy: self.step_up_policy,
            verifier,
            audit,
            clock: self.clock,
            policy: self.policy,
            operator_locks: KeyedLocks::new(),
            session_locks: KeyedLocks::new(),
        })
    }
}

fn missing(what: &str) -> ImpersonationError {
    ImpersonationError::invalid_config(format!("SessionManager requires {what}"))
}

/// The error every step-up call returns once a session has been denied.
fn denial_error(session: &ImpersonationSession) -> ImpersonationError {
    match session.denial_cause {
        Some(DenialCause::AttemptsExhausted) => ImpersonationError::AttemptsExhausted,
        _ => ImpersonationError::StepUpExpired,
    }
}
