//! Request-time authorization for impersonated requests.
//!
//! The gate answers one question per request: "on whose behalf does this run,
//! and may it?" A presented session either resolves to a live
//! [`EffectiveContext`] or the request is refused. There is no fallback to
//! the operator's own identity.

mod permissions;

pub use permissions::{InMemoryPermissionResolver, PermissionResolver, PermissionSet};

use crate::audit::{AuditOutcome, AuditRecord, actions};
use crate::error::{ImpersonationError, Result};
use crate::session::{EffectiveContext, ImpersonationMode, ImpersonationSession, SessionManager};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Whether an action only reads or can change state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    Read,
    Mutate,
}

impl AccessKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Mutate => "mutate",
        }
    }
}

/// One authorization question.
#[derive(Debug, Clone)]
pub struct GateRequest {
    /// The authenticated operator making the request.
    pub operator_id: String,
    /// The impersonation session the request presents, if any.
    pub session_id: Option<String>,
    /// Action name, e.g. `projects.update`.
    pub action: String,
    pub access: AccessKind,
}

impl GateRequest {
    pub fn new(
        operator_id: impl Into<String>,
        session_id: Option<String>,
        action: impl Into<String>,
        access: AccessKind,
    ) -> Self {
        Self {
            operator_id: operator_id.into(),
            session_id,
            action: action.into(),
            access,
        }
    }
}

/// The identity an allowed impersonated request runs as.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpersonatedIdentity {
    pub context: EffectiveContext,
    /// Audit entry recording the allow decision.
    pub audit_entry_id: String,
}

/// Outcome of [`AuthorizationGate::authorize`].
#[derive(Debug, Clone, PartialEq)]
pub enum Authorization {
    /// No session presented; ordinary authorization applies.
    NotImpersonating,
    /// Run the request as the target.
    Impersonated(ImpersonatedIdentity),
}

/// Authorizes requests that present an impersonation session.
#[derive(Clone)]
pub struct AuthorizationGate {
    sessions: SessionManager,
    permissions: Arc<dyn PermissionResolver>,
}

impl AuthorizationGate {
    pub fn new(sessions: SessionManager, permissions: Arc<dyn PermissionResolver>) -> Self {
        Self {
            sessions,
            permissions,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Decide whether `req` may proceed, and as whom.
    ///
    /// Every decision on a presented session is audited. An allow is only
    /// returned once its audit entry is written.
    pub async fn authorize(&self, req: &GateRequest) -> Result<Authorization> {
        let Some(session_id) = req.session_id.as_deref() else {
            return Ok(Authorization::NotImpersonating);
        };

        let context = match self.sessions.get_effective_context(session_id).await {
            Ok(context) => context,
            Err(e) => {
                let session = self.sessions.get_session(session_id).await.ok();
                self.deny(req, session_id, session.as_ref(), None, e.code())
                    .await;
                return Err(ImpersonationError::SessionInvalid);
            }
        };

        if context.operator_id != req.operator_id {
            self.deny(req, session_id, None, Some(&context), "not_owner")
                .await;
            return Err(ImpersonationError::SessionInvalid);
        }

        if context.mode == ImpersonationMode::ViewOnly && req.access == AccessKind::Mutate {
            let err = ImpersonationError::ReadOnlySession;
            self.deny(req, session_id, None, Some(&context), err.code())
                .await;
            return Err(err);
        }

        let permissions = match self
            .permissions
            .effective_permissions(&context.tenant_id, context.user_id.as_deref())
            .await
        {
            Ok(permissions) => permissions,
            Err(e) => {
                let record = context_record(&context, &req.action, AuditOutcome::Error)
                    .with_detail(json!({ "access": req.access }));
                if let Err(audit_err) = self.sessions.audit().record(record).await {
                    tracing::error!(
                        target: "impersonation.gate.denied",
                        session_id = %session_id,
                        error = %audit_err,
                        "Failed to audit permission lookup failure"
                    );
                }
                return Err(e);
            }
        };

        if !permissions.allows(&req.action) {
            let err = ImpersonationError::PermissionDenied;
            self.deny(req, session_id, None, Some(&context), err.code())
                .await;
            return Err(err);
        }

        let entry = self
            .sessions
            .audit()
            .record(
                context_record(&context, &req.action, AuditOutcome::Success).with_detail(json!({
                    "access": req.access,
                    "mode": context.mode,
                })),
            )
            .await?;

        tracing::debug!(
            target: "impersonation.gate.allowed",
            session_id = %context.session_id,
            operator_id = %context.operator_id,
            action = %req.action,
            access = req.access.as_str(),
            "Impersonated request allowed"
        );

        Ok(Authorization::Impersonated(ImpersonatedIdentity {
            context,
            audit_entry_id: entry.id,
        }))
    }

    /// Record a denial. The denial stands even if the audit write fails.
    async fn deny(
        &self,
        req: &GateRequest,
        session_id: &str,
        session: Option<&ImpersonationSession>,
        context: Option<&EffectiveContext>,
        reason: &str,
    ) {
        tracing::warn!(
            target: "impersonation.gate.denied",
            session_id = %session_id,
            operator_id = %req.operator_id,
            action = %req.action,
            access = req.access.as_str(),
            reason = %reason,
            "Impersonated request denied"
        );

        let record = match (context, session) {
            (Some(context), _) => context_record(context, &req.action, AuditOutcome::Denied),
            (None, Some(session)) => AuditRecord::for_session(
                session,
                actions::access(&req.action),
                AuditOutcome::Denied,
            ),
            (None, None) => AuditRecord {
                session_id: session_id.to_string(),
                operator_id: req.operator_id.clone(),
                target_tenant_id: String::new(),
                target_user_id: None,
                action: actions::access(&req.action),
                outcome: AuditOutcome::Denied,
                detail: serde_json::Value::Null,
            },
        }
        .with_detail(json!({
            "access": req.access,
            "reason": reason,
            "presented_by": req.operator_id,
        }));

        if let Err(e) = self.sessions.audit().record(record).await {
            tracing::error!(
                target: "impersonation.gate.denied",
                session_id = %session_id,
                error = %e,
                "Failed to audit denial"
            );
        }
    }
}

fn context_record(context: &EffectiveContext, action: &str, outcome: AuditOutcome) -> AuditRecord {
    AuditRecord {
        session_id: context.session_id.clone(),
        operator_id: context.operator_id.clone(),
        target_tenant_id: context.tenant_id.clone(),
        target_user_id: context.user_id.clone(),
        action: actions::access(action),
        outcome,
        detail: serde_json::Value::Null,
    }
}
