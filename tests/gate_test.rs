//! Authorization gate decisions and their audit trail.

use chrono::Duration;
use gangway::audit::actions;
use gangway::testing::{Harness, INACTIVE_TENANT, OPERATOR, OTHER_OPERATOR, TENANT, USER};
use gangway::{
    AccessKind, AuditOutcome, Authorization, GateRequest, ImpersonationError, ImpersonationMode,
    Justification, SessionRequest,
};

fn gate_request(session_id: Option<&str>, action: &str, access: AccessKind) -> GateRequest {
    GateRequest::new(OPERATOR, session_id.map(str::to_string), action, access)
}

#[tokio::test]
async fn test_no_session_is_not_impersonating() {
    let h = Harness::new().await;

    let decision = h
        .gate
        .authorize(&gate_request(None, "projects.update", AccessKind::Mutate))
        .await
        .unwrap();

    assert_eq!(decision, Authorization::NotImpersonating);
    assert!(h.audit_sink.is_empty().await);
}

#[tokio::test]
async fn test_act_as_allows_permitted_mutation() {
    let h = Harness::new().await;
    let session = h.activate_act_as(60).await;

    let decision = h
        .gate
        .authorize(&gate_request(
            Some(&session.id),
            "projects.update",
            AccessKind::Mutate,
        ))
        .await
        .unwrap();

    let Authorization::Impersonated(identity) = decision else {
        panic!("expected impersonated decision");
    };
    assert_eq!(identity.context.tenant_id, TENANT);
    assert_eq!(identity.context.user_id.as_deref(), Some(USER));

    let entries = h.manager.audit().entries_for_session(&session.id).await.unwrap();
    let last = entries.last().unwrap();
    assert_eq!(last.id, identity.audit_entry_id);
    assert_eq!(last.action, actions::access("projects.update"));
    assert_eq!(last.action, "access.projects.update");
    assert_eq!(last.outcome, AuditOutcome::Success);
    assert_eq!(last.target_user_id.as_deref(), Some(USER));
}

#[tokio::test]
async fn test_action_outside_target_permissions_denied() {
    let h = Harness::new().await;
    let session = h.activate_act_as(60).await;

    let result = h
        .gate
        .authorize(&gate_request(
            Some(&session.id),
            "invoices.delete",
            AccessKind::Mutate,
        ))
        .await;
    assert!(matches!(result, Err(ImpersonationError::PermissionDenied)));

    let entries = h.manager.audit().entries_for_session(&session.id).await.unwrap();
    let last = entries.last().unwrap();
    assert_eq!(last.action, "access.invoices.delete");
    assert_eq!(last.outcome, AuditOutcome::Denied);
}

#[tokio::test]
async fn test_view_only_blocks_mutation_but_allows_reads() {
    let h = Harness::new().await;
    let session = h.request(ImpersonationMode::ViewOnly, 30).await.unwrap();

    // The target could update projects, but this session is view-only.
    let result = h
        .gate
        .authorize(&gate_request(
            Some(&session.id),
            "projects.update",
            AccessKind::Mutate,
        ))
        .await;
    assert!(matches!(result, Err(ImpersonationError::ReadOnlySession)));

    let decision = h
        .gate
        .authorize(&gate_request(
            Some(&session.id),
            "invoices.read",
            AccessKind::Read,
        ))
        .await
        .unwrap();
    assert!(matches!(decision, Authorization::Impersonated(_)));

    let outcomes: Vec<_> = h
        .manager
        .audit()
        .entries_for_session(&session.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.action.starts_with(actions::ACCESS_PREFIX))
        .map(|e| e.outcome)
        .collect();
    assert_eq!(outcomes, vec![AuditOutcome::Denied, AuditOutcome::Success]);
}

#[tokio::test]
async fn test_session_of_another_operator_is_invalid() {
    let h = Harness::new().await;
    let session = h.request(ImpersonationMode::ViewOnly, 30).await.unwrap();

    let req = GateRequest::new(
        OTHER_OPERATOR,
        Some(session.id.clone()),
        "invoices.read",
        AccessKind::Read,
    );
    assert!(matches!(
        h.gate.authorize(&req).await,
        Err(ImpersonationError::SessionInvalid)
    ));

    let entries = h.manager.audit().entries_for_session(&session.id).await.unwrap();
    assert_eq!(entries.last().unwrap().outcome, AuditOutcome::Denied);
}

#[tokio::test]
async fn test_unknown_session_is_invalid() {
    let h = Harness::new().await;

    let result = h
        .gate
        .authorize(&gate_request(
            Some("imp_does_not_exist"),
            "invoices.read",
            AccessKind::Read,
        ))
        .await;
    assert!(matches!(result, Err(ImpersonationError::SessionInvalid)));
}

#[tokio::test]
async fn test_pending_session_is_invalid() {
    let h = Harness::new().await;
    let session = h.request(ImpersonationMode::ActAs, 30).await.unwrap();

    let result = h
        .gate
        .authorize(&gate_request(
            Some(&session.id),
            "invoices.read",
            AccessKind::Read,
        ))
        .await;
    assert!(matches!(result, Err(ImpersonationError::SessionInvalid)));
}

#[tokio::test]
async fn test_expired_session_is_invalid() {
    let h = Harness::new().await;
    let session = h.request(ImpersonationMode::ViewOnly, 15).await.unwrap();

    h.clock.advance(Duration::minutes(15));
    let result = h
        .gate
        .authorize(&gate_request(
            Some(&session.id),
            "invoices.read",
            AccessKind::Read,
        ))
        .await;
    assert!(matches!(result, Err(ImpersonationError::SessionInvalid)));

    let entries = h.manager.audit().entries_for_session(&session.id).await.unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.action.as_str()).collect();
    assert!(names.contains(&actions::session::EXPIRED));
    assert_eq!(entries.last().unwrap().outcome, AuditOutcome::Denied);
}

#[tokio::test]
async fn test_revoked_session_is_invalid() {
    let h = Harness::new().await;
    let session = h.activate_act_as(30).await;
    let req = gate_request(Some(&session.id), "projects.update", AccessKind::Mutate);

    assert!(h.gate.authorize(&req).await.is_ok());
    h.manager.revoke_session(&session.id, "incident").await.unwrap();
    assert!(matches!(
        h.gate.authorize(&req).await,
        Err(ImpersonationError::SessionInvalid)
    ));
}

#[tokio::test]
async fn test_allow_fails_closed_without_audit() {
    let h = Harness::new().await;
    let session = h.request(ImpersonationMode::ViewOnly, 30).await.unwrap();

    h.audit_sink.set_available(false);
    let result = h
        .gate
        .authorize(&gate_request(
            Some(&session.id),
            "invoices.read",
            AccessKind::Read,
        ))
        .await;
    assert!(matches!(result, Err(ImpersonationError::AuditUnavailable(_))));

    // Denials still deny when the audit log is down.
    let result = h
        .gate
        .authorize(&gate_request(
            Some(&session.id),
            "projects.update",
            AccessKind::Mutate,
        ))
        .await;
    assert!(matches!(result, Err(ImpersonationError::ReadOnlySession)));
}

#[tokio::test]
async fn test_pre_tenant_session_uses_tenant_permissions() {
    let h = Harness::new().await;
    let req = SessionRequest::new(
        OPERATOR,
        TENANT,
        None,
        ImpersonationMode::ViewOnly,
        Justification::ticket("TICKET-4: tenant-wide billing view"),
        30,
    );
    let session = h.manager.request_session(req).await.unwrap();

    let decision = h
        .gate
        .authorize(&gate_request(
            Some(&session.id),
            "projects.read",
            AccessKind::Read,
        ))
        .await
        .unwrap();
    let Authorization::Impersonated(identity) = decision else {
        panic!("expected impersonated decision");
    };
    assert_eq!(identity.context.user_id, None);

    // Tenant-level grants are read-only.
    let result = h
        .gate
        .authorize(&gate_request(
            Some(&session.id),
            "projects.update",
            AccessKind::Read,
        ))
        .await;
    assert!(matches!(result, Err(ImpersonationError::PermissionDenied)));
}

#[tokio::test]
async fn test_target_without_permissions_gets_nothing() {
    let h = Harness::new().await;
    let req = SessionRequest::new(
        OPERATOR,
        INACTIVE_TENANT,
        None,
        ImpersonationMode::ViewOnly,
        Justification::ticket("TICKET-5: dormant tenant review"),
        15,
    );
    let session = h.manager.request_session(req).await.unwrap();

    let result = h
        .gate
        .authorize(&gate_request(
            Some(&session.id),
            "projects.read",
            AccessKind::Read,
        ))
        .await;
    assert!(matches!(result, Err(ImpersonationError::PermissionDenied)));
}
