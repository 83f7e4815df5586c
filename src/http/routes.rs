use super::extractors::OperatorIdentity;
use super::response::{ApiResponse, CreatedResponse, JsonResponse, NoContentResponse};
use crate::directory::{TenantSummary, TenantUser};
use crate::error::{ImpersonationError, Result};
use crate::session::{
    ImpersonationMode, ImpersonationSession, Justification, SessionManager, SessionRequest,
    SessionStatus, SessionStatusView,
};
use crate::stepup::{StepUpChallenge, StepUpMethod};
use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shared state for the impersonation routes.
#[derive(Clone)]
pub struct ImpersonationState {
    pub manager: SessionManager,
}

impl ImpersonationState {
    pub fn new(manager: SessionManager) -> Self {
        Self { manager }
    }
}

/// Operator-facing routes.
///
/// Every route needs an [`OperatorIdentity`] in request extensions.
///
/// | Method | Path | Operation |
/// |--------|------|-----------|
/// | `POST` | `/impersonation/sessions` | request a session |
/// | `GET`  | `/impersonation/sessions/{id}` | session status |
/// | `POST` | `/impersonation/sessions/{id}/step-up` | begin step-up |
/// | `POST` | `/impersonation/sessions/{id}/step-up/verify` | complete step-up |
/// | `POST` | `/impersonation/sessions/{id}/end` | end the session |
/// | `GET`  | `/impersonation/tenants` | list tenants |
/// | `GET`  | `/impersonation/tenants/{id}/users` | list a tenant's users |
pub fn router(manager: SessionManager) -> Router {
    Router::new()
        .route("/impersonation/sessions", post(request_session))
        .route("/impersonation/sessions/{id}", get(session_status))
        .route("/impersonation/sessions/{id}/step-up", post(begin_step_up))
        .route(
            "/impersonation/sessions/{id}/step-up/verify",
            post(complete_step_up),
        )
        .route("/impersonation/sessions/{id}/end", post(end_session))
        .route("/impersonation/tenants", get(list_tenants))
        .route("/impersonation/tenants/{id}/users", get(list_tenant_users))
        .with_state(ImpersonationState::new(manager))
}

/// Revocation routes for security staff.
///
/// These bypass session ownership. Mount them behind the host's own
/// security-role check.
pub fn security_router(manager: SessionManager) -> Router {
    Router::new()
        .route("/impersonation/sessions/{id}/revoke", post(revoke_session))
        .route(
            "/impersonation/operators/{id}/revoke",
            post(revoke_operator_sessions),
        )
        .route(
            "/impersonation/tenants/{id}/revoke",
            post(revoke_tenant_sessions),
        )
        .with_state(ImpersonationState::new(manager))
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionBody {
    pub tenant_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub mode: ImpersonationMode,
    pub justification: Justification,
    pub duration_minutes: u32,
}

#[derive(Debug, Deserialize)]
pub struct VerifyStepUpBody {
    pub code: String,
    #[serde(default = "default_method")]
    pub method: StepUpMethod,
}

fn default_method() -> StepUpMethod {
    StepUpMethod::Totp
}

#[derive(Debug, Deserialize)]
pub struct RevokeBody {
    pub reason: String,
}

/// A session as shown to its operator.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: String,
    pub status: SessionStatus,
    pub mode: ImpersonationMode,
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub requires_step_up: bool,
    pub step_up_deadline: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<ImpersonationSession> for SessionResponse {
    fn from(session: ImpersonationSession) -> Self {
        Self {
            id: session.id,
            status: session.status,
            mode: session.mode,
            tenant_id: session.target_tenant_id,
            user_id: session.target_user_id,
            requires_step_up: session.requires_step_up,
            step_up_deadline: session.step_up_deadline,
            started_at: session.started_at,
            expires_at: session.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChallengeResponse {
    pub session_id: String,
    pub max_attempts: u32,
    pub remaining_attempts: u32,
}

impl From<StepUpChallenge> for ChallengeResponse {
    fn from(challenge: StepUpChallenge) -> Self {
        Self {
            remaining_attempts: challenge.remaining_attempts(),
            session_id: challenge.session_id,
            max_attempts: challenge.max_attempts,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RevokedResponse {
    pub revoked: usize,
}

async fn request_session(
    State(state): State<ImpersonationState>,
    OperatorIdentity(operator_id): OperatorIdentity,
    Json(body): Json<CreateSessionBody>,
) -> Result<CreatedResponse<SessionResponse>> {
    let session = state
        .manager
        .request_session(SessionRequest::new(
            operator_id,
            body.tenant_id,
            body.user_id,
            body.mode,
            body.justification,
            body.duration_minutes,
        ))
        .await?;

    let location = format!("/impersonation/sessions/{}", session.id);
    Ok(CreatedResponse::new(session.into(), location))
}

async fn session_status(
    State(state): State<ImpersonationState>,
    OperatorIdentity(operator_id): OperatorIdentity,
    Path(id): Path<String>,
) -> JsonResponse<SessionStatusView> {
    owned_session(&state.manager, &id, &operator_id).await?;
    Ok(Json(state.manager.get_session_status(&id).await?))
}

async fn begin_step_up(
    State(state): State<ImpersonationState>,
    OperatorIdentity(operator_id): OperatorIdentity,
    Path(id): Path<String>,
) -> Result<ApiResponse<ChallengeResponse>> {
    owned_session(&state.manager, &id, &operator_id).await?;
    let challenge = state.manager.begin_step_up(&id).await?;
    Ok(ApiResponse::success(challenge.into()))
}

async fn complete_step_up(
    State(state): State<ImpersonationState>,
    OperatorIdentity(operator_id): OperatorIdentity,
    Path(id): Path<String>,
    Json(body): Json<VerifyStepUpBody>,
) -> Result<ApiResponse<SessionResponse>> {
    owned_session(&state.manager, &id, &operator_id).await?;
    let session = state
        .manager
        .complete_step_up(&id, &body.code, body.method)
        .await?;
    Ok(ApiResponse::success_with_message(
        session.into(),
        "Step-up verified",
    ))
}

async fn end_session(
    State(state): State<ImpersonationState>,
    OperatorIdentity(operator_id): OperatorIdentity,
    Path(id): Path<String>,
) -> Result<NoContentResponse> {
    state.manager.end_session(&id, &operator_id).await?;
    Ok(NoContentResponse)
}

async fn list_tenants(
    State(state): State<ImpersonationState>,
    OperatorIdentity(operator_id): OperatorIdentity,
) -> JsonResponse<Vec<TenantSummary>> {
    state.manager.operator_tier(&operator_id).await?;
    let tenants = state
        .manager
        .directory()
        .find_tenants()
        .await
        .map_err(|_| ImpersonationError::TargetNotFound)?;
    Ok(Json(tenants))
}

async fn list_tenant_users(
    State(state): State<ImpersonationState>,
    OperatorIdentity(operator_id): OperatorIdentity,
    Path(tenant_id): Path<String>,
) -> JsonResponse<Vec<TenantUser>> {
    state.manager.operator_tier(&operator_id).await?;
    let users = state
        .manager
        .directory()
        .find_tenant_users(&tenant_id)
        .await
        .map_err(|_| ImpersonationError::TargetNotFound)?;
    Ok(Json(users))
}

async fn revoke_session(
    State(state): State<ImpersonationState>,
    OperatorIdentity(revoked_by): OperatorIdentity,
    Path(id): Path<String>,
    Json(body): Json<RevokeBody>,
) -> Result<NoContentResponse> {
    let reason = revoke_reason(&body, &revoked_by)?;
    state.manager.revoke_session(&id, &reason).await?;
    Ok(NoContentResponse)
}

async fn revoke_operator_sessions(
    State(state): State<ImpersonationState>,
    OperatorIdentity(revoked_by): OperatorIdentity,
    Path(operator_id): Path<String>,
    Json(body): Json<RevokeBody>,
) -> JsonResponse<RevokedResponse> {
    let reason = revoke_reason(&body, &revoked_by)?;
    let revoked = state
        .manager
        .revoke_sessions_for_operator(&operator_id, &reason)
        .await?;
    Ok(Json(RevokedResponse { revoked }))
}

async fn revoke_tenant_sessions(
    State(state): State<ImpersonationState>,
    OperatorIdentity(revoked_by): OperatorIdentity,
    Path(tenant_id): Path<String>,
    Json(body): Json<RevokeBody>,
) -> JsonResponse<RevokedResponse> {
    let reason = revoke_reason(&body, &revoked_by)?;
    let revoked = state
        .manager
        .revoke_sessions_for_tenant(&tenant_id, &reason)
        .await?;
    Ok(Json(RevokedResponse { revoked }))
}

fn revoke_reason(body: &RevokeBody, revoked_by: &str) -> Result<String> {
    let reason = body.reason.trim();
    if reason.is_empty() {
        return Err(ImpersonationError::bad_request("revocation reason is required"));
    }
    Ok(format!("{reason} (by {revoked_by})"))
}

/// Load a session and check the caller owns it.
async fn owned_session(
    manager: &SessionManager,
    session_id: &str,
    operator_id: &str,
) -> Result<ImpersonationSession> {
    let session = manager.get_session(session_id).await?;
    if session.operator_id != operator_id {
        return Err(ImpersonationError::NotOwner);
    }
    Ok(session)
}
