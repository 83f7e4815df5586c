//! Error types for impersonation operations.
//!
//! Every variant carries a stable reason code (see [`ImpersonationError::code`])
//! that clients can use to drive messaging. Messages never explain *why* a
//! verification code was rejected.

#[cfg(feature = "http")]
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ImpersonationError>;

/// Broad error categories.
///
/// Callers branch on the category rather than on individual variants when
/// they only need to know whether a retry makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Input rejected before any state change.
    Validation,
    /// Another open session already exists.
    Conflict,
    /// Second-factor challenge failed.
    AuthChallenge,
    /// The session or its verification window has passed its deadline.
    Expired,
    /// The audit sink refused the write; the triggering action is denied.
    AuditUnavailable,
    /// Referenced session or target does not exist.
    NotFound,
    /// Caller lacks the capability for the action.
    Forbidden,
    /// The session is in the wrong state for the operation.
    State,
    /// Storage or unexpected internal failure.
    Internal,
}

/// The main error type for the impersonation subsystem.
#[derive(Debug, thiserror::Error)]
pub enum ImpersonationError {
    #[error("invalid duration: {0} minutes is not an allowed session length")]
    InvalidDuration(u32),

    #[error("a justification is required")]
    MissingJustification,

    #[error("justification must be at least {0} characters")]
    JustificationTooShort(usize),

    #[error("operators cannot impersonate themselves")]
    SelfImpersonation,

    #[error("operator already holds an open impersonation session")]
    ConcurrentSessionExists,

    #[error("impersonation target not found")]
    TargetNotFound,

    #[error("impersonation session not found")]
    SessionNotFound,

    #[error("session is not awaiting step-up verification")]
    NotPending,

    #[error("verification failed")]
    InvalidCode,

    #[error("too many verification attempts")]
    AttemptsExhausted,

    #[error("step-up verification window has closed")]
    StepUpExpired,

    #[error("session belongs to another operator")]
    NotOwner,

    #[error("session is not active")]
    NotActive,

    #[error("session expired")]
    SessionExpired,

    #[error("impersonation session is not valid for this request")]
    SessionInvalid,

    #[error("session is view-only")]
    ReadOnlySession,

    #[error("action is not permitted for the impersonated identity")]
    PermissionDenied,

    #[error("audit log unavailable: {0}")]
    AuditUnavailable(String),

    #[error("operator identity required")]
    Unauthenticated,

    #[error("caller is not a platform operator")]
    NotOperator,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl ImpersonationError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn audit_unavailable(msg: impl Into<String>) -> Self {
        Self::AuditUnavailable(msg.into())
    }

    /// Stable, machine-readable reason code.
    ///
    /// These strings are part of the public contract; UI surfaces key their
    /// messaging off them.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidDuration(_) => "invalid_duration",
            Self::MissingJustification => "missing_justification",
            Self::JustificationTooShort(_) => "justification_too_short",
            Self::SelfImpersonation => "self_impersonation",
            Self::ConcurrentSessionExists => "concurrent_session_exists",
            Self::TargetNotFound => "target_not_found",
            Self::SessionNotFound => "session_not_found",
            Self::NotPending => "step_up_not_pending",
            Self::InvalidCode => "invalid_code",
            Self::AttemptsExhausted => "too_many_attempts",
            Self::StepUpExpired => "step_up_expired",
            Self::NotOwner => "not_owner",
            Self::NotActive => "session_not_active",
            Self::SessionExpired => "session_expired",
            Self::SessionInvalid => "session_invalid",
            Self::ReadOnlySession => "read_only_session",
            Self::PermissionDenied => "permission_denied",
            Self::AuditUnavailable(_) => "audit_unavailable",
            Self::Unauthenticated => "unauthenticated",
            Self::NotOperator => "not_operator",
            Self::BadRequest(_) => "bad_request",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Storage(_) | Self::Internal(_) | Self::Anyhow(_) => "internal_error",
        }
    }

    /// The error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidDuration(_)
            | Self::MissingJustification
            | Self::JustificationTooShort(_)
            | Self::SelfImpersonation
            | Self::BadRequest(_)
            | Self::InvalidConfig(_) => ErrorKind::Validation,
            Self::ConcurrentSessionExists => ErrorKind::Conflict,
            Self::InvalidCode | Self::AttemptsExhausted => ErrorKind::AuthChallenge,
            Self::StepUpExpired | Self::SessionExpired => ErrorKind::Expired,
            Self::AuditUnavailable(_) => ErrorKind::AuditUnavailable,
            Self::TargetNotFound | Self::SessionNotFound => ErrorKind::NotFound,
            Self::NotOwner
            | Self::SessionInvalid
            | Self::ReadOnlySession
            | Self::PermissionDenied
            | Self::Unauthenticated
            | Self::NotOperator => ErrorKind::Forbidden,
            Self::NotPending | Self::NotActive => ErrorKind::State,
            Self::Storage(_) | Self::Internal(_) | Self::Anyhow(_) => ErrorKind::Internal,
        }
    }

    /// Returns a message that is safe to show to clients.
    ///
    /// Server-side failures collapse to a generic message so storage or
    /// audit details never reach the caller.
    pub fn safe_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "Internal server error".to_string(),
            ErrorKind::AuditUnavailable => "Service temporarily unavailable".to_string(),
            _ => self.to_string(),
        }
    }

    #[cfg(feature = "http")]
    fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict | ErrorKind::State => StatusCode::CONFLICT,
            ErrorKind::AuthChallenge => match self {
                Self::AttemptsExhausted => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::UNAUTHORIZED,
            },
            ErrorKind::Expired => StatusCode::GONE,
            ErrorKind::AuditUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Forbidden => match self {
                Self::Unauthenticated => StatusCode::UNAUTHORIZED,
                _ => StatusCode::FORBIDDEN,
            },
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON body returned for failed requests.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    pub error_id: String,
}

#[cfg(feature = "http")]
impl IntoResponse for ImpersonationError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!(
                status = status.as_u16(),
                error_id = %error_id,
                error = %self,
                "Request failed"
            );
        }

        let body = ErrorResponse {
            error: self.safe_message(),
            code: self.code(),
            error_id,
        };

        (status, Json(body)).into_response()
    }
}
