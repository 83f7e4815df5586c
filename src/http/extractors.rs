use crate::error::ImpersonationError;
use crate::gate::ImpersonatedIdentity;
use crate::session::EffectiveContext;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::future::Future;

/// Header carrying the impersonation session id.
pub const SESSION_HEADER: &str = "x-impersonation-session";

/// The authenticated operator making the request.
///
/// gangway does not authenticate operators itself. The host's auth
/// middleware must insert this into request extensions; requests without it
/// are rejected with `401`.
///
/// # Example
///
/// ```rust,ignore
/// async fn whoami(OperatorIdentity(operator_id): OperatorIdentity) -> String {
///     operator_id
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorIdentity(pub String);

impl<S> FromRequestParts<S> for OperatorIdentity
where
    S: Send + Sync,
{
    type Rejection = ImpersonationError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let identity = parts.extensions.get::<OperatorIdentity>().cloned();
        async move { identity.ok_or(ImpersonationError::Unauthenticated) }
    }
}

/// The resolved target of an impersonated request.
///
/// Present only behind [`ImpersonationLayer`](super::ImpersonationLayer) when
/// the request presented a session and the gate allowed it. Handlers that
/// need the target should use this, never the operator's own identity.
#[derive(Debug, Clone)]
pub struct Impersonated(pub EffectiveContext);

impl<S> FromRequestParts<S> for Impersonated
where
    S: Send + Sync,
{
    type Rejection = ImpersonationError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let identity = parts.extensions.get::<ImpersonatedIdentity>().cloned();
        async move {
            identity
                .map(|identity| Impersonated(identity.context))
                .ok_or(ImpersonationError::SessionInvalid)
        }
    }
}

/// Like [`Impersonated`], but `None` for ordinary (non-impersonated) requests.
#[derive(Debug, Clone)]
pub struct OptionalImpersonation(pub Option<EffectiveContext>);

impl<S> FromRequestParts<S> for OptionalImpersonation
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let context = parts
            .extensions
            .get::<ImpersonatedIdentity>()
            .map(|identity| identity.context.clone());
        async move { Ok(OptionalImpersonation(context)) }
    }
}

/// The presented session id.
///
/// An absent header means no session. A header that is present but empty or
/// not valid text is a bad session, never "no session".
pub(crate) fn presented_session(
    headers: &axum::http::HeaderMap,
) -> Result<Option<String>, ImpersonationError> {
    let Some(value) = headers.get(SESSION_HEADER) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| Some(v.to_string()))
        .ok_or(ImpersonationError::SessionInvalid)
}
