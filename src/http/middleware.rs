use super::extractors::{OperatorIdentity, presented_session};
use crate::error::ImpersonationError;
use crate::gate::{AccessKind, Authorization, AuthorizationGate, GateRequest};
use axum::{
    extract::Request,
    http::Method,
    response::{IntoResponse, Response},
};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer that runs the [`AuthorizationGate`] for every request.
///
/// Requests without the `x-impersonation-session` header pass through
/// untouched. Requests with it are authorized against the session; on allow
/// the [`ImpersonatedIdentity`](crate::gate::ImpersonatedIdentity) and its
/// [`EffectiveContext`](crate::EffectiveContext) are inserted into request
/// extensions, otherwise the gate's error is returned as the response.
///
/// Access kind defaults to the HTTP method: `GET`, `HEAD` and `OPTIONS` read,
/// everything else mutates.
///
/// # Example
///
/// ```rust,ignore
/// let projects = Router::new()
///     .route("/projects/{id}", get(show).put(update))
///     .layer(ImpersonationLayer::new(gate.clone(), "projects"))
///     .layer(axum::middleware::from_fn(authenticate_operator));
/// ```
#[derive(Clone)]
pub struct ImpersonationLayer {
    gate: AuthorizationGate,
    resource: String,
    access: Option<AccessKind>,
}

impl ImpersonationLayer {
    /// Gate requests as actions on `resource`.
    ///
    /// The action name is `{resource}.read` or `{resource}.update`.
    pub fn new(gate: AuthorizationGate, resource: impl Into<String>) -> Self {
        Self {
            gate,
            resource: resource.into(),
            access: None,
        }
    }

    /// Force the access kind instead of deriving it from the method.
    #[must_use]
    pub fn access(mut self, access: AccessKind) -> Self {
        self.access = Some(access);
        self
    }
}

impl<S> Layer<S> for ImpersonationLayer {
    type Service = ImpersonationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ImpersonationService {
            inner,
            gate: self.gate.clone(),
            resource: self.resource.clone(),
            access: self.access,
        }
    }
}

/// Service produced by [`ImpersonationLayer`].
#[derive(Clone)]
pub struct ImpersonationService<S> {
    inner: S,
    gate: AuthorizationGate,
    resource: String,
    access: Option<AccessKind>,
}

impl<S> Service<Request> for ImpersonationService<S>
where
    S: Service<Request> + Clone + Send + 'static,
    S::Response: IntoResponse,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let session_id = match presented_session(req.headers()) {
            Ok(Some(session_id)) => session_id,
            Ok(None) => {
                let mut svc = self.inner.clone();
                return Box::pin(async move { Ok(svc.call(req).await?.into_response()) });
            }
            Err(e) => return Box::pin(async move { Ok(e.into_response()) }),
        };

        let access = self.access.unwrap_or_else(|| access_for(req.method()));
        let action = format!(
            "{}.{}",
            self.resource,
            match access {
                AccessKind::Read => "read",
                AccessKind::Mutate => "update",
            }
        );
        let operator = req.extensions().get::<OperatorIdentity>().cloned();
        let gate = self.gate.clone();

        // Drive the clone that was polled ready.
        let clone = self.inner.clone();
        let mut svc = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let Some(OperatorIdentity(operator_id)) = operator else {
                return Ok(ImpersonationError::Unauthenticated.into_response());
            };

            let request = GateRequest::new(operator_id, Some(session_id), action, access);
            match gate.authorize(&request).await {
                Ok(Authorization::Impersonated(identity)) => {
                    req.extensions_mut().insert(identity.context.clone());
                    req.extensions_mut().insert(identity);
                }
                Ok(Authorization::NotImpersonating) => {}
                Err(e) => return Ok(e.into_response()),
            }

            Ok(svc.call(req).await?.into_response())
        })
    }
}

fn access_for(method: &Method) -> AccessKind {
    if matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS) {
        AccessKind::Read
    } else {
        AccessKind::Mutate
    }
}
