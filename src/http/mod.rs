//! HTTP surface: JSON routes for the session lifecycle, extractors, and the
//! gate middleware for impersonated requests.

pub mod extractors;
pub mod middleware;
pub mod response;
pub mod routes;

pub use extractors::{Impersonated, OperatorIdentity, OptionalImpersonation, SESSION_HEADER};
pub use middleware::{ImpersonationLayer, ImpersonationService};
pub use response::{ApiResponse, CreatedResponse, JsonResponse, NoContentResponse};
pub use routes::{ImpersonationState, router, security_router};
