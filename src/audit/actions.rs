//! Audit action names.
//!
//! Every entry written by this crate uses one of these, so queries and
//! alerting rules never depend on ad-hoc strings.

/// Session lifecycle transitions.
pub mod session {
    /// An operator asked for a session.
    pub const REQUESTED: &str = "session.requested";

    /// The session became active.
    pub const ACTIVATED: &str = "session.activated";

    /// Verification failed too often or timed out.
    pub const DENIED_STEP_UP: &str = "session.denied_step_up";

    /// The session reached `expires_at`.
    pub const EXPIRED: &str = "session.expired";

    /// The owning operator ended the session.
    pub const ENDED: &str = "session.ended";

    /// A security operation terminated the session.
    pub const REVOKED: &str = "session.revoked";
}

/// Step-up verification.
pub mod step_up {
    /// A challenge was issued for a pending session.
    pub const CHALLENGE_ISSUED: &str = "step_up.challenge_issued";

    /// A code was checked (success or failure).
    pub const ATTEMPT: &str = "step_up.attempt";
}

/// Prefix for authorization decisions made while a session is presented.
pub const ACCESS_PREFIX: &str = "access.";

/// Action name for a gate decision on `action`.
pub fn access(action: &str) -> String {
    format!("{ACCESS_PREFIX}{action}")
}
