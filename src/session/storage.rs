use super::types::ImpersonationSession;
use crate::error::Result;
use crate::stepup::StepUpChallenge;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Persistence for sessions and their step-up challenges.
///
/// Only the [`SessionManager`](super::SessionManager) writes through this
/// trait.
#[async_trait]
pub trait ImpersonationStore: Send + Sync {
    /// Store a new session.
    ///
    /// Must fail with [`ImpersonationError::ConcurrentSessionExists`] if the
    /// operator already has a non-terminal session. Backends with a database
    /// should enforce this with a unique index on `(operator_id)` filtered to
    /// open statuses.
    ///
    /// [`ImpersonationError::ConcurrentSessionExists`]: crate::ImpersonationError::ConcurrentSessionExists
    async fn create_session(&self, session: &ImpersonationSession) -> Result<()>;

    /// Get a session by ID.
    async fn get_session(&self, session_id: &str) -> Result<Option<ImpersonationSession>>;

    /// Replace the stored session with `session`.
    async fn update_session(&self, session: &ImpersonationSession) -> Result<()>;

    /// The operator's non-terminal session, if any.
    async fn open_session_for_operator(
        &self,
        operator_id: &str,
    ) -> Result<Option<ImpersonationSession>>;

    /// All non-terminal sessions.
    async fn list_open_sessions(&self) -> Result<Vec<ImpersonationSession>>;

    /// Get the step-up challenge for a session.
    async fn get_challenge(&self, session_id: &str) -> Result<Option<StepUpChallenge>>;

    /// Insert or replace a challenge.
    async fn save_challenge(&self, challenge: &StepUpChallenge) -> Result<()>;

    /// Delete consumed challenges issued before `before`. Returns the number removed.
    async fn purge_consumed_challenges(&self, before: DateTime<Utc>) -> Result<usize>;
}
