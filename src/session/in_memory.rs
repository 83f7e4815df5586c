use super::storage::ImpersonationStore;
use super::types::ImpersonationSession;
use crate::error::{ImpersonationError, Result};
use crate::stepup::StepUpChallenge;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    sessions: HashMap<String, ImpersonationSession>,
    challenges: HashMap<String, StepUpChallenge>,
}

/// In-memory impersonation store.
///
/// Suitable for development and testing, but not for production (sessions are
/// lost on restart and not shared across instances).
#[derive(Clone, Default)]
pub struct InMemoryImpersonationStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryImpersonationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, terminal ones included.
    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    /// Number of stored challenges.
    pub async fn challenge_count(&self) -> usize {
        self.state.read().await.challenges.len()
    }
}

#[async_trait]
impl ImpersonationStore for InMemoryImpersonationStore {
    async fn create_session(&self, session: &ImpersonationSession) -> Result<()> {
        let mut state = self.state.write().await;

        if session.status.is_open()
            && state
                .sessions
                .values()
                .any(|s| s.operator_id == session.operator_id && s.status.is_open())
        {
            return Err(ImpersonationError::ConcurrentSessionExists);
        }
        if state.sessions.contains_key(&session.id) {
            return Err(ImpersonationError::storage(format!(
                "duplicate session id {}",
                session.id
            )));
        }

        state.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<ImpersonationSession>> {
        Ok(self.state.read().await.sessions.get(session_id).cloned())
    }

    async fn update_session(&self, session: &ImpersonationSession) -> Result<()> {
        let mut state = self.state.write().await;
        match state.sessions.get_mut(&session.id) {
            Some(existing) => {
                *existing = session.clone();
                Ok(())
            }
            None => Err(ImpersonationError::SessionNotFound),
        }
    }

    async fn open_session_for_operator(
        &self,
        operator_id: &str,
    ) -> Result<Option<ImpersonationSession>> {
        Ok(self
            .state
            .read()
            .await
            .sessions
            .values()
            .find(|s| s.operator_id == operator_id && s.status.is_open())
            .cloned())
    }

    async fn list_open_sessions(&self) -> Result<Vec<ImpersonationSession>> {
        Ok(self
            .state
            .read()
            .await
            .sessions
            .values()
            .filter(|s| s.status.is_open())
            .cloned()
            .collect())
    }

    async fn get_challenge(&self, session_id: &str) -> Result<Option<StepUpChallenge>> {
        Ok(self.state.read().await.challenges.get(session_id).cloned())
    }

    async fn save_challenge(&self, challenge: &StepUpChallenge) -> Result<()> {
        self.state
            .write()
            .await
            .challenges
            .insert(challenge.session_id.clone(), challenge.clone());
        Ok(())
    }

    async fn purge_consumed_challenges(&self, before: DateTime<Utc>) -> Result<usize> {
        let mut state = self.state.write().await;
        let initial_len = state.challenges.len();
        state
            .challenges
            .retain(|_, c| !(c.consumed && c.issued_at < before));
        Ok(initial_len - state.challenges.len())
    }
}
