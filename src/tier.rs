//! Operator privilege tiers.
//!
//! Whether a session needs step-up is decided by a [`StepUpPolicy`] strategy
//! over the operator's tier, so new tiers never touch the state machine.

use crate::error::{ImpersonationError, Result};
use crate::session::ImpersonationMode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// An operator's privilege tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorTier {
    pub name: String,
    /// Standing authorization already counts as step-up.
    pub exempt_from_step_up: bool,
}

impl OperatorTier {
    pub fn new(name: impl Into<String>, exempt_from_step_up: bool) -> Self {
        Self {
            name: name.into(),
            exempt_from_step_up,
        }
    }

    /// A regular support operator.
    pub fn support() -> Self {
        Self::new("support", false)
    }

    /// A top-level operator exempt from step-up.
    pub fn super_operator() -> Self {
        Self::new("super_operator", true)
    }
}

/// Lookup of operator tiers.
#[async_trait]
pub trait OperatorTiers: Send + Sync {
    /// The operator's tier, or `None` if the identity is not an operator.
    async fn get_operator_tier(&self, operator_id: &str) -> Result<Option<OperatorTier>>;
}

/// Decides whether a session requires step-up.
pub trait StepUpPolicy: Send + Sync {
    fn requires_step_up(&self, tier: &OperatorTier, mode: ImpersonationMode) -> bool;
}

/// View-only never needs step-up; act-as needs it unless the tier is exempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct TierExemptionPolicy;

impl StepUpPolicy for TierExemptionPolicy {
    fn requires_step_up(&self, tier: &OperatorTier, mode: ImpersonationMode) -> bool {
        match mode {
            ImpersonationMode::ViewOnly => false,
            ImpersonationMode::ActAs => !tier.exempt_from_step_up,
        }
    }
}

/// Resolve the tier or fail with [`ImpersonationError::NotOperator`].
pub(crate) async fn require_operator(
    tiers: &dyn OperatorTiers,
    operator_id: &str,
) -> Result<OperatorTier> {
    tiers
        .get_operator_tier(operator_id)
        .await?
        .ok_or(ImpersonationError::NotOperator)
}

/// In-memory tier lookup.
#[derive(Clone, Default)]
pub struct InMemoryOperatorTiers {
    tiers: Arc<RwLock<HashMap<String, OperatorTier>>>,
}

impl InMemoryOperatorTiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_tier(&self, operator_id: &str, tier: OperatorTier) {
        self.tiers.write().await.insert(operator_id.to_string(), tier);
    }
}

#[async_trait]
impl OperatorTiers for InMemoryOperatorTiers {
    async fn get_operator_tier(&self, operator_id: &str) -> Result<Option<OperatorTier>> {
        Ok(self.tiers.read().await.get(operator_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exemption_policy() {
        let policy = TierExemptionPolicy;
        let support = OperatorTier::support();
        let root = OperatorTier::super_operator();

        assert!(!policy.requires_step_up(&support, ImpersonationMode::ViewOnly));
        assert!(policy.requires_step_up(&support, ImpersonationMode::ActAs));
        assert!(!policy.requires_step_up(&root, ImpersonationMode::ActAs));
    }

    #[tokio::test]
    async fn test_unknown_identity_is_not_operator() {
        let tiers = InMemoryOperatorTiers::new();
        tiers.set_tier("op-1", OperatorTier::support()).await;

        assert_eq!(
            require_operator(&tiers, "op-1").await.unwrap().name,
            "support"
        );
        assert!(matches!(
            require_operator(&tiers, "user-9").await,
            Err(ImpersonationError::NotOperator)
        ));
    }
}
