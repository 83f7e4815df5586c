use crate::error::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Action patterns a principal may perform.
///
/// A pattern is `*` (anything), `prefix*`, `*suffix`, or an exact action name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    patterns: HashSet<String>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn allow(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.insert(pattern.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether any pattern covers `action`.
    pub fn allows(&self, action: &str) -> bool {
        self.patterns.iter().any(|pattern| matches(pattern, action))
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            patterns: iter.into_iter().map(Into::into).collect(),
        }
    }
}

fn matches(pattern: &str, action: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return action.starts_with(prefix);
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return action.ends_with(suffix);
    }
    pattern == action
}

/// Looks up what the impersonated target is allowed to do.
///
/// Pre-tenant sessions pass `user_id = None` and get the tenant-level set.
#[async_trait]
pub trait PermissionResolver: Send + Sync {
    async fn effective_permissions(
        &self,
        tenant_id: &str,
        user_id: Option<&str>,
    ) -> Result<PermissionSet>;
}

/// In-memory resolver keyed by `(tenant, user)`. Unknown principals have no permissions.
#[derive(Clone, Default)]
pub struct InMemoryPermissionResolver {
    grants: Arc<RwLock<HashMap<(String, Option<String>), PermissionSet>>>,
}

impl InMemoryPermissionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn grant(&self, tenant_id: &str, user_id: Option<&str>, permissions: PermissionSet) {
        self.grants.write().await.insert(
            (tenant_id.to_string(), user_id.map(str::to_string)),
            permissions,
        );
    }
}

#[async_trait]
impl PermissionResolver for InMemoryPermissionResolver {
    async fn effective_permissions(
        &self,
        tenant_id: &str,
        user_id: Option<&str>,
    ) -> Result<PermissionSet> {
        Ok(self
            .grants
            .read()
            .await
            .get(&(tenant_id.to_string(), user_id.map(str::to_string)))
            .cloned()
            .unwrap_or_default())
    }
}
