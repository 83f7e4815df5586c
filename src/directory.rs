//! Tenant and user directory lookup.
//!
//! Read-only. Any failure here surfaces to callers as
//! [`ImpersonationError::TargetNotFound`].

use crate::error::{ImpersonationError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSummary {
    pub id: String,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantUser {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
}

/// Directory of selectable tenants and their users.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_tenants(&self) -> Result<Vec<TenantSummary>>;

    async fn find_tenant_users(&self, tenant_id: &str) -> Result<Vec<TenantUser>>;
}

/// A target confirmed to exist in the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub tenant: TenantSummary,
    pub user: Option<TenantUser>,
}

/// Confirm that the tenant (and user, if given) exist.
///
/// Lookup errors are logged and reported as `TargetNotFound`; inactive
/// tenants are still valid targets.
pub async fn resolve_target(
    directory: &dyn Directory,
    tenant_id: &str,
    user_id: Option<&str>,
) -> Result<ResolvedTarget> {
    let tenants = directory.find_tenants().await.map_err(|e| {
        tracing::warn!(
            target: "impersonation.directory.error",
            tenant_id = %tenant_id,
            error = %e,
            "Directory lookup failed"
        );
        ImpersonationError::TargetNotFound
    })?;
    let tenant = tenants
        .into_iter()
        .find(|t| t.id == tenant_id)
        .ok_or(ImpersonationError::TargetNotFound)?;

    let user = match user_id {
        None => None,
        Some(user_id) => {
            let users = directory.find_tenant_users(tenant_id).await.map_err(|e| {
                tracing::warn!(
                    target: "impersonation.directory.error",
                    tenant_id = %tenant_id,
                    error = %e,
                    "Directory user lookup failed"
                );
                ImpersonationError::TargetNotFound
            })?;
            Some(
                users
                    .into_iter()
                    .find(|u| u.id == user_id)
                    .ok_or(ImpersonationError::TargetNotFound)?,
            )
        }
    };

    Ok(ResolvedTarget { tenant, user })
}

/// In-memory directory for development and tests.
#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    tenants: Arc<RwLock<Vec<TenantSummary>>>,
    users: Arc<RwLock<HashMap<String, Vec<TenantUser>>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_tenant(&self, id: &str, name: &str, active: bool) {
        self.tenants.write().await.push(TenantSummary {
            id: id.to_string(),
            name: name.to_string(),
            active,
        });
    }

    pub async fn add_user(&self, tenant_id: &str, id: &str, email: &str, role: &str) {
        self.users
            .write()
            .await
            .entry(tenant_id.to_string())
            .or_default()
            .push(TenantUser {
                id: id.to_string(),
                email: email.to_string(),
                full_name: email.split('@').next().unwrap_or(email).to_string(),
                role: role.to_string(),
            });
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn find_tenants(&self) -> Result<Vec<TenantSummary>> {
        Ok(self.tenants.read().await.clone())
    }

    async fn find_tenant_users(&self, tenant_id: &str) -> Result<Vec<TenantUser>> {
        Ok(self
            .users
            .read()
            .await
            .get(tenant_id)
            .cloned()
            .unwrap_or_default())
    }
}
