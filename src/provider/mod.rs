//! Identity-provider capability consumed by the reconciliation engine.
//!
//! The engine only depends on the [`ScopeProvider`] trait. Two backends ship
//! with the crate:
//! - [`HttpScopeProvider`]: REST client for a Maskinporten-style scope API
//! - [`MemoryScopeProvider`]: in-process provider that records every call
//!   (used by the test suites)

mod http;
mod memory;
mod retry;

use std::fmt;

use async_trait::async_trait;
pub use http::HttpScopeProvider;
pub use memory::{MemoryScopeProvider, ProviderCall};
use thiserror::Error;

use crate::{
    models::{
        ConsumerRegistration, DeclaredScopes, ScopeRegistration, ScopeRegistrationRequest,
    },
    reconcile::ScopeStash,
};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("request cancelled")]
    Cancelled,
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Operations offered by the provider. Used for call logs and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderOperation {
    ListScopes,
    GetScopeAcl,
    AddToScopeAcl,
    DeactivateConsumer,
    RegisterScope,
    UpdateScope,
    ActivateScope,
    DeleteScope,
}

impl ProviderOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListScopes => "list_scopes",
            Self::GetScopeAcl => "get_scope_acl",
            Self::AddToScopeAcl => "add_to_scope_acl",
            Self::DeactivateConsumer => "deactivate_consumer",
            Self::RegisterScope => "register_scope",
            Self::UpdateScope => "update_scope",
            Self::ActivateScope => "activate_scope",
            Self::DeleteScope => "delete_scope",
        }
    }

    /// True for operations that change provider state.
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::ListScopes | Self::GetScopeAcl)
    }
}

impl fmt::Display for ProviderOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scope and ACL operations required from the identity provider.
///
/// Every call may fail with a [`ProviderError`]. Implementations hold their
/// own authentication context; cancellation is applied by the caller.
#[async_trait]
pub trait ScopeProvider: Send + Sync {
    /// List every registration (active and inactive) under a prefix.
    async fn list_scopes(&self, prefix: &str) -> ProviderResult<Vec<ScopeRegistration>>;

    /// Partition declared scopes against the provider's registrations.
    ///
    /// Any listing failure aborts the whole diff; no partial result is returned.
    async fn get_filtered_scopes(
        &self,
        declared: &DeclaredScopes,
        cluster: &str,
    ) -> ProviderResult<ScopeStash> {
        let registered = self.list_scopes(cluster).await?;
        Ok(ScopeStash::partition(declared, cluster, registered))
    }

    /// Current ACL rows for a scope, in provider order.
    async fn get_scope_acl(&self, scope: &str) -> ProviderResult<Vec<ConsumerRegistration>>;

    async fn add_to_scope_acl(
        &self,
        scope: &str,
        consumer: &str,
    ) -> ProviderResult<ConsumerRegistration>;

    /// Soft-remove a consumer. The ACL row stays with a denied state.
    async fn deactivate_consumer(
        &self,
        scope: &str,
        consumer: &str,
    ) -> ProviderResult<ConsumerRegistration>;

    async fn register_scope(
        &self,
        payload: &ScopeRegistrationRequest,
    ) -> ProviderResult<ScopeRegistration>;

    async fn update_scope(
        &self,
        payload: &ScopeRegistrationRequest,
        scope: &str,
    ) -> ProviderResult<ScopeRegistration>;

    async fn activate_scope(
        &self,
        payload: &ScopeRegistrationRequest,
        scope: &str,
    ) -> ProviderResult<ScopeRegistration>;

    /// Deactivate a scope. Registrations are never hard-deleted.
    async fn delete_scope(&self, scope: &str) -> ProviderResult<ScopeRegistration>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_operations() {
        assert!(!ProviderOperation::ListScopes.is_write());
        assert!(!ProviderOperation::GetScopeAcl.is_write());
        assert!(ProviderOperation::RegisterScope.is_write());
        assert!(ProviderOperation::DeactivateConsumer.is_write());
        assert!(ProviderOperation::DeleteScope.is_write());
    }
}
