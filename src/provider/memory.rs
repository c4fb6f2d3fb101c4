use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::{ProviderError, ProviderOperation, ProviderResult, ScopeProvider};
use crate::models::{
    ConsumerRegistration, ConsumerState, ScopeRegistration, ScopeRegistrationRequest,
    qualified_name,
};

/// A call received by [`MemoryScopeProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    pub operation: ProviderOperation,
    /// Scope prefix for listings, qualified scope name otherwise.
    pub scope: String,
    pub consumer: Option<String>,
}

impl ProviderCall {
    fn new(operation: ProviderOperation, scope: &str, consumer: Option<&str>) -> Self {
        Self {
            operation,
            scope: scope.to_string(),
            consumer: consumer.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    operation: ProviderOperation,
    /// Scope or consumer the failure is restricted to. `None` matches every call.
    target: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    scopes: BTreeMap<String, ScopeRegistration>,
    acls: BTreeMap<String, Vec<ConsumerRegistration>>,
    calls: Vec<ProviderCall>,
    failures: Vec<InjectedFailure>,
}

impl MemoryState {
    /// Record the call and return an error if a matching failure was injected.
    fn enter(&mut self, call: ProviderCall) -> ProviderResult<()> {
        let failed = self.failures.iter().any(|f| {
            f.operation == call.operation
                && f.target
                    .as_deref()
                    .is_none_or(|t| t == call.scope || call.consumer.as_deref() == Some(t))
        });
        let operation = call.operation;
        self.calls.push(call);

        if failed {
            return Err(ProviderError::Unavailable(format!(
                "injected failure for {operation}"
            )));
        }
        Ok(())
    }

    fn scope_mut(&mut self, scope: &str) -> ProviderResult<&mut ScopeRegistration> {
        self.scopes
            .get_mut(scope)
            .ok_or_else(|| ProviderError::NotFound(format!("scope '{scope}'")))
    }
}

/// In-process scope provider.
///
/// Holds scopes and ACLs in memory and keeps a log of every call so callers
/// can assert exactly which provider operations a pass issued.
#[derive(Debug, Default)]
pub struct MemoryScopeProvider {
    state: Mutex<MemoryState>,
}

impl MemoryScopeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing registration without recording a call.
    pub fn seed_scope(&self, cluster: &str, subscope: &str, active: bool) -> ScopeRegistration {
        let registration = ScopeRegistration {
            name: qualified_name(cluster, subscope),
            prefix: cluster.to_string(),
            subscope: subscope.to_string(),
            description: String::new(),
            active,
            at_max_age: None,
            allowed_integration_types: Vec::new(),
            created: Some(Utc::now()),
            last_updated: None,
        };
        self.seed_registration(registration.clone());
        registration
    }

    /// Seed a registration whose attributes already match `payload`.
    pub fn seed_matching(
        &self,
        payload: &ScopeRegistrationRequest,
        active: bool,
    ) -> ScopeRegistration {
        let registration = ScopeRegistration {
            name: payload.qualified_name(),
            prefix: payload.prefix.clone(),
            subscope: payload.subscope.clone(),
            description: payload.description.clone(),
            active,
            at_max_age: payload.at_max_age,
            allowed_integration_types: payload.allowed_integration_types.clone(),
            created: Some(Utc::now()),
            last_updated: None,
        };
        self.seed_registration(registration.clone());
        registration
    }

    pub fn seed_registration(&self, registration: ScopeRegistration) {
        self.state
            .lock()
            .scopes
            .insert(registration.name.clone(), registration);
    }

    /// Seed an ACL row without recording a call.
    pub fn seed_consumer(&self, scope: &str, orgno: &str, state: ConsumerState) {
        let mut guard = self.state.lock();
        let acl = guard.acls.entry(scope.to_string()).or_default();
        acl.retain(|entry| entry.consumer_orgno != orgno);
        acl.push(ConsumerRegistration {
            scope: scope.to_string(),
            consumer_orgno: orgno.to_string(),
            state,
            created: Some(Utc::now()),
            last_updated: None,
        });
    }

    /// Fail every call of `operation`.
    pub fn fail_on(&self, operation: ProviderOperation) {
        self.state.lock().failures.push(InjectedFailure {
            operation,
            target: None,
        });
    }

    /// Fail calls of `operation` whose scope or consumer equals `target`.
    pub fn fail_on_target(&self, operation: ProviderOperation, target: impl Into<String>) {
        self.state.lock().failures.push(InjectedFailure {
            operation,
            target: Some(target.into()),
        });
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.state.lock().calls.clone()
    }

    /// Calls that changed (or attempted to change) provider state.
    pub fn write_calls(&self) -> Vec<ProviderCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.operation.is_write())
            .cloned()
            .collect()
    }

    pub fn calls_of(&self, operation: ProviderOperation) -> Vec<ProviderCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn scope(&self, name: &str) -> Option<ScopeRegistration> {
        self.state.lock().scopes.get(name).cloned()
    }

    pub fn acl(&self, scope: &str) -> Vec<ConsumerRegistration> {
        self.state
            .lock()
            .acls
            .get(scope)
            .cloned()
            .unwrap_or_default()
    }

    /// Consumers currently approved for `scope`.
    pub fn active_consumers(&self, scope: &str) -> BTreeSet<String> {
        self.acl(scope)
            .into_iter()
            .filter(ConsumerRegistration::is_active)
            .map(|entry| entry.consumer_orgno)
            .collect()
    }

    fn apply_attributes(registration: &mut ScopeRegistration, payload: &ScopeRegistrationRequest) {
        registration.description = payload.description.clone();
        registration.at_max_age = payload.at_max_age;
        registration.allowed_integration_types = payload.allowed_integration_types.clone();
        registration.last_updated = Some(Utc::now());
    }

    fn set_consumer_state(
        state: &mut MemoryState,
        scope: &str,
        consumer: &str,
        consumer_state: ConsumerState,
    ) -> ProviderResult<ConsumerRegistration> {
        if !state.scopes.contains_key(scope) {
            return Err(ProviderError::NotFound(format!("scope '{scope}'")));
        }

        let acl = state.acls.entry(scope.to_string()).or_default();
        let now = Utc::now();
        match acl.iter_mut().find(|entry| entry.consumer_orgno == consumer) {
            Some(entry) => {
                entry.state = consumer_state;
                entry.last_updated = Some(now);
                Ok(entry.clone())
            }
            None if consumer_state == ConsumerState::Approved => {
                let entry = ConsumerRegistration {
                    scope: scope.to_string(),
                    consumer_orgno: consumer.to_string(),
                    state: consumer_state,
                    created: Some(now),
                    last_updated: Some(now),
                };
                acl.push(entry.clone());
                Ok(entry)
            }
            None => Err(ProviderError::NotFound(format!(
                "consumer '{consumer}' in ACL of '{scope}'"
            ))),
        }
    }
}

#[async_trait]
impl ScopeProvider for MemoryScopeProvider {
    async fn list_scopes(&self, prefix: &str) -> ProviderResult<Vec<ScopeRegistration>> {
        let mut state = self.state.lock();
        state.enter(ProviderCall::new(ProviderOperation::ListScopes, prefix, None))?;
        Ok(state
            .scopes
            .values()
            .filter(|s| s.prefix == prefix)
            .cloned()
            .collect())
    }

    async fn get_scope_acl(&self, scope: &str) -> ProviderResult<Vec<ConsumerRegistration>> {
        let mut state = self.state.lock();
        state.enter(ProviderCall::new(ProviderOperation::GetScopeAcl, scope, None))?;
        Ok(state.acls.get(scope).cloned().unwrap_or_default())
    }

    async fn add_to_scope_acl(
        &self,
        scope: &str,
        consumer: &str,
    ) -> ProviderResult<ConsumerRegistration> {
        let mut state = self.state.lock();
        state.enter(ProviderCall::new(
            ProviderOperation::AddToScopeAcl,
            scope,
            Some(consumer),
        ))?;
        Self::set_consumer_state(&mut state, scope, consumer, ConsumerState::Approved)
    }

    async fn deactivate_consumer(
        &self,
        scope: &str,
        consumer: &str,
    ) -> ProviderResult<ConsumerRegistration> {
        let mut state = self.state.lock();
        state.enter(ProviderCall::new(
            ProviderOperation::DeactivateConsumer,
            scope,
            Some(consumer),
        ))?;
        Self::set_consumer_state(&mut state, scope, consumer, ConsumerState::Denied)
    }

    async fn register_scope(
        &self,
        payload: &ScopeRegistrationRequest,
    ) -> ProviderResult<ScopeRegistration> {
        let name = payload.qualified_name();
        let mut state = self.state.lock();
        state.enter(ProviderCall::new(ProviderOperation::RegisterScope, &name, None))?;

        if state.scopes.contains_key(&name) {
            return Err(ProviderError::Conflict(format!(
                "scope '{name}' is already registered"
            )));
        }

        let now = Utc::now();
        let registration = ScopeRegistration {
            name: name.clone(),
            prefix: payload.prefix.clone(),
            subscope: payload.subscope.clone(),
            description: payload.description.clone(),
            active: payload.active.unwrap_or(true),
            at_max_age: payload.at_max_age,
            allowed_integration_types: payload.allowed_integration_types.clone(),
            created: Some(now),
            last_updated: Some(now),
        };
        state.scopes.insert(name, registration.clone());
        Ok(registration)
    }

    async fn update_scope(
        &self,
        payload: &ScopeRegistrationRequest,
        scope: &str,
    ) -> ProviderResult<ScopeRegistration> {
        let mut state = self.state.lock();
        state.enter(ProviderCall::new(ProviderOperation::UpdateScope, scope, None))?;
        let registration = state.scope_mut(scope)?;
        Self::apply_attributes(registration, payload);
        Ok(registration.clone())
    }

    async fn activate_scope(
        &self,
        payload: &ScopeRegistrationRequest,
        scope: &str,
    ) -> ProviderResult<ScopeRegistration> {
        let mut state = self.state.lock();
        state.enter(ProviderCall::new(ProviderOperation::ActivateScope, scope, None))?;
        let registration = state.scope_mut(scope)?;
        Self::apply_attributes(registration, payload);
        registration.active = true;
        Ok(registration.clone())
    }

    async fn delete_scope(&self, scope: &str) -> ProviderResult<ScopeRegistration> {
        let mut state = self.state.lock();
        state.enter(ProviderCall::new(ProviderOperation::DeleteScope, scope, None))?;
        let registration = state.scope_mut(scope)?;
        registration.active = false;
        registration.last_updated = Some(Utc::now());
        Ok(registration.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeclaredScope, OwnerRef};

    fn payload(name: &str) -> ScopeRegistrationRequest {
        ScopeRegistrationRequest::from_declared(
            "prod",
            &OwnerRef::new("team-a", "orders-api"),
            &DeclaredScope::new(name),
        )
    }

    #[tokio::test]
    async fn test_register_assigns_qualified_name() {
        let provider = MemoryScopeProvider::new();
        let registration = provider.register_scope(&payload("read")).await.unwrap();

        assert_eq!(registration.name, "prod:read");
        assert!(registration.active);
        assert_eq!(provider.calls_of(ProviderOperation::RegisterScope).len(), 1);
    }

    #[tokio::test]
    async fn test_register_twice_conflicts() {
        let provider = MemoryScopeProvider::new();
        provider.register_scope(&payload("read")).await.unwrap();

        let err = provider.register_scope(&payload("read")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_list_filters_by_prefix() {
        let provider = MemoryScopeProvider::new();
        provider.seed_scope("prod", "read", true);
        provider.seed_scope("dev", "read", true);

        let scopes = provider.list_scopes("prod").await.unwrap();
        assert_eq!(scopes.len(), 1);
        assert_eq!(scopes[0].name, "prod:read");
    }

    #[tokio::test]
    async fn test_delete_is_soft() {
        let provider = MemoryScopeProvider::new();
        provider.seed_scope("prod", "read", true);

        let registration = provider.delete_scope("prod:read").await.unwrap();
        assert!(!registration.active);
        assert!(provider.scope("prod:read").is_some());
    }

    #[tokio::test]
    async fn test_update_missing_scope_is_not_found() {
        let provider = MemoryScopeProvider::new();
        let err = provider
            .update_scope(&payload("read"), "prod:read")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_deactivate_consumer_keeps_row() {
        let provider = MemoryScopeProvider::new();
        provider.seed_scope("prod", "read", true);
        provider.seed_consumer("prod:read", "111", ConsumerState::Approved);

        let registration = provider
            .deactivate_consumer("prod:read", "111")
            .await
            .unwrap();
        assert_eq!(registration.state, ConsumerState::Denied);
        assert_eq!(provider.acl("prod:read").len(), 1);
        assert!(provider.active_consumers("prod:read").is_empty());
    }

    #[tokio::test]
    async fn test_add_consumer_reapproves_denied_row() {
        let provider = MemoryScopeProvider::new();
        provider.seed_scope("prod", "read", true);
        provider.seed_consumer("prod:read", "111", ConsumerState::Denied);

        provider.add_to_scope_acl("prod:read", "111").await.unwrap();
        assert_eq!(provider.acl("prod:read").len(), 1);
        assert!(provider.active_consumers("prod:read").contains("111"));
    }

    #[tokio::test]
    async fn test_injected_failure_is_recorded() {
        let provider = MemoryScopeProvider::new();
        provider.seed_scope("prod", "read", true);
        provider.fail_on_target(ProviderOperation::AddToScopeAcl, "222");

        provider.add_to_scope_acl("prod:read", "111").await.unwrap();
        let err = provider
            .add_to_scope_acl("prod:read", "222")
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Unavailable(_)));
        assert_eq!(provider.write_calls().len(), 2);
        assert!(!provider.active_consumers("prod:read").contains("222"));
    }
}
