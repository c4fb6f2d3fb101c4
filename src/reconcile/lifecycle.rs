use tracing::{debug, info, warn};

use super::{LifecycleOperation, PassContext, ReconcileError, ScopeAction};
use crate::{
    events::{EventReason, EventSink, ReconcileEvent},
    models::{ScopeRegistration, ScopeRegistrationRequest},
    observability::metrics,
    provider::ScopeProvider,
};

/// Executes scope lifecycle actions against the provider.
///
/// Each successful step records one event and one counter. The first failing
/// step aborts the remaining ones.
pub struct ScopeLifecycle<'a> {
    provider: &'a dyn ScopeProvider,
    events: &'a dyn EventSink,
    ctx: &'a PassContext,
}

impl<'a> ScopeLifecycle<'a> {
    pub fn new(
        provider: &'a dyn ScopeProvider,
        events: &'a dyn EventSink,
        ctx: &'a PassContext,
    ) -> Self {
        Self {
            provider,
            events,
            ctx,
        }
    }

    /// Apply `actions` in order and return the qualified name the provider
    /// knows the scope by afterwards.
    pub async fn apply(
        &self,
        actions: &[ScopeAction],
        desired: &ScopeRegistrationRequest,
        qualified: &str,
    ) -> Result<String, ReconcileError> {
        let mut name = qualified.to_string();

        for action in actions {
            let registration = match action {
                ScopeAction::Create => self.create(desired).await?,
                ScopeAction::Update => self.update(desired, &name).await?,
                ScopeAction::Activate => self.activate(desired, &name).await?,
                ScopeAction::Deactivate => self.deactivate(&name).await?,
            };
            name = registration.name;
        }

        Ok(name)
    }

    pub async fn create(
        &self,
        desired: &ScopeRegistrationRequest,
    ) -> Result<ScopeRegistration, ReconcileError> {
        debug!("Scope does not exist at provider, registering");
        let registration = self
            .ctx
            .call(self.provider.register_scope(desired))
            .await
            .map_err(|e| {
                ReconcileError::lifecycle(
                    LifecycleOperation::Register,
                    desired.qualified_name(),
                    e,
                )
                .logged()
            })?;

        info!(registered = %registration.name, "Scope registered");
        self.record(EventReason::CreatedScope, format!("Scope created: {}", registration.name));
        metrics::record_scope_created(self.ctx.owner());
        Ok(registration)
    }

    pub async fn update(
        &self,
        desired: &ScopeRegistrationRequest,
        scope: &str,
    ) -> Result<ScopeRegistration, ReconcileError> {
        debug!("Scope attributes changed, updating");
        let registration = self
            .ctx
            .call(self.provider.update_scope(desired, scope))
            .await
            .map_err(|e| {
                ReconcileError::lifecycle(LifecycleOperation::Update, scope, e).logged()
            })?;

        info!("Scope updated");
        self.record(EventReason::UpdatedScope, format!("Scope updated: {}", registration.name));
        metrics::record_scope_updated(self.ctx.owner());
        Ok(registration)
    }

    pub async fn activate(
        &self,
        desired: &ScopeRegistrationRequest,
        scope: &str,
    ) -> Result<ScopeRegistration, ReconcileError> {
        let registration = self
            .ctx
            .call(self.provider.activate_scope(desired, scope))
            .await
            .map_err(|e| {
                ReconcileError::lifecycle(LifecycleOperation::Activate, scope, e).logged()
            })?;

        info!("Scope reactivated");
        self.record(
            EventReason::ActivatedScope,
            format!("Scope activated: {}", registration.name),
        );
        metrics::record_scope_reactivated(self.ctx.owner());
        Ok(registration)
    }

    /// Deactivate a scope. Used for disabled declarations and finalization.
    pub async fn deactivate(&self, scope: &str) -> Result<ScopeRegistration, ReconcileError> {
        let registration = self
            .ctx
            .call(self.provider.delete_scope(scope))
            .await
            .map_err(|e| {
                ReconcileError::lifecycle(LifecycleOperation::Deactivate, scope, e).logged()
            })?;

        let message = format!(
            "Scope deactivated, no consumers are granted access: {}",
            registration.name
        );
        warn!("{message}");
        self.events.record(ReconcileEvent::warning(
            self.ctx.owner(),
            EventReason::DeactivatedScope,
            message,
        ));
        metrics::record_scope_deleted(self.ctx.owner());
        Ok(registration)
    }

    fn record(&self, reason: EventReason, message: String) {
        self.events
            .record(ReconcileEvent::normal(self.ctx.owner(), reason, message));
    }
}
