use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Instant,
};

use serde::Serialize;
use tracing::{Instrument, debug, info};

use super::{
    ConsumerOutcome, ConsumerReconciler, PassContext, ProviderState, ReconcileError,
    ScopeAction, ScopeLifecycle, Transition, transition,
};
use crate::{
    events::EventSink,
    models::{DeclaredScope, DeclaredScopes, ScopeRegistrationRequest, qualified_name},
    observability::metrics,
    provider::ScopeProvider,
};

/// What a pass did to one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeReport {
    /// Qualified name at the provider.
    pub name: String,
    /// Declared (unqualified) name.
    pub subscope: String,
    pub actions: Vec<ScopeAction>,
    pub state: ProviderState,
    pub consumers: Vec<ConsumerOutcome>,
    pub active_consumers: BTreeSet<String>,
}

/// Outcome of [`ScopeReconciler::process`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub scopes: Vec<ScopeReport>,
}

impl PassReport {
    /// Approved consumers per declared scope name, the view exposed as the
    /// owning resource's status.
    pub fn status(&self) -> BTreeMap<String, Vec<String>> {
        self.scopes
            .iter()
            .map(|s| {
                (
                    s.subscope.clone(),
                    s.active_consumers.iter().cloned().collect(),
                )
            })
            .collect()
    }

    /// Number of provider writes issued by the pass.
    pub fn write_count(&self) -> usize {
        self.scopes
            .iter()
            .map(|s| s.actions.len() + s.consumers.len())
            .sum()
    }

    pub fn scope(&self, subscope: &str) -> Option<&ScopeReport> {
        self.scopes.iter().find(|s| s.subscope == subscope)
    }
}

/// Outcome of [`ScopeReconciler::finalize`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FinalizeReport {
    /// Qualified names of the scopes deactivated.
    pub deactivated: Vec<String>,
}

/// Drives reconciliation passes for one cluster.
///
/// A pass re-reads provider state, diffs it against the declaration and
/// processes scopes one at a time. Nothing is cached between passes, so a pass
/// interrupted by an error or cancellation is completed by the next one.
pub struct ScopeReconciler {
    provider: Arc<dyn ScopeProvider>,
    events: Arc<dyn EventSink>,
    cluster: String,
}

impl ScopeReconciler {
    pub fn new(
        provider: Arc<dyn ScopeProvider>,
        events: Arc<dyn EventSink>,
        cluster: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            events,
            cluster: cluster.into(),
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Converge the provider to `declared`.
    ///
    /// An empty declaration is a no-op; it never deactivates anything.
    /// Registrations under the cluster prefix that are not declared are left
    /// untouched.
    pub async fn process(
        &self,
        ctx: &PassContext,
        declared: &DeclaredScopes,
    ) -> Result<PassReport, ReconcileError> {
        if declared.is_empty() {
            debug!(owner = %ctx.owner(), "No scopes declared, nothing to reconcile");
            return Ok(PassReport::default());
        }

        let started = Instant::now();
        let result = self
            .run_process(ctx, declared)
            .instrument(ctx.pass_span("process", &self.cluster))
            .await;

        let outcome = result.as_ref().map_or_else(|e| e.outcome(), |_| "success");
        metrics::record_reconcile_pass(
            ctx.owner(),
            "process",
            outcome,
            started.elapsed().as_secs_f64(),
        );
        result
    }

    async fn run_process(
        &self,
        ctx: &PassContext,
        declared: &DeclaredScopes,
    ) -> Result<PassReport, ReconcileError> {
        let stash = ctx
            .call(self.provider.get_filtered_scopes(declared, &self.cluster))
            .await
            .map_err(|e| ReconcileError::diff(e).logged())?;

        debug!(
            to_create = stash.to_create.len(),
            to_update = stash.to_update.len(),
            "Computed scope diff"
        );

        let mut report = PassReport::default();

        for scope in &stash.to_create {
            let desired = self.desired(ctx, scope);
            let plan = transition(ProviderState::Unregistered, scope.enabled, false);
            let qualified = desired.qualified_name();
            report.scopes.push(
                self.reconcile_scope(ctx, scope, &desired, plan, &qualified)
                    .instrument(ctx.scope_span(&qualified))
                    .await?,
            );
        }

        for scope in &stash.to_update {
            let desired = self.desired(ctx, &scope.declared);
            let plan = scope.transition(&desired);
            report.scopes.push(
                self.reconcile_scope(ctx, &scope.declared, &desired, plan, scope.qualified_name())
                    .instrument(ctx.scope_span(scope.qualified_name()))
                    .await?,
            );
        }

        info!(
            scopes = report.scopes.len(),
            writes = report.write_count(),
            "Reconciliation pass complete"
        );
        Ok(report)
    }

    async fn reconcile_scope(
        &self,
        ctx: &PassContext,
        declared: &DeclaredScope,
        desired: &ScopeRegistrationRequest,
        plan: Transition,
        qualified: &str,
    ) -> Result<ScopeReport, ReconcileError> {
        if plan.is_noop() {
            debug!(state = %plan.next, "Scope attributes and enablement up to date");
        }

        let lifecycle = ScopeLifecycle::new(self.provider.as_ref(), self.events.as_ref(), ctx);
        let name = lifecycle.apply(&plan.actions, desired, qualified).await?;

        // An inactive scope grants access to nobody, whatever is declared.
        let consumers = match plan.next {
            ProviderState::Active => declared.consumer_ids(),
            _ => BTreeSet::new(),
        };
        let acl = ConsumerReconciler::new(self.provider.as_ref(), self.events.as_ref(), ctx)
            .reconcile(&name, &consumers)
            .await?;

        Ok(ScopeReport {
            name,
            subscope: declared.name.clone(),
            actions: plan.actions,
            state: plan.next,
            consumers: acl.outcomes,
            active_consumers: acl.active_consumers,
        })
    }

    /// Deactivate every declared scope still registered at the provider.
    ///
    /// Called when the owning resource is deleted. Scopes that were never
    /// registered are skipped; consumer ACLs are left as they are.
    pub async fn finalize(
        &self,
        ctx: &PassContext,
        declared: &DeclaredScopes,
    ) -> Result<FinalizeReport, ReconcileError> {
        if declared.is_empty() {
            debug!(owner = %ctx.owner(), "No scopes declared, nothing to finalize");
            return Ok(FinalizeReport::default());
        }

        let started = Instant::now();
        let result = self
            .run_finalize(ctx, declared)
            .instrument(ctx.pass_span("finalize", &self.cluster))
            .await;

        let outcome = result.as_ref().map_or_else(|e| e.outcome(), |_| "success");
        metrics::record_reconcile_pass(
            ctx.owner(),
            "finalize",
            outcome,
            started.elapsed().as_secs_f64(),
        );
        result
    }

    async fn run_finalize(
        &self,
        ctx: &PassContext,
        declared: &DeclaredScopes,
    ) -> Result<FinalizeReport, ReconcileError> {
        let stash = ctx
            .call(self.provider.get_filtered_scopes(declared, &self.cluster))
            .await
            .map_err(|e| ReconcileError::diff(e).logged())?;

        let lifecycle = ScopeLifecycle::new(self.provider.as_ref(), self.events.as_ref(), ctx);
        let mut report = FinalizeReport::default();

        for scope in &stash.to_update {
            let registration = lifecycle
                .deactivate(scope.qualified_name())
                .instrument(ctx.scope_span(scope.qualified_name()))
                .await?;
            report.deactivated.push(registration.name);
        }

        info!(
            deactivated = report.deactivated.len(),
            skipped = stash.to_create.len(),
            "Finalization complete"
        );
        Ok(report)
    }

    fn desired(&self, ctx: &PassContext, scope: &DeclaredScope) -> ScopeRegistrationRequest {
        ScopeRegistrationRequest::from_declared(&self.cluster, ctx.owner(), scope)
    }

    /// Qualified provider name for a declared scope of this cluster.
    pub fn qualified_name(&self, name: &str) -> String {
        qualified_name(&self.cluster, name)
    }
}
