use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{Instrument, debug, info};

use super::{AclOperation, PassContext, ReconcileError};
use crate::{
    events::{EventReason, EventSink, ReconcileEvent},
    models::{ConsumerRegistration, ConsumerState},
    observability::metrics,
    provider::ScopeProvider,
};

/// Required change for one consumer of a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerDecision {
    pub orgno: String,
    /// `true` to approve the consumer, `false` to deactivate it.
    pub should_be_added: bool,
    /// State of the consumer's ACL row, if it has one.
    pub current_state: Option<ConsumerState>,
}

/// Difference between the desired consumers and a scope's ACL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerPlan {
    /// Consumers already approved and still desired.
    pub unchanged: Vec<String>,
    /// Additions first (sorted), then deactivations in ACL order.
    pub changes: Vec<ConsumerDecision>,
}

impl ConsumerPlan {
    pub fn compute(desired: &BTreeSet<&str>, acl: &[ConsumerRegistration]) -> Self {
        // An orgno may appear on several rows; any approved row makes it active.
        let mut current: BTreeMap<&str, ConsumerState> = BTreeMap::new();
        for entry in acl {
            current
                .entry(entry.consumer_orgno.as_str())
                .and_modify(|state| {
                    if entry.state.is_active() {
                        *state = entry.state;
                    }
                })
                .or_insert(entry.state);
        }

        let mut plan = ConsumerPlan::default();
        for orgno in desired {
            match current.get(orgno) {
                Some(state) if state.is_active() => plan.unchanged.push(orgno.to_string()),
                state => plan.changes.push(ConsumerDecision {
                    orgno: orgno.to_string(),
                    should_be_added: true,
                    current_state: state.copied(),
                }),
            }
        }

        let mut seen = BTreeSet::new();
        for entry in acl {
            let orgno = entry.consumer_orgno.as_str();
            if !desired.contains(orgno)
                && current.get(orgno).is_some_and(ConsumerState::is_active)
                && seen.insert(orgno)
            {
                plan.changes.push(ConsumerDecision {
                    orgno: orgno.to_string(),
                    should_be_added: false,
                    current_state: Some(ConsumerState::Approved),
                });
            }
        }

        plan
    }

    pub fn is_up_to_date(&self) -> bool {
        self.changes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerAction {
    Added,
    Deactivated,
}

/// Result of one applied consumer change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumerOutcome {
    pub orgno: String,
    pub action: ConsumerAction,
    /// State echoed by the provider.
    pub state: ConsumerState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerReport {
    pub outcomes: Vec<ConsumerOutcome>,
    /// Consumers approved on the scope once the changes were applied.
    pub active_consumers: BTreeSet<String>,
}

/// Brings a scope's ACL in line with a desired consumer set.
pub struct ConsumerReconciler<'a> {
    provider: &'a dyn ScopeProvider,
    events: &'a dyn EventSink,
    ctx: &'a PassContext,
}

impl<'a> ConsumerReconciler<'a> {
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

    /// Reconcile the ACL of `scope` so its approved consumers equal `desired`.
    ///
    /// Stops at the first failing consumer call. Changes already applied in
    /// this scope are not rolled back.
    pub async fn reconcile(
        &self,
        scope: &str,
        desired: &BTreeSet<&str>,
    ) -> Result<ConsumerReport, ReconcileError> {
        debug!("Reconciling ACL");
        let acl = self
            .ctx
            .call(self.provider.get_scope_acl(scope))
            .await
            .map_err(|e| ReconcileError::acl(AclOperation::Fetch, scope, None, e).logged())?;

        let plan = ConsumerPlan::compute(desired, &acl);
        let mut report = ConsumerReport {
            outcomes: Vec::with_capacity(plan.changes.len()),
            active_consumers: plan.unchanged.iter().cloned().collect(),
        };

        if plan.is_up_to_date() {
            self.events.record(ReconcileEvent::normal(
                self.ctx.owner(),
                EventReason::AclUpToDate,
                format!("ACL already up to date for scope {scope}"),
            ));
            return Ok(report);
        }

        for decision in &plan.changes {
            let span = tracing::debug_span!("consumer", consumer = %decision.orgno);
            let outcome = self.apply(scope, decision).instrument(span).await?;
            if outcome.action == ConsumerAction::Added && outcome.state.is_active() {
                report.active_consumers.insert(outcome.orgno.clone());
            }
            report.outcomes.push(outcome);
        }

        self.events.record(ReconcileEvent::normal(
            self.ctx.owner(),
            EventReason::UpdatedAcl,
            format!("Scope ACL updated: {scope}"),
        ));
        Ok(report)
    }

    async fn apply(
        &self,
        scope: &str,
        decision: &ConsumerDecision,
    ) -> Result<ConsumerOutcome, ReconcileError> {
        let orgno = decision.orgno.as_str();

        if decision.should_be_added {
            let registration = self
                .ctx
                .call(self.provider.add_to_scope_acl(scope, orgno))
                .await
                .map_err(|e| {
                    ReconcileError::acl(AclOperation::AddConsumer, scope, Some(orgno), e).logged()
                })?;

            info!(state = %registration.state, "Consumer added to scope ACL");
            metrics::record_consumer_created_or_updated(
                self.ctx.owner(),
                registration.state.as_str(),
            );
            Ok(ConsumerOutcome {
                orgno: orgno.to_string(),
                action: ConsumerAction::Added,
                state: registration.state,
            })
        } else {
            let registration = self
                .ctx
                .call(self.provider.deactivate_consumer(scope, orgno))
                .await
                .map_err(|e| {
                    ReconcileError::acl(AclOperation::DeactivateConsumer, scope, Some(orgno), e)
                        .logged()
                })?;

            info!(state = %registration.state, "Consumer deactivated in scope ACL");
            metrics::record_consumer_deleted(self.ctx.owner());
            Ok(ConsumerOutcome {
                orgno: orgno.to_string(),
                action: ConsumerAction::Deactivated,
                state: registration.state,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        events::EventLog,
        models::OwnerRef,
        provider::{MemoryScopeProvider, ProviderOperation},
    };

    fn row(orgno: &str, state: ConsumerState) -> ConsumerRegistration {
        ConsumerRegistration {
            scope: "prod:read".into(),
            consumer_orgno: orgno.into(),
            state,
            created: None,
            last_updated: None,
        }
    }

    #[test]
    fn test_plan_adds_missing_and_denied_consumers() {
        let desired = BTreeSet::from(["111", "222", "333"]);
        let acl = vec![
            row("111", ConsumerState::Approved),
            row("222", ConsumerState::Denied),
        ];

        let plan = ConsumerPlan::compute(&desired, &acl);
        assert_eq!(plan.unchanged, vec!["111"]);
        assert_eq!(
            plan.changes,
            vec![
                ConsumerDecision {
                    orgno: "222".into(),
                    should_be_added: true,
                    current_state: Some(ConsumerState::Denied),
                },
                ConsumerDecision {
                    orgno: "333".into(),
                    should_be_added: true,
                    current_state: None,
                },
            ]
        );
    }

    #[test]
    fn test_plan_deactivates_undeclared_active_consumers_only() {
        let desired = BTreeSet::from(["111"]);
        let acl = vec![
            row("111", ConsumerState::Approved),
            row("444", ConsumerState::Approved),
            row("555", ConsumerState::Denied),
        ];

        let plan = ConsumerPlan::compute(&desired, &acl);
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].orgno, "444");
        assert!(!plan.changes[0].should_be_added);
    }

    #[test]
    fn test_plan_duplicate_rows_collapse() {
        let desired = BTreeSet::new();
        let acl = vec![
            row("444", ConsumerState::Denied),
            row("444", ConsumerState::Approved),
            row("444", ConsumerState::Approved),
        ];

        let plan = ConsumerPlan::compute(&desired, &acl);
        assert_eq!(plan.changes.len(), 1);
    }

    #[test]
    fn test_plan_up_to_date() {
        let desired = BTreeSet::from(["111"]);
        let acl = vec![row("111", ConsumerState::Approved)];
        assert!(ConsumerPlan::compute(&desired, &acl).is_up_to_date());
        assert!(ConsumerPlan::compute(&BTreeSet::new(), &[]).is_up_to_date());
    }

    #[tokio::test]
    async fn test_reconcile_converges_to_desired_set() {
        let provider = MemoryScopeProvider::new();
        provider.seed_scope("prod", "read", true);
        provider.seed_consumer("prod:read", "111", ConsumerState::Approved);
        provider.seed_consumer("prod:read", "444", ConsumerState::Approved);
        let events = EventLog::new();
        let ctx = PassContext::new(OwnerRef::new("team-a", "orders-api"));

        let report = ConsumerReconciler::new(&provider, &events, &ctx)
            .reconcile("prod:read", &BTreeSet::from(["111", "222"]))
            .await
            .unwrap();

        let expected = BTreeSet::from(["111".to_string(), "222".to_string()]);
        assert_eq!(provider.active_consumers("prod:read"), expected);
        assert_eq!(report.active_consumers, expected);
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(events.reasons(), vec![EventReason::UpdatedAcl]);
    }

    #[tokio::test]
    async fn test_up_to_date_acl_issues_no_writes() {
        let provider = MemoryScopeProvider::new();
        provider.seed_scope("prod", "read", true);
        provider.seed_consumer("prod:read", "111", ConsumerState::Approved);
        let events = EventLog::new();
        let ctx = PassContext::new(OwnerRef::new("team-a", "orders-api"));

        let report = ConsumerReconciler::new(&provider, &events, &ctx)
            .reconcile("prod:read", &BTreeSet::from(["111"]))
            .await
            .unwrap();

        assert!(provider.write_calls().is_empty());
        assert!(report.outcomes.is_empty());
        assert_eq!(events.reasons(), vec![EventReason::AclUpToDate]);
    }

    #[tokio::test]
    async fn test_failure_keeps_earlier_changes() {
        let provider = MemoryScopeProvider::new();
        provider.seed_scope("prod", "read", true);
        provider.fail_on_target(ProviderOperation::AddToScopeAcl, "222");
        let events = EventLog::new();
        let ctx = PassContext::new(OwnerRef::new("team-a", "orders-api"));

        let err = ConsumerReconciler::new(&provider, &events, &ctx)
            .reconcile("prod:read", &BTreeSet::from(["111", "222", "333"]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ReconcileError::Acl {
                operation: AclOperation::AddConsumer,
                consumer: Some(ref c),
                ..
            } if c == "222"
        ));
        assert!(provider.active_consumers("prod:read").contains("111"));
        assert!(!provider.active_consumers("prod:read").contains("333"));
        assert_eq!(provider.calls_of(ProviderOperation::AddToScopeAcl).len(), 2);
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported() {
        let provider = MemoryScopeProvider::new();
        provider.fail_on(ProviderOperation::GetScopeAcl);
        let events = EventLog::new();
        let ctx = PassContext::new(OwnerRef::new("team-a", "orders-api"));

        let err = ConsumerReconciler::new(&provider, &events, &ctx)
            .reconcile("prod:read", &BTreeSet::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Acl {
                operation: AclOperation::Fetch,
                consumer: None,
                ..
            }
        ));
    }
}
