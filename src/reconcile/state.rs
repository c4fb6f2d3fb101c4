//! Per-scope lifecycle state machine.
//!
//! A scope is in one of three provider states. Given the declared enablement
//! and whether descriptive attributes differ, [`transition`] yields the
//! provider actions to issue, in order, and the resulting state.
//!
//! | current | enabled | actions | next |
//! |---|---|---|---|
//! | Unregistered | true | Create | Active |
//! | Unregistered | false | Create, Deactivate | Inactive |
//! | Active | true | Update? | Active |
//! | Active | false | Update?, Deactivate | Inactive |
//! | Inactive | true | Update?, Activate | Active |
//! | Inactive | false | Update? | Inactive |
//!
//! `Update?` is issued only when attributes changed. A disabled declaration
//! always ends `Inactive`.

use std::fmt;

use serde::Serialize;

use crate::models::{DeclaredScope, ScopeRegistration, ScopeRegistrationRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    Unregistered,
    Active,
    Inactive,
}

impl ProviderState {
    pub fn of(registration: Option<&ScopeRegistration>) -> Self {
        match registration {
            None => ProviderState::Unregistered,
            Some(r) if r.active => ProviderState::Active,
            Some(_) => ProviderState::Inactive,
        }
    }
}

impl fmt::Display for ProviderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderState::Unregistered => "unregistered",
            ProviderState::Active => "active",
            ProviderState::Inactive => "inactive",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeAction {
    Create,
    Update,
    Activate,
    Deactivate,
}

impl fmt::Display for ScopeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScopeAction::Create => "create",
            ScopeAction::Update => "update",
            ScopeAction::Activate => "activate",
            ScopeAction::Deactivate => "deactivate",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: ProviderState,
    pub actions: Vec<ScopeAction>,
}

impl Transition {
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Pure transition function of the scope lifecycle.
pub fn transition(current: ProviderState, enabled: bool, changed: bool) -> Transition {
    let mut actions = Vec::with_capacity(2);

    match current {
        ProviderState::Unregistered => actions.push(ScopeAction::Create),
        ProviderState::Active | ProviderState::Inactive if changed => {
            actions.push(ScopeAction::Update)
        }
        _ => {}
    }

    let next = if enabled {
        if current == ProviderState::Inactive {
            actions.push(ScopeAction::Activate);
        }
        ProviderState::Active
    } else {
        if current != ProviderState::Inactive {
            actions.push(ScopeAction::Deactivate);
        }
        ProviderState::Inactive
    };

    Transition { next, actions }
}

/// A declared scope paired with its existing provider registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub declared: DeclaredScope,
    pub registration: ScopeRegistration,
}

impl Scope {
    pub fn new(declared: DeclaredScope, registration: ScopeRegistration) -> Self {
        Self {
            declared,
            registration,
        }
    }

    pub fn qualified_name(&self) -> &str {
        &self.registration.name
    }

    pub fn state(&self) -> ProviderState {
        ProviderState::of(Some(&self.registration))
    }

    /// Provider-visible attributes differ from `desired`.
    pub fn has_changed(&self, desired: &ScopeRegistrationRequest) -> bool {
        self.registration.differs_from(desired)
    }

    /// Declared enabled while the provider holds it inactive.
    pub fn can_be_activated(&self) -> bool {
        self.declared.enabled && !self.registration.active
    }

    /// Declared enabled. A disabled scope is never active.
    pub fn is_active(&self) -> bool {
        self.declared.enabled
    }

    pub fn transition(&self, desired: &ScopeRegistrationRequest) -> Transition {
        transition(self.state(), self.is_active(), self.has_changed(desired))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::models::OwnerRef;

    use ProviderState::*;
    use ScopeAction::*;

    #[rstest]
    #[case(Unregistered, true, false, vec![Create], Active)]
    #[case(Unregistered, false, false, vec![Create, Deactivate], Inactive)]
    #[case(Active, true, false, vec![], Active)]
    #[case(Active, true, true, vec![Update], Active)]
    #[case(Active, false, false, vec![Deactivate], Inactive)]
    #[case(Active, false, true, vec![Update, Deactivate], Inactive)]
    #[case(Inactive, true, false, vec![Activate], Active)]
    #[case(Inactive, true, true, vec![Update, Activate], Active)]
    #[case(Inactive, false, false, vec![], Inactive)]
    #[case(Inactive, false, true, vec![Update], Inactive)]
    fn test_transition_table(
        #[case] current: ProviderState,
        #[case] enabled: bool,
        #[case] changed: bool,
        #[case] actions: Vec<ScopeAction>,
        #[case] next: ProviderState,
    ) {
        let t = transition(current, enabled, changed);
        assert_eq!(t.actions, actions);
        assert_eq!(t.next, next);
    }

    #[rstest]
    fn test_disabled_always_ends_inactive(
        #[values(Unregistered, Active, Inactive)] current: ProviderState,
        #[values(true, false)] changed: bool,
    ) {
        let t = transition(current, false, changed);
        assert_eq!(t.next, Inactive);
        assert!(!t.actions.contains(&Activate));
    }

    #[rstest]
    fn test_update_never_follows_activation(
        #[values(Unregistered, Active, Inactive)] current: ProviderState,
        #[values(true, false)] enabled: bool,
        #[values(true, false)] changed: bool,
    ) {
        let t = transition(current, enabled, changed);
        let update = t.actions.iter().position(|a| *a == Update);
        let toggle = t
            .actions
            .iter()
            .position(|a| matches!(a, Activate | Deactivate));
        if let (Some(u), Some(a)) = (update, toggle) {
            assert!(u < a);
        }
    }

    #[test]
    fn test_scope_predicates() {
        let owner = OwnerRef::new("team-a", "orders-api");
        let declared = DeclaredScope::new("read");
        let desired = ScopeRegistrationRequest::from_declared("prod", &owner, &declared);
        let registration = ScopeRegistration {
            name: "prod:read".into(),
            prefix: "prod".into(),
            subscope: "read".into(),
            description: desired.description.clone(),
            active: false,
            at_max_age: None,
            allowed_integration_types: Vec::new(),
            created: None,
            last_updated: None,
        };

        let scope = Scope::new(declared.clone(), registration.clone());
        assert_eq!(scope.state(), Inactive);
        assert!(scope.can_be_activated());
        assert!(scope.is_active());
        assert!(!scope.has_changed(&desired));
        assert_eq!(scope.transition(&desired).actions, vec![Activate]);

        let disabled = Scope::new(declared.with_enabled(false), registration);
        assert!(!disabled.can_be_activated());
        assert!(!disabled.is_active());
        assert!(disabled.transition(&desired).is_noop());
    }
}
