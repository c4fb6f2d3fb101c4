use std::collections::BTreeMap;

use super::Scope;
use crate::models::{DeclaredScope, DeclaredScopes, ScopeRegistration, qualified_name};

/// Declared scopes partitioned against the provider's registrations.
///
/// Every declared name lands in exactly one of the two sets. Provider
/// registrations without a declared counterpart are left out of both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeStash {
    /// Declared scopes with no registration under their qualified name.
    pub to_create: Vec<DeclaredScope>,
    /// Declared scopes paired with their existing registration.
    pub to_update: Vec<Scope>,
}

impl ScopeStash {
    /// Partition `declared` against `registered`, matching on `{cluster}:{name}`.
    ///
    /// The map key is authoritative for the scope name; each entry's `name`
    /// is overwritten with it. Output follows key order.
    pub fn partition(
        declared: &DeclaredScopes,
        cluster: &str,
        registered: Vec<ScopeRegistration>,
    ) -> Self {
        let mut by_name: BTreeMap<String, ScopeRegistration> = registered
            .into_iter()
            .map(|registration| (registration.name.clone(), registration))
            .collect();

        let mut stash = ScopeStash::default();
        for (name, scope) in declared {
            let mut scope = scope.clone();
            scope.name = name.clone();

            match by_name.remove(&qualified_name(cluster, name)) {
                Some(registration) => stash.to_update.push(Scope::new(scope, registration)),
                None => stash.to_create.push(scope),
            }
        }

        stash
    }

    pub fn len(&self) -> usize {
        self.to_create.len() + self.to_update.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rstest::rstest;

    use super::*;

    fn registration(name: &str, active: bool) -> ScopeRegistration {
        let (prefix, subscope) = name.split_once(':').unwrap();
        ScopeRegistration {
            name: name.into(),
            prefix: prefix.into(),
            subscope: subscope.into(),
            description: String::new(),
            active,
            at_max_age: None,
            allowed_integration_types: Vec::new(),
            created: None,
            last_updated: None,
        }
    }

    fn declared(names: &[&str]) -> DeclaredScopes {
        names
            .iter()
            .map(|n| (n.to_string(), DeclaredScope::new(*n)))
            .collect()
    }

    #[rstest]
    #[case::empty_provider(&["read", "write", "admin"], &[], 3)]
    #[case::all_registered(
        &["read", "write"],
        &[("prod:read", true), ("prod:write", false)],
        0
    )]
    #[case::some_registered(
        &["read", "write", "admin"],
        &[("prod:write", true), ("prod:admin", false)],
        1
    )]
    #[case::orphans_only(&["read", "write"], &[("prod:legacy", true), ("prod:old", false)], 2)]
    #[case::other_cluster_only(&["read", "write"], &[("dev:read", true), ("staging:write", true)], 2)]
    #[case::nothing_declared(&[], &[("prod:read", true)], 0)]
    fn test_partition_is_disjoint_and_exhaustive(
        #[case] names: &[&str],
        #[case] registered: &[(&str, bool)],
        #[case] expected_creates: usize,
    ) {
        let declared = declared(names);
        let stash = ScopeStash::partition(
            &declared,
            "prod",
            registered
                .iter()
                .map(|(name, active)| registration(name, *active))
                .collect(),
        );

        let create: BTreeSet<_> = stash.to_create.iter().map(|s| s.name.clone()).collect();
        let update: BTreeSet<_> = stash
            .to_update
            .iter()
            .map(|s| s.declared.name.clone())
            .collect();

        assert!(create.is_disjoint(&update));
        let all: BTreeSet<_> = create.union(&update).cloned().collect();
        let keys: BTreeSet<_> = declared.keys().cloned().collect();
        assert_eq!(all, keys);
        assert_eq!(stash.len(), declared.len());
        assert_eq!(stash.to_create.len(), expected_creates);
        assert!(
            stash
                .to_update
                .iter()
                .all(|s| s.qualified_name() == qualified_name("prod", &s.declared.name))
        );
    }

    #[test]
    fn test_orphaned_registrations_are_ignored() {
        let stash = ScopeStash::partition(
            &declared(&["read"]),
            "prod",
            vec![registration("prod:read", true), registration("prod:legacy", true)],
        );

        assert!(stash.to_create.is_empty());
        assert_eq!(stash.to_update.len(), 1);
        assert_eq!(stash.to_update[0].qualified_name(), "prod:read");
    }

    #[test]
    fn test_other_cluster_does_not_match() {
        let stash =
            ScopeStash::partition(&declared(&["read"]), "prod", vec![registration("dev:read", true)]);

        assert_eq!(stash.to_create.len(), 1);
        assert!(stash.to_update.is_empty());
    }

    #[test]
    fn test_map_key_overrides_entry_name() {
        let mut declared = DeclaredScopes::new();
        declared.insert("read".into(), DeclaredScope::new("something-else"));

        let stash = ScopeStash::partition(&declared, "prod", Vec::new());
        assert_eq!(stash.to_create[0].name, "read");
    }

    #[test]
    fn test_empty_declaration() {
        let stash = ScopeStash::partition(
            &DeclaredScopes::new(),
            "prod",
            vec![registration("prod:read", true)],
        );
        assert!(stash.is_empty());
    }
}
