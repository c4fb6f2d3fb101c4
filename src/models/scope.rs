use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DeclaredConsumer, OwnerRef};

/// Separator between the cluster prefix and the declared name.
pub const QUALIFIED_NAME_SEPARATOR: char = ':';

/// Build the provider-side primary key for a declared scope.
pub fn qualified_name(cluster: &str, name: &str) -> String {
    format!("{cluster}{QUALIFIED_NAME_SEPARATOR}{name}")
}

/// Declared scopes keyed by their unqualified name.
///
/// A `BTreeMap` keeps pass ordering stable, which makes logs and reports
/// reproducible between runs.
pub type DeclaredScopes = BTreeMap<String, DeclaredScope>;

/// One scope declared by the owning workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeclaredScope {
    /// Unqualified name. Filled from the map key when loading a declaration.
    #[serde(default)]
    pub name: String,

    /// Whether the scope should be active at the provider.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Description shown by the provider. Defaults to `{cluster}:{namespace}:{name}`
    /// of the owning resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Maximum lifetime of issued access tokens, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_max_age: Option<u32>,

    /// Integration types allowed to use the scope.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_integrations: Vec<String>,

    /// Consumers allowed to request tokens for the scope.
    #[serde(default)]
    pub consumers: Vec<DeclaredConsumer>,
}

impl DeclaredScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            description: None,
            at_max_age: None,
            allowed_integrations: Vec::new(),
            consumers: Vec::new(),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_consumer(mut self, orgno: impl Into<String>) -> Self {
        self.consumers.push(DeclaredConsumer::new(orgno));
        self
    }

    /// Declared consumer identifiers as a set. Duplicate declarations collapse.
    pub fn consumer_ids(&self) -> BTreeSet<&str> {
        self.consumers.iter().map(|c| c.orgno.as_str()).collect()
    }
}

fn default_true() -> bool {
    true
}

/// Payload sent to the provider to register, update, or activate a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeRegistrationRequest {
    pub prefix: String,
    pub subscope: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_max_age: Option<u32>,
    #[serde(default)]
    pub allowed_integration_types: Vec<String>,
    /// Only set on activation requests; updates leave enablement untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl ScopeRegistrationRequest {
    /// Build the desired provider attributes for a declared scope.
    pub fn from_declared(cluster: &str, owner: &OwnerRef, scope: &DeclaredScope) -> Self {
        let mut allowed_integration_types = scope.allowed_integrations.clone();
        allowed_integration_types.sort();
        allowed_integration_types.dedup();

        Self {
            prefix: cluster.to_string(),
            subscope: scope.name.clone(),
            description: scope
                .description
                .clone()
                .unwrap_or_else(|| format!("{cluster}:{}:{}", owner.namespace, owner.name)),
            at_max_age: scope.at_max_age,
            allowed_integration_types,
            active: None,
        }
    }

    /// The same payload, marked as an activation request.
    pub fn activation(&self) -> Self {
        Self {
            active: Some(true),
            ..self.clone()
        }
    }

    pub fn qualified_name(&self) -> String {
        qualified_name(&self.prefix, &self.subscope)
    }
}

/// The provider's record of a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeRegistration {
    /// Qualified name assigned by the provider.
    pub name: String,
    pub prefix: String,
    pub subscope: String,
    #[serde(default)]
    pub description: String,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_max_age: Option<u32>,
    #[serde(default)]
    pub allowed_integration_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl ScopeRegistration {
    /// True if any provider-visible descriptive attribute differs from `desired`.
    ///
    /// Enablement is not compared here; it is driven by activation and deletion.
    pub fn differs_from(&self, desired: &ScopeRegistrationRequest) -> bool {
        let mut integrations = self.allowed_integration_types.clone();
        integrations.sort();
        integrations.dedup();

        self.description != desired.description
            || self.at_max_age != desired.at_max_age
            || integrations != desired.allowed_integration_types
    }
}
