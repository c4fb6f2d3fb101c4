use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of the resource that declares a set of scopes.
///
/// Used to tag events and metrics, and to derive default scope descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OwnerRef {
    pub namespace: String,
    pub name: String,
}

impl OwnerRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_display() {
        let owner = OwnerRef::new("team-a", "orders-api");
        assert_eq!(owner.to_string(), "team-a/orders-api");
    }
}
