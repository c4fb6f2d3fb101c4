use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A consumer allowed to request tokens for a declared scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeclaredConsumer {
    /// Consumer identifier (organization number).
    pub orgno: String,

    /// Display name, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl DeclaredConsumer {
    pub fn new(orgno: impl Into<String>) -> Self {
        Self {
            orgno: orgno.into(),
            name: None,
        }
    }
}

/// Registration state of a consumer in a scope's ACL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsumerState {
    /// The consumer may request tokens for the scope.
    Approved,
    /// The consumer was removed; the ACL row is kept for history.
    Denied,
}

impl ConsumerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumerState::Approved => "APPROVED",
            ConsumerState::Denied => "DENIED",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ConsumerState::Approved)
    }
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a scope's ACL as held by the provider.
///
/// Returned both when listing an ACL and as the echo of an add/deactivate call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerRegistration {
    /// Qualified scope name.
    pub scope: String,
    pub consumer_orgno: String,
    pub state: ConsumerState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl ConsumerRegistration {
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}
