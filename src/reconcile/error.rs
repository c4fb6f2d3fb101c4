use std::fmt;

use thiserror::Error;

use crate::provider::ProviderError;

/// Scope lifecycle step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOperation {
    Register,
    Update,
    Activate,
    Deactivate,
}

impl LifecycleOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleOperation::Register => "registering scope",
            LifecycleOperation::Update => "updating scope",
            LifecycleOperation::Activate => "activating scope",
            LifecycleOperation::Deactivate => "deactivating scope",
        }
    }
}

impl fmt::Display for LifecycleOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consumer ACL step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclOperation {
    Fetch,
    AddConsumer,
    DeactivateConsumer,
}

impl AclOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AclOperation::Fetch => "getting ACL",
            AclOperation::AddConsumer => "adding to ACL",
            AclOperation::DeactivateConsumer => "deactivating consumer in ACL",
        }
    }
}

impl fmt::Display for AclOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a reconciliation pass.
///
/// Every variant is fatal to the pass. Nothing is retried here; the caller
/// schedules the next pass.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("getting filtered scopes: {source}")]
    Diff {
        #[source]
        source: ProviderError,
    },

    #[error("{operation} '{scope}': {source}")]
    Lifecycle {
        operation: LifecycleOperation,
        scope: String,
        #[source]
        source: ProviderError,
    },

    #[error("{operation} for scope '{scope}'{}: {source}", consumer_suffix(.consumer))]
    Acl {
        operation: AclOperation,
        scope: String,
        consumer: Option<String>,
        #[source]
        source: ProviderError,
    },

    #[error("reconciliation pass cancelled")]
    Cancelled,
}

fn consumer_suffix(consumer: &Option<String>) -> String {
    consumer
        .as_deref()
        .map(|c| format!(" (consumer {c})"))
        .unwrap_or_default()
}

impl ReconcileError {
    pub fn diff(source: ProviderError) -> Self {
        match source {
            ProviderError::Cancelled => Self::Cancelled,
            source => Self::Diff { source },
        }
    }

    pub fn lifecycle(
        operation: LifecycleOperation,
        scope: impl Into<String>,
        source: ProviderError,
    ) -> Self {
        match source {
            ProviderError::Cancelled => Self::Cancelled,
            source => Self::Lifecycle {
                operation,
                scope: scope.into(),
                source,
            },
        }
    }

    pub fn acl(
        operation: AclOperation,
        scope: impl Into<String>,
        consumer: Option<&str>,
        source: ProviderError,
    ) -> Self {
        match source {
            ProviderError::Cancelled => Self::Cancelled,
            source => Self::Acl {
                operation,
                scope: scope.into(),
                consumer: consumer.map(str::to_string),
                source,
            },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Short label used as the `outcome` of pass metrics.
    pub fn outcome(&self) -> &'static str {
        if self.is_cancelled() {
            "cancelled"
        } else {
            "error"
        }
    }

    /// Log the failure in the current span and return it unchanged.
    pub(crate) fn logged(self) -> Self {
        if self.is_cancelled() {
            tracing::warn!("Reconciliation cancelled before completion");
        } else {
            tracing::error!(error = %self, "Reconciliation step failed");
        }
        self
    }
}
