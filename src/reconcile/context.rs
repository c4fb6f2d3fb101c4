use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::{
    models::OwnerRef,
    provider::{ProviderError, ProviderResult},
};

/// Per-pass context handed down the call chain by reference.
///
/// Log annotations are not stored here. Each pass and each scope opens its
/// own `tracing` span, so sibling scopes never see each other's fields.
#[derive(Debug, Clone)]
pub struct PassContext {
    owner: OwnerRef,
    cancellation: CancellationToken,
}

impl PassContext {
    pub fn new(owner: OwnerRef) -> Self {
        Self {
            owner,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(owner: OwnerRef, cancellation: CancellationToken) -> Self {
        Self {
            owner,
            cancellation,
        }
    }

    pub fn owner(&self) -> &OwnerRef {
        &self.owner
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Run a provider call, abandoning it as soon as the pass is cancelled.
    pub async fn call<T, F>(&self, request: F) -> ProviderResult<T>
    where
        F: Future<Output = ProviderResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(ProviderError::Cancelled),
            result = request => result,
        }
    }

    pub(crate) fn pass_span(&self, kind: &'static str, cluster: &str) -> Span {
        tracing::info_span!(
            "reconcile_pass",
            kind,
            owner = %self.owner,
            cluster = %cluster,
        )
    }

    pub(crate) fn scope_span(&self, scope: &str) -> Span {
        tracing::info_span!("scope", scope = %scope)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn owner() -> OwnerRef {
        OwnerRef::new("team-a", "orders-api")
    }

    #[tokio::test]
    async fn test_call_passes_result_through() {
        let ctx = PassContext::new(owner());
        let value = ctx.call(async { Ok::<_, ProviderError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_call_returns_cancelled_when_token_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = PassContext::with_cancellation(owner(), token);

        let result = ctx.call(async { Ok::<_, ProviderError>(7) }).await;
        assert!(matches!(result, Err(ProviderError::Cancelled)));
    }

    #[tokio::test]
    async fn test_call_aborts_pending_request_on_cancel() {
        let token = CancellationToken::new();
        let ctx = PassContext::with_cancellation(owner(), token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let result = ctx
            .call(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, ProviderError>(())
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Cancelled)));
        canceller.await.unwrap();
    }
}
