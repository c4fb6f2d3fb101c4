//! Scope sync worker.
//!
//! Re-reads the declaration file and runs a reconciliation pass at a fixed
//! interval:
//! - Errors don't stop the worker; they are logged and the next tick retries
//! - The first pass runs immediately on startup
//! - Cancelling the token interrupts an in-flight pass and stops the loop

use std::{path::Path, time::Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    config::SyncConfig,
    declared::{Declaration, DeclarationError},
    reconcile::{PassContext, ReconcileError, ScopeReconciler},
};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// Results from a single sync run.
#[derive(Debug)]
pub struct SyncRunResult {
    /// Number of scopes in the declaration.
    pub scope_count: usize,
    /// Provider writes issued by the pass.
    pub write_count: usize,
    /// Duration of the pass in milliseconds.
    pub duration_ms: u64,
}

/// Runs the scope sync worker until `shutdown` is cancelled.
pub async fn start_scope_sync_worker(
    reconciler: ScopeReconciler,
    config: SyncConfig,
    shutdown: CancellationToken,
) {
    if !config.enabled {
        tracing::info!("Scope sync worker disabled by configuration");
        return;
    }

    tracing::info!(
        interval_secs = config.interval_secs,
        declaration = %config.declaration_path.display(),
        cluster = %reconciler.cluster(),
        "Starting scope sync worker"
    );

    let interval = std::time::Duration::from_secs(config.interval_secs);

    loop {
        match run_sync(&reconciler, &config.declaration_path, &shutdown).await {
            Ok(result) => {
                tracing::info!(
                    scope_count = result.scope_count,
                    write_count = result.write_count,
                    duration_ms = result.duration_ms,
                    "Scope sync complete"
                );
            }
            Err(SyncError::Reconcile(ReconcileError::Cancelled)) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Scope sync failed, retrying next interval");
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::info!("Scope sync worker stopped");
}

/// Load the declaration and run one reconciliation pass.
pub async fn run_sync(
    reconciler: &ScopeReconciler,
    declaration_path: &Path,
    shutdown: &CancellationToken,
) -> Result<SyncRunResult, SyncError> {
    let start = Instant::now();

    let declaration = Declaration::from_file(declaration_path)?;
    let ctx = PassContext::with_cancellation(declaration.owner.clone(), shutdown.child_token());
    let report = reconciler.process(&ctx, &declaration.scopes).await?;

    Ok(SyncRunResult {
        scope_count: declaration.scopes.len(),
        write_count: report.write_count(),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}
