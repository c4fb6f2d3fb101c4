//! Prometheus metrics for scope reconciliation.
//!
//! Provides counters for:
//! - Scope lifecycle writes (created, updated, reactivated, deleted)
//! - Consumer ACL writes
//! - Reconciliation passes and their duration
//!
//! Every series is labeled with the owning resource (`owner_namespace`,
//! `owner_name`).

#[cfg(feature = "prometheus")]
use metrics::{counter, histogram};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::{config::MetricsConfig, models::OwnerRef};

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a tokio runtime; the listener runs as a task on it.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(config.address)
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
            &seconds_from_ms(&config.latency_buckets_ms),
        )
        .map_err(|e| MetricsError::Setup(e.to_string()))?
        .install()?;

    tracing::info!(address = %config.address, "Prometheus metrics listener started");
    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(_config: &MetricsConfig) -> Result<(), MetricsError> {
    Ok(())
}

#[cfg(feature = "prometheus")]
fn seconds_from_ms(ms_buckets: &[f64]) -> Vec<f64> {
    ms_buckets.iter().map(|ms| ms / 1000.0).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Scope lifecycle
// ─────────────────────────────────────────────────────────────────────────────

pub fn record_scope_created(owner: &OwnerRef) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "scopekeeper_scope_created_total",
            "owner_namespace" => owner.namespace.clone(),
            "owner_name" => owner.name.clone()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = owner;
    }
}

pub fn record_scope_updated(owner: &OwnerRef) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "scopekeeper_scope_updated_total",
            "owner_namespace" => owner.namespace.clone(),
            "owner_name" => owner.name.clone()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = owner;
    }
}

/// Record a previously inactive scope being activated again.
pub fn record_scope_reactivated(owner: &OwnerRef) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "scopekeeper_scope_reactivated_total",
            "owner_namespace" => owner.namespace.clone(),
            "owner_name" => owner.name.clone()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = owner;
    }
}

/// Record a scope deactivation, either from a disabled declaration or finalization.
pub fn record_scope_deleted(owner: &OwnerRef) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "scopekeeper_scope_deleted_total",
            "owner_namespace" => owner.namespace.clone(),
            "owner_name" => owner.name.clone()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = owner;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Consumers
// ─────────────────────────────────────────────────────────────────────────────

/// Record a consumer added to (or re-approved on) a scope ACL.
///
/// # Arguments
/// * `state` - The ACL state the provider reported back (e.g. "APPROVED")
pub fn record_consumer_created_or_updated(owner: &OwnerRef, state: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "scopekeeper_consumer_created_or_updated_total",
            "owner_namespace" => owner.namespace.clone(),
            "owner_name" => owner.name.clone(),
            "state" => state.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (owner, state);
    }
}

pub fn record_consumer_deleted(owner: &OwnerRef) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "scopekeeper_consumer_deleted_total",
            "owner_namespace" => owner.namespace.clone(),
            "owner_name" => owner.name.clone()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = owner;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Passes
// ─────────────────────────────────────────────────────────────────────────────

/// Record a completed reconciliation pass.
///
/// # Arguments
/// * `kind` - "process" or "finalize"
/// * `outcome` - "success", "error" or "cancelled"
/// * `duration_secs` - Wall-clock duration of the pass
pub fn record_reconcile_pass(owner: &OwnerRef, kind: &str, outcome: &str, duration_secs: f64) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "scopekeeper_reconcile_passes_total",
            "owner_namespace" => owner.namespace.clone(),
            "owner_name" => owner.name.clone(),
            "kind" => kind.to_string(),
            "outcome" => outcome.to_string()
        )
        .increment(1);

        histogram!(
            "scopekeeper_reconcile_pass_duration_seconds",
            "kind" => kind.to_string()
        )
        .record(duration_secs);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (owner, kind, outcome, duration_secs);
    }
}

/// Metrics initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}
