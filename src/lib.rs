//! Scopekeeper reconciles declared API scopes and their consumer grants
//! against an external identity provider.
//!
//! The [`reconcile::ScopeReconciler`] is the entry point. It is driven once
//! per owning resource by the CLI, or periodically by the sync worker in
//! [`jobs`].

pub mod config;
pub mod declared;
pub mod events;
pub mod jobs;
pub mod models;
pub mod observability;
pub mod provider;
pub mod reconcile;

#[cfg(test)]
mod tests;
