//! Scope reconciliation engine.
//!
//! One pass:
//!
//! ```text
//! declared scopes ──> ScopeStash ──┬─> to_create ──> ScopeLifecycle ──┐
//!   (+ provider list)              └─> to_update ──> ScopeLifecycle ──┴─> ConsumerReconciler
//! ```
//!
//! Passes are sequential and fail fast. Nothing is retried here; the caller
//! decides when to run the next pass.

mod consumers;
mod context;
mod error;
mod lifecycle;
mod reconciler;
mod stash;
mod state;

pub use consumers::{
    ConsumerAction, ConsumerDecision, ConsumerOutcome, ConsumerPlan, ConsumerReconciler,
    ConsumerReport,
};
pub use context::PassContext;
pub use error::{AclOperation, LifecycleOperation, ReconcileError};
pub use lifecycle::ScopeLifecycle;
pub use reconciler::{FinalizeReport, PassReport, ScopeReconciler, ScopeReport};
pub use stash::ScopeStash;
pub use state::{ProviderState, Scope, ScopeAction, Transition, transition};
