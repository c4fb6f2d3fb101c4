//! Domain models shared by the provider client and the reconciliation engine.
//!
//! Declared types (`DeclaredScope`, `DeclaredConsumer`) come from the owning
//! workload's declaration and are rebuilt on every pass. Registration types
//! (`ScopeRegistration`, `ConsumerRegistration`) mirror what the identity
//! provider holds and are never cached across passes.

mod consumer;
mod owner;
mod scope;

pub use consumer::*;
pub use owner::*;
pub use scope::*;
