//! Observability: structured logging and Prometheus counters.
//!
//! - Structured logging with configurable formats (pretty, compact, JSON)
//! - Prometheus counters for scope and consumer writes, labeled by owner

pub mod metrics;
mod tracing_init;

pub use tracing_init::*;
