//! Background workers.
//!
//! - **Scope Sync**: periodically reconciles the declaration file against the
//!   identity provider.
//!
//! ```toml
//! [sync]
//! enabled = true
//! interval_secs = 300
//! declaration_path = "scopes.toml"
//! ```

mod scope_sync;

pub use scope_sync::{SyncError, SyncRunResult, run_sync, start_scope_sync_worker};
