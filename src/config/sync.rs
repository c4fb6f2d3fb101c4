use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Periodic reconciliation worker settings.
///
/// The worker loads the declaration file at the start of every pass, so edits
/// take effect on the next tick without a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Enable the worker started by `scopekeeper run`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between passes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Declaration file reconciled on each pass.
    #[serde(default = "default_declaration_path")]
    pub declaration_path: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
            declaration_path: default_declaration_path(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    300
}

fn default_declaration_path() -> PathBuf {
    PathBuf::from("scopes.toml")
}
