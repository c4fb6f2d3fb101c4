//! Configuration for the scope reconciler.
//!
//! Configured via a TOML file, with support for environment variable
//! interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! cluster_name = "prod-gcp"
//!
//! [provider]
//! endpoint = "https://scopes.example.com"
//! auth_token = "${SCOPE_API_TOKEN}"
//!
//! [sync]
//! interval_secs = 300
//! declaration_path = "/etc/scopekeeper/scopes.toml"
//! ```

mod observability;
mod provider;
mod sync;

use std::path::Path;

pub use observability::*;
pub use provider::*;
use serde::{Deserialize, Serialize};
pub use sync::*;

use crate::models::QUALIFIED_NAME_SEPARATOR;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScopekeeperConfig {
    /// Cluster identity. Used as the provider-side prefix of every scope
    /// this instance owns.
    pub cluster_name: String,

    /// Identity provider connection.
    pub provider: ProviderConfig,

    /// Periodic reconciliation worker.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Observability configuration (logging, metrics).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl ScopekeeperConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing required variables will cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: ScopekeeperConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "cluster_name must not be empty".into(),
            ));
        }
        if self.cluster_name.contains(QUALIFIED_NAME_SEPARATOR) {
            return Err(ConfigError::Validation(format!(
                "cluster_name '{}' must not contain '{QUALIFIED_NAME_SEPARATOR}'",
                self.cluster_name
            )));
        }
        if self.sync.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "sync.interval_secs must be greater than zero".into(),
            ));
        }
        if self.observability.metrics.enabled && !cfg!(feature = "prometheus") {
            return Err(ConfigError::Validation(
                "observability.metrics.enabled requires the 'prometheus' feature\n\
                 Rebuild with: cargo build --features prometheus"
                    .into(),
            ));
        }

        self.provider.validate()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand environment variables in the format `${VAR_NAME}`.
/// Variables after a `#` on the same line are left untouched.
pub(crate) fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex is valid");
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let Some(whole) = cap.get(0) else { continue };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            result.push_str(&value);

            last_end = whole.end();
        }

        result.push_str(&line[last_end..]);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
