//! Declarations of an owning resource: who owns the scopes and what they
//! should look like.
//!
//! ```toml
//! [owner]
//! namespace = "team-a"
//! name = "orders-api"
//!
//! [scopes.read]
//! description = "Read orders"
//! consumers = [{ orgno = "999888777", name = "Acme" }]
//!
//! [scopes.write]
//! enabled = false
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::expand_env_vars,
    models::{DeclaredScopes, OwnerRef, QUALIFIED_NAME_SEPARATOR},
};

#[derive(Debug, Error)]
pub enum DeclarationError {
    #[error("Failed to read declaration {1}: {0}")]
    Io(std::io::Error, PathBuf),

    #[error("Failed to parse declaration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid declaration: {0}")]
    Validation(String),
}

impl From<crate::config::ConfigError> for DeclarationError {
    fn from(err: crate::config::ConfigError) -> Self {
        DeclarationError::Validation(err.to_string())
    }
}

/// The scopes declared by one owning resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Declaration {
    pub owner: OwnerRef,

    #[serde(default)]
    pub scopes: DeclaredScopes,
}

impl Declaration {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DeclarationError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| DeclarationError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    pub fn from_str(contents: &str) -> Result<Self, DeclarationError> {
        let expanded = expand_env_vars(contents)?;
        let mut declaration: Declaration = toml::from_str(&expanded)?;
        declaration.normalize()?;
        Ok(declaration)
    }

    /// Fill scope names from their keys and reject names the provider could
    /// not address.
    fn normalize(&mut self) -> Result<(), DeclarationError> {
        if self.owner.namespace.is_empty() || self.owner.name.is_empty() {
            return Err(DeclarationError::Validation(
                "owner.namespace and owner.name must not be empty".into(),
            ));
        }

        for (key, scope) in self.scopes.iter_mut() {
            if key.is_empty() || key.contains(QUALIFIED_NAME_SEPARATOR) {
                return Err(DeclarationError::Validation(format!(
                    "scope name '{key}' must be non-empty and must not contain \
                     '{QUALIFIED_NAME_SEPARATOR}'"
                )));
            }
            if !scope.name.is_empty() && scope.name != *key {
                tracing::warn!(
                    scope = %key,
                    declared_name = %scope.name,
                    "Scope name differs from its key, using the key"
                );
            }
            scope.name = key.clone();

            for consumer in scope.consumers.iter_mut() {
                let trimmed = consumer.orgno.trim();
                if trimmed.is_empty() {
                    return Err(DeclarationError::Validation(format!(
                        "scope '{key}' has a consumer with an empty orgno ({:?})",
                        consumer.name
                    )));
                }
                if trimmed.len() != consumer.orgno.len() {
                    consumer.orgno = trimmed.to_string();
                }
            }
        }

        Ok(())
    }
}
