use std::{borrow::Cow, fmt, time::Duration};

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Connection settings for the identity provider's scope API.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Base URL of the scope administration API.
    pub endpoint: String,

    /// Bearer token sent with every request.
    /// Use `${VAR}` interpolation rather than committing the value.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Retry policy for transient failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080".to_string(),
            auth_token: None,
            timeout_secs: default_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("endpoint", &self.endpoint)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "****"))
            .field("timeout_secs", &self.timeout_secs)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ProviderConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.endpoint).map_err(|e| {
            ConfigError::Validation(format!("provider.endpoint '{}': {e}", self.endpoint))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "provider.endpoint must be http or https, got '{}'",
                url.scheme()
            )));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "provider.timeout_secs must be greater than zero".into(),
            ));
        }
        self.retry.validate()
    }
}

fn default_timeout() -> u64 {
    30
}

/// Configuration for provider request retries.
///
/// When enabled, retries requests on transient failures with exponential backoff.
/// Only retries on status codes that indicate temporary issues (429, 5xx).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Whether retries are enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of retry attempts (not including the initial request).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial delay before first retry in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (percentage, 0.0-1.0).
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Status codes that should trigger a retry.
    /// Default: 429 (rate limit), 500, 502, 503, 504 (server errors).
    #[serde(default = "default_retryable_status_codes")]
    pub retryable_status_codes: Vec<u16>,

    /// Override max_retries for scope registration.
    /// Registration creates a new record, so a retried request after a lost
    /// response would conflict. Default: 0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_max_retries: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
            retryable_status_codes: default_retryable_status_codes(),
            registration_max_retries: None,
        }
    }
}

const REGISTRATION_MAX_RETRIES: u32 = 0;

/// Upper bound accepted for `max_retries` and `registration_max_retries`.
const MAX_RETRIES_LIMIT: u32 = 10;

impl RetryConfig {
    /// Check if a status code should trigger a retry.
    pub fn should_retry_status(&self, status: u16) -> bool {
        self.enabled && self.retryable_status_codes.contains(&status)
    }

    /// Calculate the delay for a given retry attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            (self.initial_delay_ms as f64) * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let jitter_range = capped_delay * self.jitter;
        let jitter = if jitter_range > 0.0 {
            use rand::Rng;
            rand::thread_rng().gen_range(-jitter_range..jitter_range)
        } else {
            0.0
        };

        let final_delay = (capped_delay + jitter).max(0.0);
        Duration::from_millis(final_delay as u64)
    }

    fn with_max_retries(&self, max_retries: u32) -> Cow<'_, Self> {
        if self.max_retries == max_retries {
            Cow::Borrowed(self)
        } else {
            Cow::Owned(Self {
                max_retries,
                ..self.clone()
            })
        }
    }

    /// Retry policy for scope registration requests.
    pub fn for_registration(&self) -> Cow<'_, Self> {
        let target = self
            .registration_max_retries
            .unwrap_or(REGISTRATION_MAX_RETRIES);
        self.with_max_retries(target)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::Validation(format!(
                "provider.retry.max_retries must be at most {MAX_RETRIES_LIMIT}, got {}",
                self.max_retries
            )));
        }
        if let Some(retries) = self.registration_max_retries
            && retries > MAX_RETRIES_LIMIT
        {
            return Err(ConfigError::Validation(format!(
                "provider.retry.registration_max_retries must be at most {MAX_RETRIES_LIMIT}, \
                 got {retries}"
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::Validation(format!(
                "provider.retry.jitter must be between 0.0 and 1.0, got {}",
                self.jitter
            )));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(ConfigError::Validation(format!(
                "provider.retry.backoff_multiplier must be at least 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.1
}

fn default_retryable_status_codes() -> Vec<u16> {
    vec![429, 500, 502, 503, 504]
}
