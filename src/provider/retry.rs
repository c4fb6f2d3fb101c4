//! Transport-level retry for provider HTTP requests.
//!
//! Retries connection failures, timeouts, rate limits (429) and server errors
//! with exponential backoff. This lives inside the HTTP client only; the
//! reconciliation engine itself never retries and leaves rescheduling to
//! whoever invokes the next pass.

use std::future::Future;

use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::config::RetryConfig;

/// Determines if a reqwest error is retryable.
pub fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_connect()
        || error.is_timeout()
        || error.is_request()
        || error
            .status()
            .map(|s| s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS)
            .unwrap_or(false)
}

/// Execute a request with retry logic.
///
/// `make_request` is called once per attempt. Returns the first response whose
/// status is not retryable, the last response once attempts are exhausted, or
/// the last transport error.
pub async fn with_retry<F, Fut>(
    config: &RetryConfig,
    operation: &str,
    make_request: F,
) -> Result<reqwest::Response, reqwest::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    if !config.enabled {
        return make_request().await;
    }

    let max_attempts = config.max_retries.saturating_add(1);
    let mut attempt: u32 = 0;

    loop {
        let is_last = attempt.saturating_add(1) >= max_attempts;

        match make_request().await {
            Ok(response) => {
                let status = response.status();
                if config.should_retry_status(status.as_u16()) && !is_last {
                    let delay = config.delay_for_attempt(attempt);
                    warn!(
                        operation,
                        status = %status,
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = delay.as_millis(),
                        "Retryable status code, will retry after delay"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }

                if attempt > 0 {
                    debug!(
                        operation,
                        status = %status,
                        attempt = attempt + 1,
                        "Request completed after retry"
                    );
                }
                return Ok(response);
            }
            Err(error) => {
                if is_retryable_error(&error) && !is_last {
                    let delay = config.delay_for_attempt(attempt);
                    warn!(
                        operation,
                        error = %error,
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = delay.as_millis(),
                        "Retryable error, will retry after delay"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }

                if attempt > 0 {
                    warn!(
                        operation,
                        error = %error,
                        attempts = attempt + 1,
                        "Request failed after all retry attempts"
                    );
                }
                return Err(error);
            }
        }
    }
}
