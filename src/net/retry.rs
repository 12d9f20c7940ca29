//! Retrying GET for flaky upstream routes.
//!
//! DESIGN
//! ======
//! The summary service answers 503 while a document is still being
//! processed, so those responses and transport failures are retried with a
//! `2^attempt * base` wait. Any other non-success status is a real answer
//! and fails right away.
//!
//! ERROR HANDLING
//! ==============
//! Non-retryable statuses surface as `ApiError::Status`. Running out of
//! attempts surfaces as `ApiError::RetriesExhausted` carrying the text of
//! the last failure.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::config::ChatConfig;
use crate::net::api::ApiError;

/// Attempt budget and backoff base for [`fetch_with_retry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, base_delay: Duration::from_millis(1000) }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &ChatConfig) -> Self {
        Self { max_retries: config.fetch_max_retries, base_delay: config.fetch_base_delay }
    }

    /// Wait before retrying after attempt index `attempt` failed.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// GET `url`, retrying 503 responses and transport errors.
///
/// # Errors
///
/// `ApiError::Status` for a non-success status other than 503,
/// `ApiError::RetriesExhausted` when every attempt failed.
pub async fn fetch_with_retry(
    http: &reqwest::Client,
    url: &str,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, ApiError> {
    let mut last_error = String::from("no attempt made");

    for attempt in 0..policy.max_retries {
        let is_last = attempt + 1 >= policy.max_retries;

        match http.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(%url, attempt, "retry: request succeeded");
                return Ok(response);
            }
            Ok(response) if response.status() == StatusCode::SERVICE_UNAVAILABLE => {
                warn!(%url, attempt, "retry: service unavailable");
                last_error = format!("HTTP {}", StatusCode::SERVICE_UNAVAILABLE.as_u16());
            }
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                warn!(%url, status, "retry: non-retryable status");
                return Err(ApiError::Status { status, body });
            }
            Err(e) => {
                warn!(%url, attempt, error = %e, "retry: request failed");
                last_error = e.to_string();
            }
        }

        if !is_last {
            tokio::time::sleep(policy.delay_for(attempt)).await;
        }
    }

    Err(ApiError::RetriesExhausted { attempts: policy.max_retries, last: last_error })
}

#[cfg(test)]
#[path = "retry_test.rs"]
mod tests;
