use std::future::Future;
use std::time::Duration;

use crate::error::LlmError;
use crate::rate_limit::RateLimiter;

const BASE_BACKOFF_SECS: u64 = 1;
const MAX_BACKOFF_SECS: u64 = 60;

/// Exponential backoff capped at [`MAX_BACKOFF_SECS`].
pub(crate) fn backoff(attempt: u32) -> Duration {
    let secs = BASE_BACKOFF_SECS
        .checked_shl(attempt)
        .unwrap_or(MAX_BACKOFF_SECS)
        .min(MAX_BACKOFF_SECS);
    Duration::from_secs(secs)
}

/// Parse the `Retry-After` header value as seconds, falling back to exponential backoff.
pub(crate) fn retry_delay(response: &reqwest::Response, attempt: u32) -> Duration {
    if let Some(val) = response.headers().get("retry-after")
        && let Ok(s) = val.to_str()
        && let Ok(secs) = s.parse::<u64>()
    {
        return Duration::from_secs(secs);
    }
    backoff(attempt)
}

/// Send an HTTP request, retrying up to `max_retries` times on 429, 5xx and
/// connection-level failures.
///
/// The limiter, when present, is consulted before every attempt. Client errors
/// (4xx other than 429) are returned to the caller untouched for inspection.
///
/// # Errors
///
/// Returns `LlmError::RateLimited` if all attempts hit 429, or the underlying
/// `reqwest::Error` wrapped as `LlmError::Http` for transport failures.
pub(crate) async fn send_with_retry<F, Fut>(
    provider_name: &str,
    max_retries: u32,
    limiter: Option<&RateLimiter>,
    mut f: F,
) -> Result<reqwest::Response, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    for attempt in 0..=max_retries {
        if let Some(limiter) = limiter {
            limiter.acquire().await;
        }

        let response = match f().await {
            Ok(response) => response,
            Err(e) if attempt < max_retries && (e.is_connect() || e.is_timeout()) => {
                let delay = backoff(attempt);
                tracing::warn!(
                    "{provider_name} request failed ({e}), retrying in {}s ({}/{max_retries})",
                    delay.as_secs(),
                    attempt + 1,
                );
                tokio::time::sleep(delay).await;
                continue;
            }
            Err(e) => return Err(LlmError::Http(e)),
        };
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            if attempt == max_retries {
                return Err(LlmError::RateLimited);
            }
            let delay = retry_delay(&response, attempt);
            tracing::warn!(
                "{provider_name} rate limited, retrying in {}s ({}/{max_retries})",
                delay.as_secs(),
                attempt + 1,
            );
            tokio::time::sleep(delay).await;
            continue;
        }

        if status.is_server_error() && attempt < max_retries {
            let delay = backoff(attempt);
            tracing::warn!(
                "{provider_name} server error {status}, retrying in {}s ({}/{max_retries})",
                delay.as_secs(),
                attempt + 1,
            );
            tokio::time::sleep(delay).await;
            continue;
        }

        return Ok(response);
    }

    Err(LlmError::RateLimited)
}
