use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use agui_core::current_unix_timestamp_ms;
use chrono::{DateTime, Utc};
use tokio::time::sleep;

use crate::AiError;

pub(crate) const BASE_BACKOFF_MS: u64 = 200;
pub(crate) const REQUEST_ID_HEADER: &str = "x-agui-request-id";
pub(crate) const RETRY_ATTEMPT_HEADER: &str = "x-agui-retry-attempt";

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);
static JITTER_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Retry limits shared by every provider client.
pub(crate) struct RetryPolicy {
    pub max_retries: usize,
    /// Upper bound on total elapsed time spent retrying; `0` means unbounded.
    pub retry_budget_ms: u64,
    pub jitter: bool,
}

pub(crate) fn should_retry_status(status: u16) -> bool {
    matches!(status, 408 | 409 | 425 | 429) || status >= 500
}

pub(crate) fn next_backoff_ms(attempt: usize) -> u64 {
    BASE_BACKOFF_MS.saturating_mul(1_u64 << attempt.min(6))
}

/// Backoff for `attempt`, optionally jittered into `[50%, 100%]` of the base delay.
pub(crate) fn next_backoff_ms_with_jitter(attempt: usize, jitter_enabled: bool) -> u64 {
    let base = next_backoff_ms(attempt);
    if !jitter_enabled || base <= 1 {
        return base;
    }

    let floor = base / 2;
    let span = base - floor;
    let seed = JITTER_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mixed = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).rotate_left(17) ^ 0xA24B_AED4_963E_E407;
    floor + mixed % (span + 1)
}

/// Reads `Retry-After` as either delta-seconds or an HTTP date.
pub(crate) fn parse_retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let raw = headers.get("retry-after")?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(seconds.saturating_mul(1000));
    }

    let retry_at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    let delay_ms = retry_at.signed_duration_since(Utc::now()).num_milliseconds();
    Some(u64::try_from(delay_ms).unwrap_or(0))
}

pub(crate) fn provider_retry_delay_ms(
    attempt: usize,
    jitter_enabled: bool,
    retry_after_ms: Option<u64>,
) -> u64 {
    let backoff_ms = next_backoff_ms_with_jitter(attempt, jitter_enabled);
    retry_after_ms.map_or(backoff_ms, |floor| backoff_ms.max(floor))
}

pub(crate) fn retry_budget_allows_delay(elapsed_ms: u64, delay_ms: u64, retry_budget_ms: u64) -> bool {
    retry_budget_ms == 0 || elapsed_ms.saturating_add(delay_ms) <= retry_budget_ms
}

pub(crate) fn is_retryable_http_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

pub(crate) fn new_request_id() -> String {
    let count = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("agui-{}-{count}", current_unix_timestamp_ms())
}

/// Sends the request produced by `build` until it succeeds or retries are exhausted.
///
/// `build` is called once per attempt because a `RequestBuilder` is consumed
/// by `send`. Non-success responses are drained into [`AiError::HttpStatus`].
pub(crate) async fn send_with_retries<F>(
    provider: &'static str,
    policy: RetryPolicy,
    mut build: F,
) -> Result<reqwest::Response, AiError>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    let started = Instant::now();
    let mut attempt = 0_usize;

    loop {
        let request_id = new_request_id();
        tracing::debug!(provider, attempt, request_id = %request_id, "sending provider request");
        let outcome = build()
            .header(REQUEST_ID_HEADER, request_id.as_str())
            .header(RETRY_ATTEMPT_HEADER, attempt.to_string())
            .send()
            .await;

        let (retryable, retry_after_ms, failure) = match outcome {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status().as_u16();
                let retry_after_ms = parse_retry_after_ms(response.headers());
                let body = response.text().await.unwrap_or_default();
                (
                    should_retry_status(status),
                    retry_after_ms,
                    AiError::HttpStatus { status, body },
                )
            }
            Err(error) => (is_retryable_http_error(&error), None, AiError::Http(error)),
        };

        if !retryable || attempt >= policy.max_retries {
            return Err(failure);
        }
        let delay_ms = provider_retry_delay_ms(attempt, policy.jitter, retry_after_ms);
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if !retry_budget_allows_delay(elapsed_ms, delay_ms, policy.retry_budget_ms) {
            return Err(failure);
        }

        tracing::debug!(provider, attempt, delay_ms, error = %failure, "retrying provider request");
        sleep(Duration::from_millis(delay_ms)).await;
        attempt += 1;
    }
}
