//! Backoff for rate-limited remote calls

use std::future::Future;
use std::time::Duration;

use crate::error::{EventSyncError, Result};
use crate::types::RetryPolicy;

/// Delay before retry number `attempt` (0-based): `base * 2^attempt`, capped
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    let delay = policy.base_delay_ms.saturating_mul(factor);
    Duration::from_millis(delay.min(policy.max_delay_ms))
}

/// Run `op`, retrying while the remote answers `RateLimited`
///
/// Other errors are returned at once. Once `max_attempts` calls have been
/// rate limited the remote is reported as unavailable.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op().await {
            Err(EventSyncError::RateLimited(retry_after)) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(EventSyncError::RemoteUnavailable(format!(
                        "{}: still rate limited after {} attempts",
                        label, attempt
                    )));
                }

                let delay = backoff_delay(policy, attempt - 1);
                tracing::warn!(
                    operation = label,
                    attempt,
                    retry_after,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}
