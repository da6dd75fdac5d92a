use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::LeaveError;

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(25);

/// Re-runs `op` while it fails with a retryable error, doubling the delay each time.
///
/// Each attempt must be a complete atomic unit: the store has already rolled back the
/// failed one, so re-running it from scratch is safe.
pub async fn with_backoff<T, F, Fut>(
    attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T, LeaveError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LeaveError>>,
{
    let attempts = attempts.max(1);
    let mut delay = base_delay;

    for attempt in 1..=attempts {
        match op().await {
            Err(e) if e.is_retryable() && attempt < attempts => {
                warn!(attempt, delay_ms = delay.as_millis() as u64, "Lock contention, retrying");
                actix_web::rt::time::sleep(delay).await;
                delay *= 2;
            }
            outcome => return outcome,
        }
    }

    Err(LeaveError::Contention)
}

/// [`with_backoff`] with the defaults used by the HTTP handlers.
pub async fn retry_on_contention<T, F, Fut>(op: F) -> Result<T, LeaveError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LeaveError>>,
{
    with_backoff(DEFAULT_ATTEMPTS, DEFAULT_BASE_DELAY, op).await
}
