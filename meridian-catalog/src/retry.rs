//! Bounded exponential back-off for the catalog cache's retryable transport errors.
//!
//! Uses a fixed, well-defined attempt bound rather than an open-ended retry-on-sentinel-code
//! policy, so a wedged shard fails a refresh deterministically instead of retrying forever.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::CatalogError;

const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY: Duration = Duration::from_millis(20);

/// Retries `f` while it returns a retryable [`CatalogError`], doubling the delay each time,
/// up to [`MAX_ATTEMPTS`]. A non-retryable error is returned immediately. Cancellation wins
/// a race with both the call and the back-off sleep.
pub async fn with_retry<F, Fut, T>(cancel: &CancellationToken, mut f: F) -> Result<T, CatalogError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CatalogError>>,
{
    let mut delay = BASE_DELAY;
    for attempt in 1..=MAX_ATTEMPTS {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CatalogError::Cancelled),
            result = f() => result,
        };
        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                tracing::warn!(attempt, error = %e, "retrying catalog refresh after transient error");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(CatalogError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }
    unreachable!("loop always returns by the final attempt")
}
