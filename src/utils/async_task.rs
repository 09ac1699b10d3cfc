use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio::time::timeout;
use tracing::warn;

use crate::BackoffPolicy;
use crate::RemoteError;
use crate::Result;

/// Runs `fut` under `duration`; an elapsed timer becomes
/// `RemoteError::Timeout` so callers treat it like any remote failure.
pub(crate) async fn with_timeout<F, T>(
    op: &'static str,
    duration: Duration,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout { op, duration }.into()),
    }
}

/// Retries `task` with exponential backoff capped at `max_delay_ms`.
///
/// `max_retries == 0` retries until success. Returns the last error once the
/// retries are exhausted.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    op: &'static str,
    task: F,
    policy: BackoffPolicy,
) -> Result<P>
where
    F: Fn() -> T,
    T: Future<Output = Result<P>>,
{
    let mut attempt = 0;
    let mut delay = Duration::from_millis(policy.base_delay_ms);
    let max_delay = Duration::from_millis(policy.max_delay_ms);
    loop {
        attempt += 1;
        let error = match with_timeout(op, policy.timeout(), task()).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if policy.max_retries != 0 && attempt >= policy.max_retries {
            warn!(op, attempt, ?error, "task failed after max retries");
            return Err(error);
        }
        warn!(op, attempt, ?error, "task failed, retrying in {:?}", delay);
        sleep(delay).await;
        delay = (delay * 2).min(max_delay);
    }
}
