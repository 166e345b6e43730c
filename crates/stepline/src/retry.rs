//! Re-running a pipeline until it succeeds.

use crate::pipeline::Pipeline;
use crate::unwind::guard_sync;
use stepline_core::{PipelineError, PipelineResult, RetryPolicy, StepName};
use tracing::{info, warn};

/// Executes a freshly built pipeline up to `policy.max_attempts()` times.
///
/// `factory` is called once per attempt because a [`Pipeline`] is consumed
/// by execution. The first success is returned immediately. After a failed
/// attempt that will be retried, the policy's `on_retry` callback receives
/// the attempt number (starting at 1) and the error, then the policy's
/// backoff delay (none by default) is awaited. When the last attempt
/// fails, the result is a `PIPELINE_RETRY_EXHAUSTED` error wrapping the
/// last failure.
///
/// A panicking factory counts as a failed attempt.
///
/// ```
/// use stepline::prelude::*;
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), RetryPolicyError> {
/// let calls = Arc::new(AtomicU32::new(0));
/// let counter = calls.clone();
///
/// let result = retry_pipeline(
///     move || {
///         let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
///         pipeline(attempt).step("flaky", |n| async move {
///             if n < 3 {
///                 Err(PipelineError::new("FLAKY", "not yet"))
///             } else {
///                 Ok(n)
///             }
///         })
///     },
///     RetryPolicy::new(3)?,
/// )
/// .await;
///
/// assert_eq!(result, Ok(3));
/// # Ok(())
/// # }
/// ```
pub async fn retry_pipeline<T, F>(mut factory: F, mut policy: RetryPolicy) -> PipelineResult<T>
where
    T: Send + 'static,
    F: FnMut() -> Pipeline<T>,
{
    let max_attempts = policy.max_attempts();
    let mut on_retry = policy.take_on_retry();
    let mut attempt = 1;

    loop {
        let error = match guard_sync(&mut factory) {
            Ok(pipeline) => match pipeline.execute().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("Pipeline succeeded on attempt {}/{}", attempt, max_attempts);
                    }
                    return Ok(value);
                }
                Err(error) => error,
            },
            Err(panic) => PipelineError::step_execution(
                &StepName::new("pipeline factory"),
                format!("factory panicked: {}", panic),
            ),
        };

        if attempt >= max_attempts {
            warn!("Pipeline failed after {} attempt(s): {}", attempt, error);
            return Err(PipelineError::retry_exhausted(attempt, error));
        }

        info!(
            "Pipeline attempt {}/{} failed, retrying: {}",
            attempt, max_attempts, error
        );
        if let Some(callback) = on_retry.as_mut() {
            if let Err(panic) = guard_sync(|| callback(attempt, &error)) {
                warn!("Retry callback panicked: {}", panic);
            }
        }
        if let Some(delay) = policy.backoff().delay_for_attempt(attempt - 1) {
            tokio::time::sleep(delay).await;
        }
        attempt += 1;
    }
}
