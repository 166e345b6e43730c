//! Sequential execution of a [`Pipeline`].

use crate::pipeline::{Pipeline, ProgressHandler, StepEntry, StepKind};
use crate::unwind::{guard, guard_sync, panic_message};
use std::sync::Arc;
use std::time::Duration;
use stepline_core::{ErrorCode, PipelineError, PipelineResult, StepName, PROGRESS_COMPLETE};
use tokio::time::timeout;
use tracing::{debug, info, warn};

impl<T: Send + 'static> Pipeline<T> {
    /// Runs every step in registration order and returns the final
    /// outcome.
    ///
    /// - A failed initial outcome is returned as-is; no step runs and no
    ///   progress is reported.
    /// - The cancellation token is polled before each step. A step already
    ///   running is never interrupted.
    /// - The first failure ends the pipeline unless the error handler
    ///   recovers it. The handler runs at most once.
    /// - After the last step, progress is reported once more as
    ///   `("Complete", total, total)`.
    ///
    /// Never panics because of step code: panics in bodies, predicates and
    /// the error handler come back as `STEP_EXECUTION_ERROR`.
    pub async fn execute(self) -> PipelineResult<T> {
        let Pipeline {
            initial,
            steps,
            mut error_handler,
            progress_handler,
            cancellation,
        } = self;

        let mut current = match initial {
            Ok(value) => value,
            Err(error) => {
                debug!(
                    "Pipeline started from a failure, skipping {} step(s): {}",
                    steps.len(),
                    error
                );
                return Err(error);
            }
        };

        validate(&steps)?;

        let total = steps.len();
        for (index, entry) in steps.iter().enumerate() {
            if let Some(token) = cancellation.as_ref().filter(|t| t.is_cancelled()) {
                warn!(
                    "Pipeline cancelled before step '{}' ({}/{})",
                    entry.name,
                    index + 1,
                    total
                );
                return Err(PipelineError::cancelled(&entry.name, token.reason()));
            }

            report_progress(progress_handler.as_ref(), entry.name.as_str(), index, total);

            current = match run_step(entry, current).await {
                Ok(value) => value,
                Err(error) => {
                    warn!("Step '{}' failed: {}", entry.name, error);
                    let Some(handler) = error_handler.take() else {
                        return Err(error);
                    };

                    let step_name = entry.name.clone();
                    match guard(async move { handler(error, step_name).await }).await {
                        Ok(Ok(value)) => {
                            info!("Step '{}' recovered by error handler", entry.name);
                            value
                        }
                        Ok(Err(error)) => {
                            warn!(
                                "Error handler did not recover step '{}': {}",
                                entry.name, error
                            );
                            return Err(error);
                        }
                        Err(panic) => {
                            return Err(PipelineError::step_execution(
                                &entry.name,
                                format!("error handler panicked: {}", panic),
                            ));
                        }
                    }
                }
            };
        }

        if total > 0 {
            report_progress(progress_handler.as_ref(), PROGRESS_COMPLETE, total, total);
            info!("Pipeline completed {} step(s)", total);
        }

        Ok(current)
    }
}

fn validate<T>(steps: &[StepEntry<T>]) -> PipelineResult<()> {
    for (index, entry) in steps.iter().enumerate() {
        if entry.name.is_blank() {
            return Err(PipelineError::new(
                ErrorCode::StepExecution,
                format!("Step at position {} has an empty name", index),
            )
            .with_context("index", index));
        }
        if let StepKind::Timeout(limit) = entry.kind {
            if limit.is_zero() {
                return Err(PipelineError::new(
                    ErrorCode::StepExecution,
                    format!("Step '{}' has a zero timeout", entry.name),
                )
                .with_context("step", entry.name.as_str()));
            }
        }
    }
    Ok(())
}

async fn run_step<T: Send + 'static>(entry: &StepEntry<T>, value: T) -> PipelineResult<T> {
    debug!("Starting step '{}'", entry.name);
    match &entry.kind {
        StepKind::Plain => run_inline(entry, value).await,
        StepKind::Conditional(predicate) => match guard_sync(|| predicate(&value)) {
            Ok(true) => run_inline(entry, value).await,
            Ok(false) => {
                debug!("Skipping step '{}': condition not met", entry.name);
                Ok(value)
            }
            Err(panic) => Err(PipelineError::step_execution(
                &entry.name,
                format!("condition panicked: {}", panic),
            )),
        },
        StepKind::Timeout(limit) => run_with_timeout(entry, value, *limit).await,
    }
}

async fn run_inline<T: Send + 'static>(entry: &StepEntry<T>, value: T) -> PipelineResult<T> {
    let outcome = match guard(entry.step.run(value)).await {
        Ok(outcome) => outcome,
        Err(panic) => Err(PipelineError::step_execution(&entry.name, panic)),
    };
    log_outcome(&entry.name, &outcome);
    outcome
}

/// The body runs as its own task so that losing the race detaches it
/// rather than dropping it mid-flight.
async fn run_with_timeout<T: Send + 'static>(
    entry: &StepEntry<T>,
    value: T,
    limit: Duration,
) -> PipelineResult<T> {
    let step = Arc::clone(&entry.step);
    let body = tokio::spawn(async move { step.run(value).await });

    let outcome = match timeout(limit, body).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join_error)) => {
            let details = if join_error.is_panic() {
                panic_message(join_error.into_panic().as_ref())
            } else {
                join_error.to_string()
            };
            Err(PipelineError::step_execution(&entry.name, details))
        }
        Err(_) => {
            warn!(
                "Step '{}' timed out after {:?}; its body keeps running detached",
                entry.name, limit
            );
            return Err(PipelineError::timeout(&entry.name, limit));
        }
    };
    log_outcome(&entry.name, &outcome);
    outcome
}

fn log_outcome<T>(name: &StepName, outcome: &PipelineResult<T>) {
    if outcome.is_ok() {
        info!("Step '{}' completed successfully", name);
    }
}

fn report_progress(handler: Option<&ProgressHandler>, name: &str, index: usize, total: usize) {
    let Some(handler) = handler else {
        return;
    };
    if let Err(panic) = guard_sync(|| handler(name, index, total)) {
        warn!("Progress handler panicked at '{}': {}", name, panic);
    }
}
