//! Fluent pipeline builder.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use stepline_core::{CancellationToken, PipelineError, PipelineResult, Step, StepName};

pub(crate) type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;
pub(crate) type ErrorHandler<T> =
    Box<dyn FnOnce(PipelineError, StepName) -> BoxFuture<'static, PipelineResult<T>> + Send>;
pub(crate) type ProgressHandler = Box<dyn Fn(&str, usize, usize) + Send + Sync>;

pub(crate) enum StepKind<T> {
    Plain,
    Conditional(Predicate<T>),
    Timeout(Duration),
}

pub(crate) struct StepEntry<T> {
    pub(crate) name: StepName,
    pub(crate) kind: StepKind<T>,
    pub(crate) step: Arc<dyn Step<T>>,
}

/// An ordered, single-use sequence of named steps run against an evolving
/// value.
///
/// Builder methods only record steps and hooks; nothing runs until
/// [`execute`](Pipeline::execute) consumes the pipeline.
///
/// # Examples
///
/// ```
/// use stepline::prelude::*;
///
/// # #[tokio::main]
/// # async fn main() {
/// let result = Pipeline::new("hello".to_string())
///     .map("uppercase", |s| s.to_uppercase())
///     .map("add-suffix", |s| s + "!")
///     .execute()
///     .await;
///
/// assert_eq!(result, Ok("HELLO!".to_string()));
/// # }
/// ```
pub struct Pipeline<T> {
    pub(crate) initial: PipelineResult<T>,
    pub(crate) steps: Vec<StepEntry<T>>,
    pub(crate) error_handler: Option<ErrorHandler<T>>,
    pub(crate) progress_handler: Option<ProgressHandler>,
    pub(crate) cancellation: Option<CancellationToken>,
}

impl<T> fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("initial_ok", &self.initial.is_ok())
            .field(
                "steps",
                &self.steps.iter().map(|s| &s.name).collect::<Vec<_>>(),
            )
            .field("on_error", &self.error_handler.is_some())
            .field("on_progress", &self.progress_handler.is_some())
            .field("cancellation", &self.cancellation)
            .finish()
    }
}

/// Starts a pipeline from a plain value.
pub fn pipeline<T: Send + 'static>(initial: T) -> Pipeline<T> {
    Pipeline::new(initial)
}

/// Starts a pipeline from an existing outcome.
///
/// A failed outcome short-circuits the whole pipeline: no step runs.
pub fn pipeline_from<T: Send + 'static>(initial: PipelineResult<T>) -> Pipeline<T> {
    Pipeline::from_result(initial)
}

impl<T: Send + 'static> Pipeline<T> {
    /// Creates a pipeline whose initial outcome is `Ok(initial)`.
    pub fn new(initial: T) -> Self {
        Self::from_result(Ok(initial))
    }

    /// Creates a pipeline from an outcome, used as-is.
    pub fn from_result(initial: PipelineResult<T>) -> Self {
        Self {
            initial,
            steps: Vec::new(),
            error_handler: None,
            progress_handler: None,
            cancellation: None,
        }
    }

    fn push(mut self, name: StepName, kind: StepKind<T>, step: Arc<dyn Step<T>>) -> Self {
        self.steps.push(StepEntry { name, kind, step });
        self
    }

    /// Adds a synchronous transform of the current value.
    ///
    /// A panic inside `f` becomes a `STEP_EXECUTION_ERROR` failure.
    pub fn map<F>(self, name: impl Into<StepName>, f: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        self.push(name.into(), StepKind::Plain, Arc::new(MapStep(f)))
    }

    /// Adds an asynchronous step returning its own outcome.
    ///
    /// ```
    /// use stepline::prelude::*;
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let result = pipeline(10)
    ///     .step("fail", |_| async { Err(PipelineError::new("RECOVERABLE_ERROR", "try again")) })
    ///     .on_error(|_, _| async { Ok(42) })
    ///     .execute()
    ///     .await;
    ///
    /// assert_eq!(result, Ok(42));
    /// # }
    /// ```
    pub fn step<F, Fut>(self, name: impl Into<StepName>, f: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PipelineResult<T>> + Send + 'static,
    {
        self.push(name.into(), StepKind::Plain, Arc::new(FnStep(f)))
    }

    /// Adds a step that only runs when `predicate` holds for the current
    /// value. A skipped step leaves the value unchanged but still counts
    /// towards progress reporting.
    ///
    /// A panicking predicate fails the pipeline with
    /// `STEP_EXECUTION_ERROR`; it is not treated as a skip.
    ///
    /// ```
    /// use stepline::prelude::*;
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let result = pipeline(10)
    ///     .step_if("double-if-even", |v| v % 2 == 0, |v| async move { Ok(v * 2) })
    ///     .step_if("triple-if-odd", |v| v % 2 != 0, |v| async move { Ok(v * 3) })
    ///     .execute()
    ///     .await;
    ///
    /// assert_eq!(result, Ok(20));
    /// # }
    /// ```
    pub fn step_if<P, F, Fut>(self, name: impl Into<StepName>, predicate: P, f: F) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PipelineResult<T>> + Send + 'static,
    {
        self.push(
            name.into(),
            StepKind::Conditional(Box::new(predicate)),
            Arc::new(FnStep(f)),
        )
    }

    /// Adds a step raced against a timer of `timeout`.
    ///
    /// If the timer wins, the pipeline sees a `PIPELINE_TIMEOUT` failure.
    /// The body is not stopped: it keeps running on the runtime until it
    /// finishes on its own, and its outcome is discarded. Bodies that
    /// should stop early can poll a clone of the pipeline's
    /// [`CancellationToken`].
    ///
    /// Timeout-bound steps are spawned with `tokio::spawn`, so the
    /// pipeline must be executed inside a tokio runtime.
    pub fn step_with_timeout<F, Fut>(
        self,
        name: impl Into<StepName>,
        timeout: Duration,
        f: F,
    ) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PipelineResult<T>> + Send + 'static,
    {
        self.push(name.into(), StepKind::Timeout(timeout), Arc::new(FnStep(f)))
    }

    /// Adds a step implemented as a type.
    pub fn add_step<S: Step<T> + 'static>(self, name: impl Into<StepName>, step: S) -> Self {
        self.push(name.into(), StepKind::Plain, Arc::new(step))
    }

    /// Adds a step implemented as a type, raced against `timeout`.
    pub fn add_step_with_timeout<S: Step<T> + 'static>(
        self,
        name: impl Into<StepName>,
        timeout: Duration,
        step: S,
    ) -> Self {
        self.push(name.into(), StepKind::Timeout(timeout), Arc::new(step))
    }

    /// Registers the recovery handler.
    ///
    /// It is called at most once per execution, with the error and the
    /// name of the failing step. `Ok` resumes the pipeline at the next
    /// step with the recovered value; `Err` ends the pipeline with that
    /// error. A later registration replaces an earlier one.
    pub fn on_error<F, Fut>(mut self, handler: F) -> Self
    where
        F: FnOnce(PipelineError, StepName) -> Fut + Send + 'static,
        Fut: Future<Output = PipelineResult<T>> + Send + 'static,
    {
        self.error_handler = Some(Box::new(move |error, step| handler(error, step).boxed()));
        self
    }

    /// Registers the progress handler, called with
    /// `(step_name, index, total)` before each step and with
    /// `("Complete", total, total)` after the last one.
    pub fn on_progress<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, usize, usize) + Send + Sync + 'static,
    {
        self.progress_handler = Some(Box::new(handler));
        self
    }

    /// Attaches a cancellation token, checked before each step.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Returns the number of registered steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` if no step has been registered.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the step names in registration order.
    pub fn step_names(&self) -> impl Iterator<Item = &StepName> {
        self.steps.iter().map(|entry| &entry.name)
    }
}

struct FnStep<F>(F);

#[async_trait]
impl<T, F, Fut> Step<T> for FnStep<F>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = PipelineResult<T>> + Send + 'static,
{
    async fn run(&self, value: T) -> PipelineResult<T> {
        (self.0)(value).await
    }
}

struct MapStep<F>(F);

#[async_trait]
impl<T, F> Step<T> for MapStep<F>
where
    T: Send + 'static,
    F: Fn(T) -> T + Send + Sync,
{
    async fn run(&self, value: T) -> PipelineResult<T> {
        Ok((self.0)(value))
    }
}
