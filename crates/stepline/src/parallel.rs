//! Concurrent fan-out over independent operations.
//!
//! [`parallel`] fails fast, [`parallel_settled`] waits for everything.
//! Both accept a `Vec`, `HashMap` or `BTreeMap` of zero-argument async
//! operations and answer in the same shape.

use crate::unwind::panic_message;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use stepline_core::{PipelineError, PipelineResult, StepName};
use tokio::task::JoinError;
use tracing::{debug, warn};

/// A boxed operation, for collections mixing different closures.
pub type Operation<T> = Box<dyn FnOnce() -> BoxFuture<'static, PipelineResult<T>> + Send>;

/// Boxes an async closure into an [`Operation`].
///
/// ```
/// use stepline::prelude::*;
///
/// # #[tokio::main]
/// # async fn main() {
/// let operations = vec![
///     operation(|| async { Ok(1) }),
///     operation(|| async { Ok(2) }),
/// ];
/// assert_eq!(parallel(operations).await, Ok(vec![1, 2]));
/// # }
/// ```
pub fn operation<T, F, Fut>(f: F) -> Operation<T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = PipelineResult<T>> + Send + 'static,
{
    Box::new(move || f().boxed())
}

/// A collection of operations whose shape is mirrored by the results.
pub trait Operations<T> {
    /// Identifies a slot: the position in a list or the key in a map.
    type Key: Send + 'static;
    /// The same collection shape holding `V` instead of operations.
    type Output<V>;

    /// Turns every operation into a not-yet-started future.
    fn into_tasks(self) -> Vec<(Self::Key, BoxFuture<'static, PipelineResult<T>>)>;

    /// Rebuilds the collection shape from settled slots, in any order.
    fn assemble<V>(slots: Vec<(Self::Key, V)>) -> Self::Output<V>;

    /// Name used to attribute a panicking operation.
    fn describe(key: &Self::Key) -> StepName;
}

impl<T, F, Fut> Operations<T> for Vec<F>
where
    T: Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = PipelineResult<T>> + Send + 'static,
{
    type Key = usize;
    type Output<V> = Vec<V>;

    fn into_tasks(self) -> Vec<(usize, BoxFuture<'static, PipelineResult<T>>)> {
        self.into_iter()
            .enumerate()
            .map(|(index, op)| (index, async move { op().await }.boxed()))
            .collect()
    }

    fn assemble<V>(mut slots: Vec<(usize, V)>) -> Vec<V> {
        slots.sort_by_key(|(index, _)| *index);
        slots.into_iter().map(|(_, value)| value).collect()
    }

    fn describe(key: &usize) -> StepName {
        StepName::new(format!("operation[{}]", key))
    }
}

impl<K, T, F, Fut> Operations<T> for HashMap<K, F>
where
    K: Eq + Hash + Debug + Send + 'static,
    T: Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = PipelineResult<T>> + Send + 'static,
{
    type Key = K;
    type Output<V> = HashMap<K, V>;

    fn into_tasks(self) -> Vec<(K, BoxFuture<'static, PipelineResult<T>>)> {
        self.into_iter()
            .map(|(key, op)| (key, async move { op().await }.boxed()))
            .collect()
    }

    fn assemble<V>(slots: Vec<(K, V)>) -> HashMap<K, V> {
        slots.into_iter().collect()
    }

    fn describe(key: &K) -> StepName {
        StepName::new(format!("operation[{:?}]", key))
    }
}

impl<K, T, F, Fut> Operations<T> for BTreeMap<K, F>
where
    K: Ord + Debug + Send + 'static,
    T: Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = PipelineResult<T>> + Send + 'static,
{
    type Key = K;
    type Output<V> = BTreeMap<K, V>;

    fn into_tasks(self) -> Vec<(K, BoxFuture<'static, PipelineResult<T>>)> {
        self.into_iter()
            .map(|(key, op)| (key, async move { op().await }.boxed()))
            .collect()
    }

    fn assemble<V>(slots: Vec<(K, V)>) -> BTreeMap<K, V> {
        slots.into_iter().collect()
    }

    fn describe(key: &K) -> StepName {
        StepName::new(format!("operation[{:?}]", key))
    }
}

/// Outcome of [`parallel_settled`]: succeeded slots and failed slots, each
/// in the input's shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Settled<S, F> {
    /// Values of the operations that succeeded.
    pub successes: S,
    /// Errors of the operations that failed.
    pub failures: F,
}

type Running<K, T> = FuturesUnordered<BoxFuture<'static, (K, PipelineResult<T>)>>;

/// Spawns every operation as its own task. Completion order, not input
/// order, drives the returned stream.
fn launch<T, O>(operations: O) -> Running<O::Key, T>
where
    T: Send + 'static,
    O: Operations<T>,
{
    operations
        .into_tasks()
        .into_iter()
        .map(|(key, task)| {
            let label = O::describe(&key);
            tokio::spawn(task)
                .map(move |joined| (key, flatten(&label, joined)))
                .boxed()
        })
        .collect()
}

fn flatten<T>(label: &StepName, joined: Result<PipelineResult<T>, JoinError>) -> PipelineResult<T> {
    match joined {
        Ok(outcome) => outcome,
        Err(join_error) if join_error.is_panic() => Err(PipelineError::step_execution(
            label,
            panic_message(join_error.into_panic().as_ref()),
        )),
        Err(join_error) => Err(PipelineError::step_execution(label, join_error)),
    }
}

/// Runs all operations concurrently and fails fast.
///
/// Returns the first failure observed, in completion order. The remaining
/// operations are not stopped; they finish in the background and their
/// outcomes are discarded. If every operation succeeds, the values come
/// back in the input's shape.
///
/// Each operation is spawned with `tokio::spawn`, so this must be awaited
/// inside a tokio runtime.
///
/// ```
/// use stepline::prelude::*;
/// use std::collections::HashMap;
///
/// # #[tokio::main]
/// # async fn main() {
/// let mut lookups = HashMap::new();
/// lookups.insert("user", operation(|| async { Ok("ada".to_string()) }));
/// lookups.insert("role", operation(|| async { Ok("admin".to_string()) }));
///
/// let found = parallel(lookups).await.unwrap();
/// assert_eq!(found["user"], "ada");
/// assert_eq!(found["role"], "admin");
/// # }
/// ```
pub async fn parallel<T, O>(operations: O) -> PipelineResult<O::Output<T>>
where
    T: Send + 'static,
    O: Operations<T>,
{
    let mut running = launch(operations);
    let total = running.len();
    let mut completed = Vec::with_capacity(total);

    while let Some((key, outcome)) = running.next().await {
        match outcome {
            Ok(value) => completed.push((key, value)),
            Err(error) => {
                warn!(
                    "Parallel operation failed, abandoning {} still running: {}",
                    running.len(),
                    error
                );
                return Err(error);
            }
        }
    }

    debug!("All {} parallel operation(s) succeeded", total);
    Ok(O::assemble(completed))
}

/// Runs all operations concurrently and waits for every one of them.
///
/// Always succeeds; the value splits the outcomes into `successes` and
/// `failures`, each keeping the input's shape and relative order.
///
/// Like [`parallel`], it must be awaited inside a tokio runtime.
pub async fn parallel_settled<T, O>(
    operations: O,
) -> PipelineResult<Settled<O::Output<T>, O::Output<PipelineError>>>
where
    T: Send + 'static,
    O: Operations<T>,
{
    let mut running = launch(operations);
    let mut successes = Vec::new();
    let mut failures = Vec::new();

    while let Some((key, outcome)) = running.next().await {
        match outcome {
            Ok(value) => successes.push((key, value)),
            Err(error) => failures.push((key, error)),
        }
    }

    debug!(
        "Parallel operations settled: {} succeeded, {} failed",
        successes.len(),
        failures.len()
    );
    Ok(Settled {
        successes: O::assemble(successes),
        failures: O::assemble(failures),
    })
}
