//! Step trait and related types.

use crate::outcome::PipelineResult;
use async_trait::async_trait;
use std::fmt;

/// Name reported to progress handlers once every step has completed.
pub const PROGRESS_COMPLETE: &str = "Complete";

/// Name of a pipeline step, used for error attribution and progress
/// reporting. Names do not have to be unique within a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepName(String);

impl StepName {
    /// Creates a new StepName.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the step name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the name is empty or only whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StepName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StepName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for StepName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for StepName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for StepName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// One unit of pipeline work: takes the current value and produces the
/// next outcome.
///
/// Expected failures should be returned as `Err`. A body that panics is
/// converted into a `STEP_EXECUTION_ERROR` failure by the executor.
///
/// # Examples
///
/// ```
/// use stepline_core::{PipelineError, PipelineResult, Step};
/// use async_trait::async_trait;
///
/// struct RejectNegative;
///
/// #[async_trait]
/// impl Step<i64> for RejectNegative {
///     async fn run(&self, value: i64) -> PipelineResult<i64> {
///         if value < 0 {
///             return Err(PipelineError::new("NEGATIVE", format!("{} is negative", value)));
///         }
///         Ok(value)
///     }
/// }
/// ```
#[async_trait]
pub trait Step<T: Send + 'static>: Send + Sync {
    /// Runs the step against the current value.
    async fn run(&self, value: T) -> PipelineResult<T>;
}
