//! Pipeline error types.

use crate::step::StepName;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Machine-readable classification carried by every [`PipelineError`].
///
/// The engine raises the four built-in codes for its own faults. Failures
/// produced by step bodies keep whatever code they were created with,
/// usually a [`ErrorCode::Custom`] one.
///
/// # Examples
///
/// ```
/// use stepline_core::ErrorCode;
///
/// assert_eq!(ErrorCode::Timeout.as_str(), "PIPELINE_TIMEOUT");
/// assert_eq!(ErrorCode::from("PIPELINE_TIMEOUT"), ErrorCode::Timeout);
/// assert_eq!(
///     ErrorCode::from("VALIDATION_FAILED"),
///     ErrorCode::Custom("VALIDATION_FAILED".to_string())
/// );
/// ```
///
/// New engine codes may be added, so matches outside this crate need a
/// wildcard arm:
///
/// ```compile_fail
/// use stepline_core::ErrorCode;
///
/// fn label(code: &ErrorCode) -> &str {
///     match code {
///         ErrorCode::StepExecution => "step",
///         ErrorCode::Timeout => "timeout",
///         ErrorCode::Cancelled => "cancelled",
///         ErrorCode::RetryExhausted => "retry",
///         ErrorCode::Custom(custom) => custom,
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
#[non_exhaustive]
pub enum ErrorCode {
    /// A step body panicked instead of returning a failure.
    StepExecution,
    /// A timeout-bound step exceeded its configured duration.
    Timeout,
    /// The cancellation token was set before or between steps.
    Cancelled,
    /// Every retry attempt failed.
    RetryExhausted,
    /// A caller-defined code, passed through the engine unchanged.
    Custom(String),
}

impl ErrorCode {
    /// Returns the wire form of the code.
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::StepExecution => "STEP_EXECUTION_ERROR",
            ErrorCode::Timeout => "PIPELINE_TIMEOUT",
            ErrorCode::Cancelled => "PIPELINE_CANCELLED",
            ErrorCode::RetryExhausted => "PIPELINE_RETRY_EXHAUSTED",
            ErrorCode::Custom(code) => code,
        }
    }

    /// Returns `true` for the codes the engine raises itself.
    pub fn is_engine_fault(&self) -> bool {
        !matches!(self, ErrorCode::Custom(_))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ErrorCode {
    fn from(s: &str) -> Self {
        match s {
            "STEP_EXECUTION_ERROR" => ErrorCode::StepExecution,
            "PIPELINE_TIMEOUT" => ErrorCode::Timeout,
            "PIPELINE_CANCELLED" => ErrorCode::Cancelled,
            "PIPELINE_RETRY_EXHAUSTED" => ErrorCode::RetryExhausted,
            other => ErrorCode::Custom(other.to_string()),
        }
    }
}

impl From<String> for ErrorCode {
    fn from(s: String) -> Self {
        ErrorCode::from(s.as_str())
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Custom(code) => code,
            known => known.as_str().to_string(),
        }
    }
}

/// The single error shape used by pipelines, both for failures returned
/// by step bodies and for faults raised by the engine.
///
/// # Examples
///
/// ```
/// use stepline_core::{ErrorCode, PipelineError};
///
/// let error = PipelineError::new("INVALID_EMAIL", "address has no domain")
///     .with_context("field", "email");
///
/// assert_eq!(error.code, ErrorCode::Custom("INVALID_EMAIL".to_string()));
/// assert_eq!(error.to_string(), "[INVALID_EMAIL] address has no domain");
/// assert_eq!(error.context_value("field"), Some(&"email".into()));
/// ```
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("[{code}] {message}")]
pub struct PipelineError {
    /// Classification of the failure.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Structured details attached by whoever raised the error.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, Value>,
    /// The error this one wraps, if any.
    #[source]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<PipelineError>>,
}

impl PipelineError {
    /// Creates an error with the given code and message and no context.
    pub fn new(code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            cause: None,
        }
    }

    /// Attaches a context entry, replacing any previous value for `key`.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Wraps another error as the cause of this one.
    pub fn with_cause(mut self, cause: PipelineError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Returns the context value stored under `key`.
    pub fn context_value(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    /// A step body (or predicate, or handler) panicked.
    pub fn step_execution(step: &StepName, details: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::StepExecution,
            format!("Step '{}' failed: {}", step, details),
        )
        .with_context("step", step.as_str())
    }

    /// A timeout-bound step did not settle in time.
    pub fn timeout(step: &StepName, limit: Duration) -> Self {
        let millis = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
        Self::new(
            ErrorCode::Timeout,
            format!("Step '{}' timed out after {}ms", step, millis),
        )
        .with_context("step", step.as_str())
        .with_context("timeout_ms", millis)
    }

    /// The pipeline was cancelled before `step` could start.
    pub fn cancelled(step: &StepName, reason: Option<&str>) -> Self {
        let error = Self::new(
            ErrorCode::Cancelled,
            format!("Pipeline cancelled before step '{}'", step),
        )
        .with_context("step", step.as_str());
        match reason {
            Some(reason) => error.with_context("reason", reason),
            None => error,
        }
    }

    /// Every attempt failed; `last` is the failure of the final attempt.
    pub fn retry_exhausted(attempts: u32, last: PipelineError) -> Self {
        Self::new(
            ErrorCode::RetryExhausted,
            format!(
                "Pipeline failed after {} attempt(s): {}",
                attempts, last.message
            ),
        )
        .with_context("attempts", attempts)
        .with_cause(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let error = PipelineError::step_execution(&StepName::new("parse"), "boom");
        assert_eq!(
            error.to_string(),
            "[STEP_EXECUTION_ERROR] Step 'parse' failed: boom"
        );
        assert_eq!(error.context_value("step"), Some(&Value::from("parse")));
    }

    #[test]
    fn test_timeout_context() {
        let error = PipelineError::timeout(&StepName::new("fetch"), Duration::from_millis(250));
        assert_eq!(error.code, ErrorCode::Timeout);
        assert!(error.message.contains("fetch"));
        assert!(error.message.contains("250"));
        assert_eq!(error.context_value("timeout_ms"), Some(&Value::from(250)));
    }

    #[test]
    fn test_cancelled_reason_is_optional() {
        let step = StepName::new("save");
        let without = PipelineError::cancelled(&step, None);
        assert!(without.context_value("reason").is_none());

        let with = PipelineError::cancelled(&step, Some("shutdown"));
        assert_eq!(with.context_value("reason"), Some(&Value::from("shutdown")));
    }

    #[test]
    fn test_retry_exhausted_wraps_last_error() {
        let last = PipelineError::new("UPSTREAM_DOWN", "503 from upstream");
        let error = PipelineError::retry_exhausted(3, last.clone());

        assert_eq!(error.code, ErrorCode::RetryExhausted);
        assert!(error.message.contains("3 attempt"));
        assert!(error.message.contains("503 from upstream"));
        assert_eq!(error.cause.as_deref(), Some(&last));
        assert_eq!(
            error.source().map(|s| s.to_string()),
            Some("[UPSTREAM_DOWN] 503 from upstream".to_string())
        );
    }

    #[test]
    fn test_error_code_string_forms() {
        for code in [
            ErrorCode::StepExecution,
            ErrorCode::Timeout,
            ErrorCode::Cancelled,
            ErrorCode::RetryExhausted,
        ] {
            assert!(code.is_engine_fault());
            assert_eq!(ErrorCode::from(code.as_str()), code);
        }
        assert!(!ErrorCode::from("NOT_FOUND").is_engine_fault());
    }

    #[test]
    fn test_error_serializes_code_as_string() {
        let error = PipelineError::new(ErrorCode::Cancelled, "stopped");
        let json = serde_json::to_value(&error).expect("serializable");
        assert_eq!(
            json,
            serde_json::json!({ "code": "PIPELINE_CANCELLED", "message": "stopped" })
        );

        let parsed: PipelineError = serde_json::from_value(serde_json::json!({
            "code": "RATE_LIMITED",
            "message": "slow down",
            "context": { "retry_after": 5 }
        }))
        .expect("deserializable");
        assert_eq!(parsed.code, ErrorCode::Custom("RATE_LIMITED".to_string()));
        assert_eq!(parsed.context_value("retry_after"), Some(&Value::from(5)));
    }
}
