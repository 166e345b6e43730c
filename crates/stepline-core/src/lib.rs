//! Core types for the stepline pipeline engine.
//!
//! This crate has no async runtime dependency. Step authors depend on it
//! to implement [`Step`] and to build [`PipelineError`] values; the
//! `stepline` crate supplies the executor.
//!
//! # Core Types
//!
//! - [`PipelineResult`] - Success or failure outcome, with [`success`] and [`failure`]
//! - [`PipelineError`] / [`ErrorCode`] - The single error shape used everywhere
//! - [`Step`] / [`StepName`] - A named unit of pipeline work
//! - [`CancellationToken`] - Write-once cooperative cancellation flag
//! - [`RetryPolicy`] / [`Backoff`] / [`RetryConfig`] - Whole-pipeline retry settings

mod cancellation;
mod error;
mod outcome;
mod retry;
mod step;

pub use cancellation::CancellationToken;
pub use error::{ErrorCode, PipelineError};
pub use outcome::{failure, success, PipelineResult};
pub use retry::{Backoff, RetryCallback, RetryConfig, RetryPolicy, RetryPolicyError};
pub use step::{Step, StepName, PROGRESS_COMPLETE};
