//! A composable async step pipeline for Rust.
//!
//! A [`Pipeline`] threads a value through named steps in order. Each step
//! returns a [`PipelineResult`]; the first failure stops the chain unless an
//! error handler recovers it. Steps can be conditional or bound by a
//! timeout, and execution can be cancelled between steps.
//!
//! Independent pipelines compose with [`parallel`] (fail fast) and
//! [`parallel_settled`] (collect everything), and a whole pipeline can be
//! re-run with [`retry_pipeline`].
//!
//! # Example
//!
//! ```rust
//! use stepline::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let result = pipeline(vec![3, 1, 2])
//!         .map("sort", |mut v| {
//!             v.sort();
//!             v
//!         })
//!         .step_with_timeout("sum-check", Duration::from_secs(1), |v| async move {
//!             if v.iter().sum::<i32>() > 0 {
//!                 Ok(v)
//!             } else {
//!                 Err(PipelineError::new("EMPTY_SUM", "nothing to add"))
//!             }
//!         })
//!         .on_progress(|step, index, total| println!("[{}/{}] {}", index, total, step))
//!         .execute()
//!         .await;
//!
//!     assert_eq!(result, Ok(vec![1, 2, 3]));
//!
//!     let both = parallel(vec![
//!         operation(|| async { Ok(1) }),
//!         operation(|| async { Ok(2) }),
//!     ])
//!     .await;
//!     assert_eq!(both, Ok(vec![1, 2]));
//! }
//! ```

mod executor;
mod parallel;
mod pipeline;
mod retry;
mod unwind;

// Re-export core types
pub use stepline_core::*;

pub use parallel::{operation, parallel, parallel_settled, Operation, Operations, Settled};
pub use pipeline::{pipeline, pipeline_from, Pipeline};
pub use retry::retry_pipeline;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::parallel::{
        operation, parallel, parallel_settled, Operation, Operations, Settled,
    };
    pub use crate::pipeline::{pipeline, pipeline_from, Pipeline};
    pub use crate::retry::retry_pipeline;
    pub use stepline_core::{
        failure, success, Backoff, CancellationToken, ErrorCode, PipelineError, PipelineResult,
        RetryConfig, RetryPolicy, RetryPolicyError, Step, StepName,
    };
}
