//! Retrying a Flaky Pipeline.
//!
//! This example demonstrates:
//! 1. Building a fresh pipeline per attempt with `retry_pipeline`
//! 2. Observing retries through `on_retry`
//! 3. Loading the retry policy from JSON configuration
//! 4. Cancelling a pipeline between steps

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use stepline::prelude::*;

const POLICY: &str = r#"{ "max_attempts": 4, "backoff": { "type": "fixed", "delay_ms": 100 } }"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== Flaky Retry ===\n");

    let config: RetryConfig = serde_json::from_str(POLICY)?;
    let policy = RetryPolicy::from_config(config)?.on_retry(|attempt, error| {
        println!("  attempt {} failed: {}", attempt, error);
    });

    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let uploaded = retry_pipeline(
        move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            pipeline(format!("report-{}", attempt))
                .map("compress", |name| format!("{}.gz", name))
                .step("upload", move |file| async move {
                    if attempt < 3 {
                        Err(PipelineError::new("UPLOAD_FAILED", "connection reset"))
                    } else {
                        Ok(format!("s3://bucket/{}", file))
                    }
                })
        },
        policy,
    )
    .await?;
    println!(
        "\nUploaded {} after {} attempt(s)\n",
        uploaded,
        calls.load(Ordering::SeqCst)
    );

    println!("--- Cancelled between steps ---");
    let token = CancellationToken::new();
    let trigger = token.clone();
    let result = pipeline(0)
        .step("start", move |v| {
            let trigger = trigger.clone();
            async move {
                trigger.cancel("operator requested stop");
                Ok(v + 1)
            }
        })
        .map("never-runs", |v| v * 100)
        .with_cancellation(token)
        .execute()
        .await;

    if let Err(error) = result {
        println!("  {} (reason: {:?})", error, error.context_value("reason"));
    }

    Ok(())
}
