//! Parallel Fetch.
//!
//! This example demonstrates:
//! 1. Fail-fast fan-out over a list with `parallel`
//! 2. Keyed fan-out with `parallel_settled`
//! 3. Running whole pipelines as parallel operations

use std::collections::BTreeMap;
use std::time::Duration;
use stepline::prelude::*;

async fn fetch(service: &'static str, latency_ms: u64, healthy: bool) -> PipelineResult<String> {
    tokio::time::sleep(Duration::from_millis(latency_ms)).await;
    if healthy {
        Ok(format!("{} ok in {}ms", service, latency_ms))
    } else {
        Err(
            PipelineError::new("SERVICE_DOWN", format!("{} did not answer", service))
                .with_context("service", service),
        )
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== Parallel Fetch ===\n");

    let statuses = parallel(vec![
        operation(|| fetch("users", 40, true)),
        operation(|| fetch("orders", 10, true)),
        operation(|| fetch("inventory", 25, true)),
    ])
    .await?;
    for status in &statuses {
        println!("  {}", status);
    }

    println!("\n--- One service down, fail fast ---");
    match parallel(vec![
        operation(|| fetch("users", 40, true)),
        operation(|| fetch("billing", 5, false)),
    ])
    .await
    {
        Ok(_) => println!("  unexpected success"),
        Err(error) => println!("  aborted: {}", error),
    }

    println!("\n--- Settled report by key ---");
    let mut checks = BTreeMap::new();
    checks.insert("cache", operation(|| fetch("cache", 5, true)));
    checks.insert("search", operation(|| fetch("search", 15, false)));
    checks.insert(
        "report",
        operation(|| {
            pipeline("raw rows".to_string())
                .map("normalize", |rows| rows.to_uppercase())
                .step("summarize", |rows| async move {
                    Ok(format!("summary of {}", rows))
                })
                .execute()
        }),
    );

    let report = parallel_settled(checks).await?;
    for (name, value) in &report.successes {
        println!("  ok    {:<8} {}", name, value);
    }
    for (name, error) in &report.failures {
        println!("  fail  {:<8} {}", name, error);
    }

    Ok(())
}
