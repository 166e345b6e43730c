//! Order Processing Pipeline.
//!
//! This example demonstrates:
//! 1. Synchronous and async steps over a typed value
//! 2. Conditional steps with `step_if`
//! 3. A timeout-bound step and progress reporting
//! 4. Recovering from a failed step with `on_error`

use async_trait::async_trait;
use std::time::Duration;
use stepline::prelude::*;

#[derive(Debug, Clone)]
struct Order {
    id: u32,
    items: Vec<(String, u32)>,
    total_cents: u32,
    discount_applied: bool,
    payment_ref: Option<String>,
}

// Validation as a reusable step type
#[derive(Debug)]
struct ValidateOrder;

#[async_trait]
impl Step<Order> for ValidateOrder {
    async fn run(&self, order: Order) -> PipelineResult<Order> {
        if order.items.is_empty() {
            return Err(PipelineError::new("EMPTY_ORDER", "order has no items")
                .with_context("order_id", order.id));
        }
        Ok(order)
    }
}

async fn charge(mut order: Order) -> PipelineResult<Order> {
    // Simulate a payment gateway round trip
    tokio::time::sleep(Duration::from_millis(50)).await;
    if order.total_cents > 100_000 {
        return Err(PipelineError::new("PAYMENT_DECLINED", "amount over limit"));
    }
    order.payment_ref = Some(format!("pay-{}", order.id));
    Ok(order)
}

fn build(order: Order) -> Pipeline<Order> {
    pipeline(order)
        .add_step("validate", ValidateOrder)
        .map("price", |mut order| {
            order.total_cents = order.items.iter().map(|(_, cents)| cents).sum();
            order
        })
        .step_if(
            "bulk-discount",
            |order| order.items.len() >= 3,
            |mut order| async move {
                order.total_cents = order.total_cents * 9 / 10;
                order.discount_applied = true;
                Ok(order)
            },
        )
        .step_with_timeout("charge", Duration::from_secs(2), charge)
        .on_progress(|step, index, total| {
            if index < total {
                println!("  [{}/{}] {}", index + 1, total, step);
            } else {
                println!("  {}", step);
            }
        })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== Order Processing Pipeline ===\n");

    let order = Order {
        id: 1001,
        items: vec![
            ("keyboard".to_string(), 4_500),
            ("mouse".to_string(), 2_000),
            ("cable".to_string(), 500),
        ],
        total_cents: 0,
        discount_applied: false,
        payment_ref: None,
    };

    let processed = build(order).execute().await?;
    println!(
        "\nOrder {} charged {} cents (discount: {}, ref: {:?})\n",
        processed.id, processed.total_cents, processed.discount_applied, processed.payment_ref
    );

    println!("--- Oversized order with a fallback ---");
    let oversized = Order {
        id: 1002,
        items: vec![("server".to_string(), 250_000)],
        total_cents: 0,
        discount_applied: false,
        payment_ref: None,
    };
    let fallback = oversized.clone();

    let result = build(oversized)
        .on_error(move |error, step| async move {
            println!(
                "  step '{}' failed: {}; queueing for manual review",
                step, error
            );
            Ok(Order {
                payment_ref: Some("manual-review".to_string()),
                ..fallback
            })
        })
        .execute()
        .await?;
    println!("\nOrder {} routed to {:?}", result.id, result.payment_ref);

    Ok(())
}
