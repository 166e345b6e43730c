use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stepline::prelude::*;
use tokio_test::{assert_err, assert_ok};

#[derive(Debug)]
struct Scale {
    factor: i64,
}

#[async_trait]
impl Step<i64> for Scale {
    async fn run(&self, value: i64) -> PipelineResult<i64> {
        Ok(value * self.factor)
    }
}

const FAST_RETRY: &str = r#"{"max_attempts": 2, "backoff": {"type": "fixed", "delay_ms": 1}}"#;

type Events = Arc<Mutex<Vec<(String, usize, usize)>>>;

fn recording_progress(events: Events) -> impl Fn(&str, usize, usize) + Send + Sync + 'static {
    move |step, index, total| {
        if let Ok(mut events) = events.lock() {
            events.push((step.to_string(), index, total));
        }
    }
}

#[tokio::test]
async fn test_uppercase_then_suffix() {
    let result = pipeline("hello".to_string())
        .map("uppercase", |s| s.to_uppercase())
        .map("add-suffix", |s| s + "!")
        .execute()
        .await;

    assert_eq!(assert_ok!(result), "HELLO!");
}

#[tokio::test]
async fn test_conditional_steps_pick_even_branch() {
    let result = pipeline(10)
        .step_if("double-if-even", |v| v % 2 == 0, |v| async move {
            Ok(v * 2)
        })
        .step_if("triple-if-odd", |v| v % 2 != 0, |v| async move {
            Ok(v * 3)
        })
        .execute()
        .await;

    assert_eq!(result, Ok(20));
}

#[tokio::test]
async fn test_recovery_replaces_failure() {
    let result = pipeline(10)
        .step("fail", |_| async {
            Err(PipelineError::new("RECOVERABLE_ERROR", "transient"))
        })
        .on_error(|_, _| async { Ok(42) })
        .execute()
        .await;

    assert_eq!(result, Ok(42));
}

#[tokio::test]
async fn test_all_success_composes_left_to_right() {
    let result = pipeline(2i64)
        .map("add-three", |v| v + 3)
        .add_step("times-four", Scale { factor: 4 })
        .step("minus-one", |v| async move { Ok(v - 1) })
        .execute()
        .await;

    assert_eq!(result, Ok((2 + 3) * 4 - 1));
}

#[tokio::test]
async fn test_failure_short_circuits_later_steps() {
    let spy = Arc::new(AtomicBool::new(false));
    let spy_clone = spy.clone();

    let result = pipeline(1)
        .step("boom", |_| async {
            Err(PipelineError::new("VALIDATION_FAILED", "bad input"))
        })
        .map("spy", move |v| {
            spy_clone.store(true, Ordering::SeqCst);
            v
        })
        .execute()
        .await;

    let error = assert_err!(result);
    assert_eq!(
        error.code,
        ErrorCode::Custom("VALIDATION_FAILED".to_string())
    );
    assert_eq!(error.message, "bad input");
    assert!(!spy.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_progress_fires_once_per_step_then_complete() {
    let events = Arc::new(Mutex::new(Vec::new()));

    let result = pipeline(0)
        .map("first", |v| v + 1)
        .step_if("skipped", |_| false, |v| async move { Ok(v) })
        .map("third", |v| v + 1)
        .on_progress(recording_progress(events.clone()))
        .execute()
        .await;

    assert_eq!(result, Ok(2));
    let events = events.lock().unwrap();
    assert_eq!(
        *events,
        vec![
            ("first".to_string(), 0, 3),
            ("skipped".to_string(), 1, 3),
            ("third".to_string(), 2, 3),
            ("Complete".to_string(), 3, 3),
        ]
    );
}

#[tokio::test]
async fn test_progress_has_no_complete_event_after_failure() {
    let events = Arc::new(Mutex::new(Vec::new()));

    let result = pipeline(0)
        .map("ok", |v| v)
        .step("bad", |_| async { Err(PipelineError::new("NOPE", "no")) })
        .map("never", |v| v)
        .on_progress(recording_progress(events.clone()))
        .execute()
        .await;

    assert_err!(result);
    let names: Vec<String> = events
        .lock()
        .unwrap()
        .iter()
        .map(|e| e.0.clone())
        .collect();
    assert_eq!(names, ["ok", "bad"]);
}

#[tokio::test]
async fn test_progress_completes_after_recovered_failure() {
    let events = Arc::new(Mutex::new(Vec::new()));

    let result = pipeline(0)
        .step("flaky", |_| async {
            Err(PipelineError::new("FLAKY", "lost"))
        })
        .map("next", |v| v + 1)
        .on_error(|_, _| async { Ok(10) })
        .on_progress(recording_progress(events.clone()))
        .execute()
        .await;

    assert_eq!(result, Ok(11));
    assert_eq!(
        *events.lock().unwrap(),
        vec![
            ("flaky".to_string(), 0, 2),
            ("next".to_string(), 1, 2),
            ("Complete".to_string(), 2, 2),
        ]
    );
}

#[tokio::test]
async fn test_timeout_fires_when_body_is_slower() {
    let result = pipeline(1)
        .step_with_timeout("slow", Duration::from_millis(20), |v| async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(v)
        })
        .execute()
        .await;

    let error = assert_err!(result);
    assert_eq!(error.code, ErrorCode::Timeout);
    assert!(error.message.contains("slow"));
    assert!(error.message.contains("20"));
}

#[tokio::test]
async fn test_timeout_passes_when_body_is_faster() {
    let result = pipeline(1)
        .step_with_timeout("quick", Duration::from_millis(500), |v| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(v + 1)
        })
        .execute()
        .await;

    assert_eq!(result, Ok(2));
}

#[tokio::test]
async fn test_pre_cancelled_token_runs_nothing() {
    let token = CancellationToken::new();
    token.cancel("shutting down");
    let ran = Arc::new(AtomicBool::new(false));
    let ran_clone = ran.clone();

    let result = pipeline(1)
        .step("body", move |v| {
            let ran = ran_clone.clone();
            async move {
                ran.store(true, Ordering::SeqCst);
                Ok(v)
            }
        })
        .with_cancellation(token)
        .execute()
        .await;

    let error = assert_err!(result);
    assert_eq!(error.code, ErrorCode::Cancelled);
    assert!(!ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_cancellation_between_steps_lets_running_step_finish() {
    let token = CancellationToken::new();
    let trigger = token.clone();
    let second_ran = Arc::new(AtomicBool::new(false));
    let second_clone = second_ran.clone();

    let result = pipeline(1)
        .step("cancels", move |v| {
            let trigger = trigger.clone();
            async move {
                trigger.cancel("stop after this one");
                Ok(v + 1)
            }
        })
        .map("second", move |v| {
            second_clone.store(true, Ordering::SeqCst);
            v
        })
        .with_cancellation(token)
        .execute()
        .await;

    let error = assert_err!(result);
    assert_eq!(error.code, ErrorCode::Cancelled);
    assert!(error.message.contains("second"));
    assert!(!second_ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_failed_initial_outcome_short_circuits() {
    let events = Arc::new(Mutex::new(Vec::new()));

    let result = pipeline_from(failure::<i32>(PipelineError::new("UPSTREAM", "no data")))
        .map("never", |v| v + 1)
        .on_progress(recording_progress(events.clone()))
        .execute()
        .await;

    let error = assert_err!(result);
    assert_eq!(error.code, ErrorCode::Custom("UPSTREAM".into()));
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
#[allow(clippy::panic)]
async fn test_panicking_map_becomes_step_execution_error() {
    let result = pipeline(1)
        .map("explode", |_: i32| -> i32 { panic!("kaboom") })
        .execute()
        .await;

    let error = assert_err!(result);
    assert_eq!(error.code, ErrorCode::StepExecution);
    assert!(error.message.contains("explode"));
    assert!(error.message.contains("kaboom"));
}

#[tokio::test]
async fn test_handler_sees_failing_step_name() {
    let seen = Arc::new(Mutex::new(None));
    let seen_clone = seen.clone();

    let result = pipeline(5)
        .map("fine", |v| v)
        .step("broken", |_| async { Err(PipelineError::new("E", "x")) })
        .map("after", |v| v * 10)
        .on_error(move |error, step| async move {
            *seen_clone.lock().unwrap() = Some((error.code, step));
            Ok(1)
        })
        .execute()
        .await;

    assert_eq!(result, Ok(10));
    let (code, step) = seen.lock().unwrap().take().unwrap();
    assert_eq!(code, ErrorCode::Custom("E".into()));
    assert_eq!(step, "broken");
}

#[tokio::test]
async fn test_parallel_keeps_input_order() {
    let result = parallel(vec![
        operation(|| async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok("a")
        }),
        operation(|| async { Ok("b") }),
        operation(|| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok("c")
        }),
    ])
    .await;

    assert_eq!(result, Ok(vec!["a", "b", "c"]));
}

#[tokio::test]
async fn test_parallel_returns_the_failing_error() {
    let b_error = PipelineError::new("B_FAILED", "b is down");
    let expected = b_error.clone();

    let result = parallel(vec![
        operation(|| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(1)
        }),
        operation(move || async move { Err(b_error) }),
        operation(|| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(3)
        }),
    ])
    .await;

    assert_eq!(result, Err(expected));
}

#[tokio::test]
async fn test_parallel_map_shape_round_trips() {
    let left = operation(|| pipeline(2).map("double", |v| v * 2).execute());
    let right = operation(|| pipeline(3).map("square", |v| v * v).execute());
    let operations = BTreeMap::from([("left", left), ("right", right)]);

    let values = assert_ok!(parallel(operations).await);
    assert_eq!(values, BTreeMap::from([("left", 4), ("right", 9)]));
}

#[tokio::test]
async fn test_parallel_settled_splits_outcomes() {
    let settled = parallel_settled(vec![
        operation(|| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(1)
        }),
        operation(|| async {
            Err(PipelineError::new("FIRST", "first failure"))
        }),
        operation(|| async { Ok(3) }),
        operation(|| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err(PipelineError::new("SECOND", "second failure"))
        }),
    ])
    .await;

    let settled = assert_ok!(settled);
    assert_eq!(settled.successes, vec![1, 3]);
    let codes: Vec<String> = settled
        .failures
        .iter()
        .map(|e| e.code.to_string())
        .collect();
    assert_eq!(codes, ["FIRST", "SECOND"]);
}

#[tokio::test]
async fn test_parallel_settled_with_keys() {
    let mut operations = HashMap::new();
    operations.insert("cache", operation(|| async { Ok(7) }));
    operations.insert(
        "db",
        operation(|| async {
            Err(PipelineError::new("DB_DOWN", "connection refused"))
        }),
    );

    let settled = assert_ok!(parallel_settled(operations).await);
    assert_eq!(settled.successes, HashMap::from([("cache", 7)]));
    assert_eq!(settled.failures.len(), 1);
    assert_eq!(
        settled.failures["db"].code,
        ErrorCode::Custom("DB_DOWN".into())
    );
}

#[tokio::test]
async fn test_retry_until_third_attempt() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let notified = Arc::new(Mutex::new(Vec::new()));
    let notified_clone = notified.clone();

    let policy = RetryPolicy::new(3)
        .unwrap()
        .on_retry(move |attempt, _| {
            notified_clone.lock().unwrap().push(attempt);
        });

    let result = retry_pipeline(
        move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            pipeline(attempt).step("flaky", |n| async move {
                if n < 3 {
                    Err(PipelineError::new("FLAKY", "try again"))
                } else {
                    Ok(n * 100)
                }
            })
        },
        policy,
    )
    .await;

    assert_eq!(result, Ok(300));
    assert_eq!(*notified.lock().unwrap(), vec![1, 2]);
}

#[tokio::test]
async fn test_retry_exhausted_after_two_attempts() {
    let always_down = || {
        pipeline(0).step("always", |_| async {
            Err(PipelineError::new("DOWN", "still down"))
        })
    };
    let result = retry_pipeline(always_down, RetryPolicy::new(2).unwrap()).await;

    let error = assert_err!(result);
    assert_eq!(error.code, ErrorCode::RetryExhausted);
    let last = error.cause.map(|c| c.code);
    assert_eq!(last, Some(ErrorCode::Custom("DOWN".into())));
}

#[tokio::test]
async fn test_retry_policy_from_config() {
    let config: RetryConfig = serde_json::from_str(FAST_RETRY).unwrap();
    let policy = RetryPolicy::from_config(config).unwrap();
    assert_eq!(policy.max_attempts(), 2);

    let result = retry_pipeline(|| pipeline(9), policy).await;
    assert_eq!(result, Ok(9));
}
