//! Integration tests for core-async.
//!
//! These exercise the primitives the playback engine leans on: intervals,
//! timeouts, cancellation, and supersession across tasks.

use core_async::{sync, task, time};
use std::sync::Arc;

#[core_async::test]
async fn test_task_spawn() {
    let handle = task::spawn(async { 42 });
    let result = handle.await.unwrap();
    assert_eq!(result, 42);
}

#[core_async::test]
async fn test_abort_cancels_task() {
    let handle = task::spawn(async {
        time::sleep(time::Duration::from_secs(60)).await;
        1
    });
    handle.abort();
    let err = handle.await.unwrap_err();
    assert!(err.is_cancelled());
}

#[core_async::test]
async fn test_timeout_success() {
    let result = time::timeout(time::Duration::from_millis(100), async {
        time::sleep(time::Duration::from_millis(10)).await;
        42
    })
    .await;

    assert_eq!(result.unwrap(), 42);
}

#[core_async::test]
async fn test_timeout_failure() {
    let result = time::timeout(time::Duration::from_millis(10), async {
        time::sleep(time::Duration::from_millis(100)).await;
        42
    })
    .await;

    assert!(result.is_err());
}

#[core_async::test]
async fn test_interval() {
    let mut interval = time::interval(time::Duration::from_millis(10));
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    let start = time::Instant::now();

    // The first tick completes immediately
    interval.tick().await;

    for _ in 0..3 {
        interval.tick().await;
    }

    assert!(start.elapsed() >= time::Duration::from_millis(30));
}

#[core_async::test]
async fn test_cancellation_token_wakes_waiters() {
    let token = sync::CancellationToken::new();
    let child = token.child_token();

    let handle = task::spawn(async move {
        child.cancelled().await;
        "cancelled"
    });

    time::sleep(time::Duration::from_millis(10)).await;
    token.cancel();

    assert_eq!(handle.await.unwrap(), "cancelled");
}

#[core_async::test]
async fn test_watch_channel_latest_value() {
    let (tx, mut rx) = sync::watch::channel(0u64);

    task::spawn(async move {
        for i in 1..=3 {
            tx.send(i).ok();
        }
    })
    .await
    .unwrap();

    rx.changed().await.ok();
    assert_eq!(*rx.borrow(), 3);
}

#[core_async::test]
async fn test_operation_gate_suppresses_stale_completion() {
    let gate = Arc::new(sync::OperationGate::new());
    let applied = Arc::new(sync::Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for (label, delay) in [("slow", 40u64), ("fast", 5u64)] {
        let ticket = gate.begin();
        let gate = gate.clone();
        let applied = applied.clone();
        handles.push(task::spawn(async move {
            time::sleep(time::Duration::from_millis(delay)).await;
            if gate.is_current(&ticket) {
                applied.lock().await.push(label);
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(*applied.lock().await, vec!["fast"]);
}

#[core_async::test]
async fn test_yield_now() {
    task::yield_now().await;
}
