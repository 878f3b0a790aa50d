// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::*;

#[tokio::test]
async fn concurrent_callers_share_one_run() {
    let flight = Arc::new(SingleFlight::<u32>::new());
    let runs = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let flight = Arc::clone(&flight);
        let runs = Arc::clone(&runs);
        handles.push(tokio::spawn(async move {
            flight
                .run(move || async move {
                    runs.fetch_add(1, Ordering::Relaxed);
                    // Hold the cycle open so every caller joins it.
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    42
                })
                .await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.expect("join"), 42);
    }
    assert_eq!(runs.load(Ordering::Relaxed), 1, "only the first caller runs");
}

#[tokio::test]
async fn next_call_after_completion_starts_fresh_cycle() {
    let flight = SingleFlight::<u32>::new();
    let runs = AtomicU32::new(0);

    let first = flight
        .run(|| {
            runs.fetch_add(1, Ordering::Relaxed);
            async { 1 }
        })
        .await;
    let second = flight
        .run(|| {
            runs.fetch_add(1, Ordering::Relaxed);
            async { 2 }
        })
        .await;

    assert_eq!((first, second), (1, 2));
    assert_eq!(runs.load(Ordering::Relaxed), 2);
    assert!(!flight.in_flight().await, "slot cleared after completion");
}

#[tokio::test]
async fn error_results_are_shared_too() {
    let flight = Arc::new(SingleFlight::<Result<u32, String>>::new());
    let runs = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..3 {
        let flight = Arc::clone(&flight);
        let runs = Arc::clone(&runs);
        handles.push(tokio::spawn(async move {
            flight
                .run(move || async move {
                    runs.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Err::<u32, _>("boom".to_owned())
                })
                .await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.expect("join"), Err("boom".to_owned()));
    }
    assert_eq!(runs.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn late_caller_after_failure_retries() {
    let flight = SingleFlight::<Result<u32, String>>::new();

    let first: Result<u32, String> = flight.run(|| async { Err("down".to_owned()) }).await;
    assert!(first.is_err());

    // The failed cycle is over; a new caller gets a new attempt.
    let second = flight.run(|| async { Ok(7) }).await;
    assert_eq!(second, Ok(7));
}
