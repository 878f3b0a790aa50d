// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn scheduler() -> (RefreshScheduler, mpsc::Receiver<()>) {
    RefreshScheduler::new(Duration::from_secs(300), Duration::from_secs(10))
}

#[yare::parameterized(
    well_before_margin = { 3600, 0, 3300 },
    exactly_at_margin = { 300, 0, 10 },
    inside_margin = { 60, 0, 10 },
    already_expired = { 0, 5, 10 },
    expired_long_ago = { 100, 4000, 10 },
)]
fn renewal_delay_cases(expires_in: u64, now: u64, expected_secs: u64) {
    let (scheduler, _rx) = scheduler();
    let delay = scheduler.renewal_delay(now + expires_in, now);
    assert_eq!(delay, Duration::from_secs(expected_secs));
}

#[test]
fn expired_credential_never_schedules_at_zero() {
    let (scheduler, _rx) = scheduler();
    // 5 seconds past expiry with clock skew on top.
    let delay = scheduler.renewal_delay(1_000, 1_005);
    assert!(delay >= Duration::from_secs(10));
    assert!(!delay.is_zero());
}

#[tokio::test(start_paused = true)]
async fn arm_fires_after_delay() {
    let (scheduler, mut rx) = scheduler();
    // Expires in 3600s -> tick at 3300s.
    scheduler.arm(3600, 0);
    // Let the timer task register its sleep before moving the clock.
    tokio::task::yield_now().await;

    tokio::time::advance(Duration::from_secs(3299)).await;
    assert!(rx.try_recv().is_err(), "tick arrived early");

    tokio::time::advance(Duration::from_secs(2)).await;
    tokio::task::yield_now().await;
    assert!(rx.try_recv().is_ok(), "tick should have fired");
}

#[tokio::test(start_paused = true)]
async fn rearm_cancels_previous_timer() {
    let (scheduler, mut rx) = scheduler();
    scheduler.arm(3600, 0);
    // Rearm to a later expiry before the first timer fires.
    scheduler.arm(7200, 0);
    tokio::task::yield_now().await;

    tokio::time::advance(Duration::from_secs(3400)).await;
    tokio::task::yield_now().await;
    assert!(rx.try_recv().is_err(), "cancelled timer still fired");

    tokio::time::advance(Duration::from_secs(3600)).await;
    tokio::task::yield_now().await;
    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_err(), "only one tick per arm");
}

#[tokio::test(start_paused = true)]
async fn expired_credential_fires_at_floor() {
    let (scheduler, mut rx) = scheduler();
    scheduler.arm(0, 1_000);
    tokio::task::yield_now().await;

    tokio::time::advance(Duration::from_secs(9)).await;
    assert!(rx.try_recv().is_err(), "fired before the floor");

    tokio::time::advance(Duration::from_secs(2)).await;
    tokio::task::yield_now().await;
    assert!(rx.try_recv().is_ok());
}

#[tokio::test(start_paused = true)]
async fn disarm_cancels_pending_timer() {
    let (scheduler, mut rx) = scheduler();
    scheduler.arm(3600, 0);
    scheduler.disarm();
    tokio::task::yield_now().await;

    tokio::time::advance(Duration::from_secs(4000)).await;
    tokio::task::yield_now().await;
    assert!(rx.try_recv().is_err(), "disarmed timer still fired");
}

#[tokio::test]
async fn disarm_without_timer_is_idempotent() {
    let (scheduler, _rx) = scheduler();
    scheduler.disarm();
    scheduler.disarm();
}
