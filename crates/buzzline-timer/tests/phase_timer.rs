//! Integration tests for the phase timer.
//!
//! Every async test runs with `start_paused = true`: Tokio's clock only
//! moves when the runtime is idle, so deadlines resolve instantly and in
//! a deterministic order.

use std::time::Duration;

use buzzline_timer::PhaseTimer;
use tokio::time::Instant;

// =========================================================================
// Firing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_expiry_carries_generation_and_disarms() {
    let start = Instant::now();
    let mut t = PhaseTimer::new();
    t.arm(Duration::from_secs(3), 7);

    let expiry = t.wait_for_expiry().await;

    assert_eq!(expiry.generation, 7);
    assert_eq!(expiry.deadline, start + Duration::from_secs(3));
    assert!(Instant::now() >= start + Duration::from_secs(3));
    assert!(!t.is_armed());
    assert_eq!(t.fired_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rearm_replaces_previous_deadline() {
    let start = Instant::now();
    let mut t = PhaseTimer::new();
    t.arm(Duration::from_secs(30), 1);
    t.arm(Duration::from_secs(1), 2);

    let expiry = t.wait_for_expiry().await;

    assert_eq!(expiry.generation, 2);
    assert_eq!(Instant::now(), start + Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_past_deadline_fires_immediately() {
    let mut t = PhaseTimer::new();
    t.arm_at(Instant::now(), 3);
    tokio::time::advance(Duration::from_millis(250)).await;

    let expiry = t.wait_for_expiry().await;

    assert_eq!(expiry.generation, 3);
    assert!(expiry.late_by >= Duration::from_millis(250));
}

#[tokio::test(start_paused = true)]
async fn test_remaining_counts_down() {
    let mut t = PhaseTimer::new();
    t.arm(Duration::from_secs(10), 1);
    tokio::time::advance(Duration::from_secs(4)).await;
    assert_eq!(t.remaining(), Some(Duration::from_secs(6)));
}

// =========================================================================
// Disarmed behaviour inside select!
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_disarmed_timer_never_wins_select() {
    let mut t = PhaseTimer::new();

    let winner = tokio::select! {
        _ = t.wait_for_expiry() => "timer",
        _ = tokio::time::sleep(Duration::from_secs(3600)) => "sleep",
    };

    assert_eq!(winner, "sleep");
}

#[tokio::test(start_paused = true)]
async fn test_losing_select_keeps_deadline_armed() {
    let mut t = PhaseTimer::new();
    t.arm(Duration::from_secs(5), 9);

    tokio::select! {
        _ = t.wait_for_expiry() => panic!("timer should not fire first"),
        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
    }

    assert!(t.is_armed());
    let expiry = t.wait_for_expiry().await;
    assert_eq!(expiry.generation, 9);
}

#[tokio::test(start_paused = true)]
async fn test_disarm_before_deadline_cancels() {
    let mut t = PhaseTimer::new();
    t.arm(Duration::from_secs(1), 1);
    t.disarm();

    let fired = tokio::time::timeout(Duration::from_secs(5), t.wait_for_expiry()).await;
    assert!(fired.is_err(), "disarmed timer must not fire");
    assert_eq!(t.fired_count(), 0);
}
