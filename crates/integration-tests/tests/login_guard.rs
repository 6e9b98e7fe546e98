//! Login attempt guard behavior over time, through the public API.

use aodai_core::ManualClock;
use aodai_integration_tests::test_clock;
use aodai_storefront::login_guard::{
    ATTEMPTS_KEY, AttemptStore, GuardState, LOCKOUT_KEY, LockoutPolicy, LoginAttemptGuard,
    MemoryStore,
};
use chrono::TimeDelta;

fn guard(
    store: &mut MemoryStore,
    clock: ManualClock,
) -> LoginAttemptGuard<&mut MemoryStore, ManualClock> {
    LoginAttemptGuard::new(store, clock, LockoutPolicy::default())
}

#[test]
fn test_four_failures_leave_one_attempt() {
    let mut store = MemoryStore::new();
    let mut guard = guard(&mut store, test_clock());

    for _ in 0..4 {
        guard.record_failure();
    }

    let status = guard.check_status();
    assert!(!status.is_locked);
    assert_eq!(status.attempts_used, 4);
    assert_eq!(status.attempts_remaining, Some(1));
}

#[test]
fn test_fifth_failure_locks_for_fifteen_minutes() {
    let mut store = MemoryStore::new();
    let mut guard = guard(&mut store, test_clock());

    for _ in 0..5 {
        guard.record_failure();
    }

    let status = guard.check_status();
    assert!(status.is_locked);
    assert_eq!(status.remaining_lockout_ms, Some(900_000));
    assert_eq!(status.attempts_remaining, None);
}

#[test]
fn test_lockout_survives_a_new_guard_over_the_same_store() {
    let clock = test_clock();
    let mut store = MemoryStore::new();
    {
        let mut guard = guard(&mut store, clock.clone());
        for _ in 0..5 {
            guard.record_failure();
        }
    }
    assert!(store.get(LOCKOUT_KEY).expect("read").is_some());
    assert!(store.get(ATTEMPTS_KEY).expect("read").is_some());

    // A reload of the login page builds a fresh guard
    clock.advance(TimeDelta::minutes(10));
    let mut guard = guard(&mut store, clock.clone());
    let status = guard.check_status();
    assert!(status.is_locked);
    assert_eq!(status.remaining_lockout_ms, Some(300_000));

    clock.advance(TimeDelta::minutes(5));
    assert_eq!(guard.state(), GuardState::Clean);
    assert!(!guard.check_status().is_locked);
}

#[test]
fn test_failures_spread_past_the_window_never_lock() {
    let clock = test_clock();
    let mut store = MemoryStore::new();
    let mut guard = guard(&mut store, clock.clone());

    for _ in 0..20 {
        guard.record_failure();
        guard.record_failure();
        clock.advance(TimeDelta::minutes(5));
    }

    assert!(!guard.check_status().is_locked);
}
