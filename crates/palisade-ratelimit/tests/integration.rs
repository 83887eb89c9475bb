//! Integration tests for the palisade-ratelimit crate.
//!
//! These exercise the documented admission contract end to end, including
//! the concrete timing scenario from the design notes and persistence
//! across simulated restarts.

use std::time::Duration;

use palisade_ratelimit::{AppProfile, Period, RateLimiter, WaitOutcome};

#[test]
fn concrete_scenario_capacity_two_rate_two_per_second() {
    let dir = tempfile::tempdir().unwrap();
    let limiter = RateLimiter::open(dir.path().join("rl.json")).unwrap();
    limiter.configure_limit("x", 2.0, 2.0, Period::Second).unwrap();

    // Two immediate consumes pass, the third fails.
    assert!(limiter.check_and_consume("x", 1.0).unwrap());
    assert!(limiter.check_and_consume("x", 1.0).unwrap());
    assert!(!limiter.check_and_consume("x", 1.0).unwrap());

    // Half a second at 2 tokens/sec regenerates one token.
    std::thread::sleep(Duration::from_millis(550));
    assert!(limiter.check_and_consume("x", 1.0).unwrap());
}

#[test]
fn remaining_never_exceeds_capacity_after_long_idle() {
    let dir = tempfile::tempdir().unwrap();
    let limiter = RateLimiter::open(dir.path().join("rl.json")).unwrap();
    limiter
        .configure_limit("burst", 5.0, 1000.0, Period::Second)
        .unwrap();

    assert!(limiter.check_and_consume("burst", 5.0).unwrap());
    std::thread::sleep(Duration::from_millis(200));

    let remaining = limiter.get_remaining("burst").unwrap();
    assert!(remaining <= 5.0, "remaining {remaining} exceeded capacity");
}

#[test]
fn consumption_state_is_durable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rl.json");

    {
        let limiter = RateLimiter::open(&path).unwrap();
        limiter
            .configure_limit("ynab_api", 120.0, 120.0, Period::Hour)
            .unwrap();
        for _ in 0..120 {
            assert!(limiter.check_and_consume("ynab_api", 1.0).unwrap());
        }
        assert!(!limiter.check_and_consume("ynab_api", 1.0).unwrap());
    }

    // A fresh process sees the drained bucket, not a full one.
    let limiter = RateLimiter::open(&path).unwrap();
    assert!(!limiter.check_and_consume("ynab_api", 1.0).unwrap());
    assert!(limiter.get_remaining("ynab_api").unwrap() < 1.0);
}

#[test]
fn wait_with_timeout_bounds_the_block() {
    let dir = tempfile::tempdir().unwrap();
    let limiter = RateLimiter::open(dir.path().join("rl.json")).unwrap();
    limiter
        .configure_limit("slow", 1.0, 1.0, Period::Day)
        .unwrap();
    assert!(limiter.check_and_consume("slow", 1.0).unwrap());

    let outcome = limiter
        .wait_and_consume("slow", 1.0, Some(Duration::from_millis(250)))
        .unwrap();
    assert_eq!(outcome, WaitOutcome::TimedOut);

    // The refused wait consumed nothing.
    assert!(limiter.get_remaining("slow").unwrap() < 1.0);
}

#[test]
fn profile_round_trip_through_shared_state_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rl.json");

    {
        let limiter = RateLimiter::open(&path).unwrap();
        AppProfile::for_app("budget-sync").unwrap().apply(&limiter).unwrap();
    }

    let limiter = RateLimiter::open(&path).unwrap();
    let keys: Vec<String> = limiter.status().into_iter().map(|s| s.key).collect();
    assert_eq!(keys, vec!["email_send", "ynab_api"]);
}
