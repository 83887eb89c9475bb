//! Token bucket state and the pure refill/consume math.
//!
//! A bucket holds a fractional token level that replenishes continuously at
//! `refill_rate` tokens per second, capped at `capacity`. Refill is lazy:
//! it happens on access, parameterized by an explicit `now` so the math is
//! deterministic under test. Elapsed time is clamped at zero, so a clock
//! that steps backwards never drains a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Configuration period for a limit. Refill rates given per-period are
/// normalized to tokens/second at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Second,
    Minute,
    Hour,
    Day,
}

impl Period {
    /// Number of seconds in one period.
    pub fn seconds(&self) -> f64 {
        match self {
            Self::Second => 1.0,
            Self::Minute => 60.0,
            Self::Hour => 3_600.0,
            Self::Day => 86_400.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Second => "second",
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "second" | "sec" | "s" => Ok(Self::Second),
            "minute" | "min" | "m" => Ok(Self::Minute),
            "hour" | "h" => Ok(Self::Hour),
            "day" | "d" => Ok(Self::Day),
            other => Err(format!("unknown period '{other}' (expected second|minute|hour|day)")),
        }
    }
}

/// One named resource's admission state.
///
/// Invariant: `0 ≤ tokens ≤ capacity`, and `tokens` is only ever mutated
/// through a refill-then-consume sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBucket {
    /// Maximum token level.
    pub capacity: f64,
    /// Tokens added per second.
    pub refill_rate: f64,
    /// Current token level.
    pub tokens: f64,
    /// When `tokens` was last brought up to date.
    pub last_refill: DateTime<Utc>,
}

impl TokenBucket {
    /// Create a bucket at full capacity with a per-second refill rate.
    pub fn new(capacity: f64, refill_rate: f64, now: DateTime<Utc>) -> Self {
        Self {
            capacity,
            refill_rate,
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Bring the token level up to date for `now`.
    ///
    /// Adds `elapsed_seconds × refill_rate`, capped at capacity. Negative
    /// elapsed time (clock stepped backwards) adds nothing.
    pub fn refill(&mut self, now: DateTime<Utc>) {
        let elapsed_ms = (now - self.last_refill).num_milliseconds().max(0);
        let elapsed_secs = elapsed_ms as f64 / 1000.0;
        self.tokens = (self.tokens + elapsed_secs * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Refill for `now`, then consume `n` tokens if the level allows.
    ///
    /// Returns `true` on consumption. On `false` the level is refreshed but
    /// otherwise untouched.
    pub fn try_consume(&mut self, n: f64, now: DateTime<Utc>) -> bool {
        self.refill(now);
        if n <= self.tokens {
            self.tokens -= n;
            true
        } else {
            false
        }
    }

    /// The token level as of `now`, without consuming.
    pub fn remaining(&self, now: DateTime<Utc>) -> f64 {
        let elapsed_ms = (now - self.last_refill).num_milliseconds().max(0);
        let elapsed_secs = elapsed_ms as f64 / 1000.0;
        (self.tokens + elapsed_secs * self.refill_rate).min(self.capacity)
    }

    /// Fraction of capacity currently consumed, as a percentage.
    pub fn utilization_pct(&self, now: DateTime<Utc>) -> f64 {
        if self.capacity <= 0.0 {
            return 0.0;
        }
        (1.0 - self.remaining(now) / self.capacity) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        "2026-01-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn starts_full() {
        let b = TokenBucket::new(10.0, 1.0, t0());
        assert_eq!(b.tokens, 10.0);
        assert_eq!(b.remaining(t0()), 10.0);
    }

    #[test]
    fn consume_drains_exactly() {
        let mut b = TokenBucket::new(3.0, 1.0, t0());
        assert!(b.try_consume(1.0, t0()));
        assert!(b.try_consume(1.0, t0()));
        assert!(b.try_consume(1.0, t0()));
        assert!(!b.try_consume(1.0, t0()));
        assert_eq!(b.tokens, 0.0);
    }

    #[test]
    fn refill_is_proportional_to_elapsed_time() {
        let mut b = TokenBucket::new(10.0, 2.0, t0());
        b.tokens = 0.0;

        b.refill(t0() + Duration::milliseconds(500));
        assert!((b.tokens - 1.0).abs() < 1e-9, "0.5s at 2/s should add 1 token");

        b.refill(t0() + Duration::seconds(3));
        assert!((b.tokens - 6.0).abs() < 1e-9);
    }

    #[test]
    fn refill_caps_at_capacity() {
        let mut b = TokenBucket::new(5.0, 100.0, t0());
        b.tokens = 0.0;

        // Idle for an hour: far more than capacity would have accrued.
        b.refill(t0() + Duration::hours(1));
        assert_eq!(b.tokens, 5.0);
        assert!(b.remaining(t0() + Duration::hours(2)) <= 5.0);
    }

    #[test]
    fn backwards_clock_adds_nothing() {
        let mut b = TokenBucket::new(10.0, 1.0, t0());
        b.tokens = 4.0;

        b.refill(t0() - Duration::seconds(30));
        assert_eq!(b.tokens, 4.0);
    }

    #[test]
    fn failed_consume_leaves_level_refreshed_but_unconsumed() {
        let mut b = TokenBucket::new(10.0, 1.0, t0());
        b.tokens = 1.0;

        let later = t0() + Duration::seconds(2);
        assert!(!b.try_consume(5.0, later));
        // Refill happened (1 + 2), consumption did not.
        assert!((b.tokens - 3.0).abs() < 1e-9);
    }

    #[test]
    fn fractional_consumption() {
        let mut b = TokenBucket::new(1.0, 0.1, t0());
        assert!(b.try_consume(0.5, t0()));
        assert!(b.try_consume(0.5, t0()));
        assert!(!b.try_consume(0.5, t0()));
    }

    #[test]
    fn utilization_percentage() {
        let mut b = TokenBucket::new(10.0, 0.0, t0());
        assert_eq!(b.utilization_pct(t0()), 0.0);
        b.tokens = 2.5;
        assert!((b.utilization_pct(t0()) - 75.0).abs() < 1e-9);
    }

    #[test]
    fn serde_roundtrip_preserves_state() {
        let mut b = TokenBucket::new(10.0, 0.5, t0());
        assert!(b.try_consume(3.0, t0()));

        let json = serde_json::to_string(&b).unwrap();
        assert!(json.contains("2026-01-01T00:00:00Z"), "last_refill should be RFC 3339: {json}");

        let back: TokenBucket = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tokens, b.tokens);
        assert_eq!(back.capacity, b.capacity);
        assert_eq!(back.last_refill, b.last_refill);
    }

    #[test]
    fn period_parsing() {
        use std::str::FromStr;
        assert_eq!(Period::from_str("hour").unwrap(), Period::Hour);
        assert_eq!(Period::from_str("MIN").unwrap(), Period::Minute);
        assert_eq!(Period::from_str("d").unwrap(), Period::Day);
        assert!(Period::from_str("fortnight").is_err());
        assert_eq!(Period::Day.seconds(), 86_400.0);
    }
}
