//! Fixed-window per-channel dispatch budgets.
//!
//! The notifier throttles its own output with counters deliberately simpler
//! than the general-purpose token bucket limiter: a channel gets `limit`
//! dispatches per window, the window resets wholesale when it expires, and
//! an exhausted budget drops the alert on that channel — no queueing, no
//! retry.

use chrono::{DateTime, Duration, Utc};

/// One channel's dispatch counter.
#[derive(Debug, Clone)]
pub struct ChannelBudget {
    limit: u32,
    window: Duration,
    window_start: DateTime<Utc>,
    used: u32,
}

impl ChannelBudget {
    /// Email budget: 10 dispatches per hour.
    pub fn email() -> Self {
        Self::new(10, Duration::hours(1))
    }

    /// SMS budget: 1 dispatch per 5 minutes.
    pub fn sms() -> Self {
        Self::new(1, Duration::minutes(5))
    }

    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            window_start: Utc::now(),
            used: 0,
        }
    }

    /// Charge one dispatch against the budget.
    ///
    /// Returns `false` when the window is exhausted; the caller drops the
    /// alert on this channel.
    pub fn try_charge(&mut self, now: DateTime<Utc>) -> bool {
        if now - self.window_start >= self.window {
            self.window_start = now;
            self.used = 0;
        }
        if self.used < self.limit {
            self.used += 1;
            true
        } else {
            false
        }
    }

    /// Dispatches left in the current window.
    pub fn remaining(&self, now: DateTime<Utc>) -> u32 {
        if now - self.window_start >= self.window {
            self.limit
        } else {
            self.limit - self.used
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charges_up_to_limit_then_refuses() {
        let mut budget = ChannelBudget::new(3, Duration::hours(1));
        let now = Utc::now();

        assert!(budget.try_charge(now));
        assert!(budget.try_charge(now));
        assert!(budget.try_charge(now));
        assert!(!budget.try_charge(now));
        assert_eq!(budget.remaining(now), 0);
    }

    #[test]
    fn window_expiry_resets_the_counter() {
        let mut budget = ChannelBudget::new(1, Duration::minutes(5));
        let now = Utc::now();

        assert!(budget.try_charge(now));
        assert!(!budget.try_charge(now + Duration::minutes(4)));
        assert!(budget.try_charge(now + Duration::minutes(5)));
    }

    #[test]
    fn presets_match_the_channel_contracts() {
        let now = Utc::now();
        assert_eq!(ChannelBudget::email().remaining(now), 10);
        assert_eq!(ChannelBudget::sms().remaining(now), 1);
    }
}
