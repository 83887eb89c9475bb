//! Fixed per-application limit profiles.
//!
//! Each automation job calls [`AppProfile::for_app`] with its own name and
//! applies the resulting preset over [`RateLimiter::configure_limit`]. The
//! tables below are pure configuration — no algorithmic behavior lives here.

use crate::bucket::Period;
use crate::error::Result;
use crate::limiter::RateLimiter;

/// One preset limit line: `(key, capacity, refill_rate, period)`.
type Preset = (&'static str, f64, f64, Period);

/// The fixed limit set for one named application.
#[derive(Debug, Clone, Copy)]
pub struct AppProfile {
    /// Application name as passed to [`AppProfile::for_app`].
    pub app: &'static str,
    presets: &'static [Preset],
}

/// The inbox-digest job: sends summary emails and urgent SMS nudges, reads
/// Gmail, and calls the Claude API for summarization.
const EMAIL_DIGEST: AppProfile = AppProfile {
    app: "email-digest",
    presets: &[
        ("email_send", 10.0, 10.0, Period::Hour),
        // One SMS per five minutes: 12 per hour, burst of 1.
        ("sms_send", 1.0, 12.0, Period::Hour),
        ("gmail_api", 250.0, 250.0, Period::Second),
        ("claude_api", 30.0, 30.0, Period::Minute),
    ],
};

/// The budget-sync job: polls YNAB and mails a weekly report.
const BUDGET_SYNC: AppProfile = AppProfile {
    app: "budget-sync",
    presets: &[
        ("ynab_api", 120.0, 120.0, Period::Hour),
        ("email_send", 5.0, 5.0, Period::Hour),
    ],
};

/// The task-sync job: mirrors Todoist into the weekly review email.
const TASK_SYNC: AppProfile = AppProfile {
    app: "task-sync",
    presets: &[
        ("todoist_api", 450.0, 450.0, Period::Minute),
        ("email_send", 5.0, 5.0, Period::Hour),
    ],
};

const PROFILES: &[AppProfile] = &[EMAIL_DIGEST, BUDGET_SYNC, TASK_SYNC];

impl AppProfile {
    /// Look up the preset profile for an application name.
    pub fn for_app(app: &str) -> Option<&'static AppProfile> {
        PROFILES.iter().find(|p| p.app == app)
    }

    /// Every known profile.
    pub fn all() -> &'static [AppProfile] {
        PROFILES
    }

    /// The limit lines this profile configures.
    pub fn presets(&self) -> &'static [Preset] {
        self.presets
    }

    /// Configure every limit in this profile on the given limiter.
    pub fn apply(&self, limiter: &RateLimiter) -> Result<()> {
        for (key, capacity, rate, period) in self.presets {
            limiter.configure_limit(key, *capacity, *rate, *period)?;
        }
        tracing::info!(app = self.app, limits = self.presets.len(), "applied rate limit profile");
        Ok(())
    }
}
