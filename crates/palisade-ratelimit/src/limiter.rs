//! Named-bucket rate limiter with disk persistence.
//!
//! [`RateLimiter`] owns a map of [`TokenBucket`]s keyed by resource name
//! ("email_send", "ynab_api", …) behind a single mutex, and mirrors it to a
//! JSON state file after every state change so admission decisions survive
//! process restarts. The state file is replaced via temp-file + atomic
//! rename and kept owner-only (0600).
//!
//! The limiter assumes a single process per state file. The automation jobs
//! that share one are single-instance cron batches; concurrent processes
//! would race with last-writer-wins semantics.
//!
//! Keys that were never configured are admitted unconditionally — a
//! permissive default that callers rely on, preserved deliberately.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;

use crate::bucket::{Period, TokenBucket};
use crate::error::{LimiterError, Result};

/// Longest sleep between re-checks while waiting for tokens.
const WAIT_RECHECK_MAX: Duration = Duration::from_secs(1);

/// Outcome of a blocking acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Tokens were consumed.
    Acquired,
    /// The timeout elapsed before enough tokens accumulated.
    TimedOut,
}

impl WaitOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired)
    }
}

/// Point-in-time view of one bucket, for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct BucketStatus {
    pub key: String,
    pub capacity: f64,
    pub refill_rate: f64,
    pub remaining: f64,
    pub utilization_pct: f64,
}

/// Persistent token-bucket rate limiter.
///
/// # Example
///
/// ```rust,no_run
/// use palisade_ratelimit::{Period, RateLimiter};
///
/// # fn example() -> palisade_ratelimit::error::Result<()> {
/// let limiter = RateLimiter::open("data/ratelimit.json")?;
/// limiter.configure_limit("email_send", 10.0, 10.0, Period::Hour)?;
///
/// if limiter.check_and_consume("email_send", 1.0)? {
///     // send the email
/// }
/// # Ok(())
/// # }
/// ```
pub struct RateLimiter {
    state_path: PathBuf,
    buckets: Mutex<BTreeMap<String, TokenBucket>>,
}

impl RateLimiter {
    /// Open the limiter backed by `state_path`, loading any persisted
    /// buckets. A missing file is an empty limiter; an unparseable file is
    /// [`LimiterError::CorruptState`].
    pub fn open(state_path: impl Into<PathBuf>) -> Result<Self> {
        let state_path = state_path.into();

        let buckets = if state_path.exists() {
            let data = std::fs::read(&state_path).map_err(|e| LimiterError::Persistence {
                path: state_path.clone(),
                reason: e.to_string(),
            })?;
            serde_json::from_slice(&data).map_err(|e| LimiterError::CorruptState {
                path: state_path.clone(),
                reason: e.to_string(),
            })?
        } else {
            BTreeMap::new()
        };

        tracing::debug!(
            path = %state_path.display(),
            buckets = buckets.len(),
            "rate limiter state loaded"
        );

        Ok(Self {
            state_path,
            buckets: Mutex::new(buckets),
        })
    }

    /// Configure (or reconfigure) the limit for `key`.
    ///
    /// `refill_rate` is given in tokens per `period` and normalized to
    /// tokens/second. The bucket starts at full capacity and is persisted
    /// immediately.
    pub fn configure_limit(
        &self,
        key: &str,
        capacity: f64,
        refill_rate: f64,
        period: Period,
    ) -> Result<()> {
        let per_second = refill_rate / period.seconds();
        let mut buckets = self.lock();
        buckets.insert(
            key.to_string(),
            TokenBucket::new(capacity, per_second, Utc::now()),
        );
        self.persist(&buckets)?;

        tracing::info!(
            key = key,
            capacity = capacity,
            refill_per_sec = per_second,
            period = %period,
            "configured rate limit"
        );
        Ok(())
    }

    /// Refill `key`'s bucket for the current time, then consume `tokens`
    /// if the level allows. Persists on success; a refused consume mutates
    /// nothing on disk.
    ///
    /// Unconfigured keys return `Ok(true)` immediately.
    pub fn check_and_consume(&self, key: &str, tokens: f64) -> Result<bool> {
        let mut buckets = self.lock();
        let Some(bucket) = buckets.get_mut(key) else {
            tracing::trace!(key = key, "no limit configured, admitting");
            return Ok(true);
        };

        let admitted = bucket.try_consume(tokens, Utc::now());
        if admitted {
            self.persist(&buckets)?;
        } else {
            tracing::debug!(key = key, requested = tokens, "rate limit refused consumption");
        }
        Ok(admitted)
    }

    /// Block the calling thread until `tokens` can be consumed from `key`,
    /// re-checking at most every second.
    ///
    /// `timeout = None` waits indefinitely. This is the only blocking
    /// operation in the crate.
    pub fn wait_and_consume(
        &self,
        key: &str,
        tokens: f64,
        timeout: Option<Duration>,
    ) -> Result<WaitOutcome> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            if self.check_and_consume(key, tokens)? {
                return Ok(WaitOutcome::Acquired);
            }

            // First-order estimate of the wait for the remaining deficit,
            // clamped to the 1-second re-check interval.
            let mut sleep = {
                let buckets = self.lock();
                match buckets.get(key) {
                    Some(b) if b.refill_rate > 0.0 => {
                        let deficit = (tokens - b.remaining(Utc::now())).max(0.0);
                        let secs = (deficit / b.refill_rate).min(WAIT_RECHECK_MAX.as_secs_f64());
                        Duration::from_secs_f64(secs)
                    }
                    _ => WAIT_RECHECK_MAX,
                }
            };

            if let Some(deadline) = deadline {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    tracing::warn!(key = key, requested = tokens, "timed out waiting for tokens");
                    return Ok(WaitOutcome::TimedOut);
                }
                sleep = sleep.min(left);
            }

            std::thread::sleep(sleep.max(Duration::from_millis(10)));
        }
    }

    /// The token level for `key` as of now, or `None` if unconfigured.
    pub fn get_remaining(&self, key: &str) -> Option<f64> {
        let buckets = self.lock();
        buckets.get(key).map(|b| b.remaining(Utc::now()))
    }

    /// Reset `key`'s bucket to full capacity and persist. Returns `false`
    /// (touching nothing) when the key was never configured.
    pub fn reset(&self, key: &str) -> Result<bool> {
        let mut buckets = self.lock();
        let Some(bucket) = buckets.get_mut(key) else {
            return Ok(false);
        };
        bucket.tokens = bucket.capacity;
        bucket.last_refill = Utc::now();
        self.persist(&buckets)?;

        tracing::info!(key = key, "reset rate limit bucket");
        Ok(true)
    }

    /// Per-key utilization snapshot, sorted by key.
    pub fn status(&self) -> Vec<BucketStatus> {
        let now = Utc::now();
        let buckets = self.lock();
        buckets
            .iter()
            .map(|(key, b)| BucketStatus {
                key: key.clone(),
                capacity: b.capacity,
                refill_rate: b.refill_rate,
                remaining: b.remaining(now),
                utilization_pct: b.utilization_pct(now),
            })
            .collect()
    }

    // -- Internal helpers ---------------------------------------------------

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, TokenBucket>> {
        // A poisoned mutex means a panic mid-update; the bucket map itself
        // is always left consistent (refill-then-consume is not split across
        // awaits or I/O), so recover the guard.
        self.buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the state file atomically with the current bucket map.
    fn persist(&self, buckets: &BTreeMap<String, TokenBucket>) -> Result<()> {
        if let Some(parent) = self.state_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let data = serde_json::to_vec_pretty(buckets)?;
        let tmp = self.state_path.with_extension("json.tmp");

        std::fs::write(&tmp, &data).map_err(|e| LimiterError::Persistence {
            path: tmp.clone(),
            reason: e.to_string(),
        })?;
        restrict_file(&tmp)?;
        std::fs::rename(&tmp, &self.state_path).map_err(|e| LimiterError::Persistence {
            path: self.state_path.clone(),
            reason: e.to_string(),
        })?;

        Ok(())
    }
}

/// Restrict the state file to owner read/write (0600).
fn restrict_file(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
