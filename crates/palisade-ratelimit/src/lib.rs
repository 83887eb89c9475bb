//! Persistent token-bucket rate limiter for Palisade.
//!
//! Admission control for any named, rate-sensitive action the automation
//! jobs perform — API calls, email sends, SMS sends. Buckets refill lazily
//! on access, state is mirrored to a JSON file after every successful
//! consumption so limits survive process restarts, and keys that were never
//! configured are admitted unconditionally.
//!
//! # Modules
//!
//! - [`bucket`] — token bucket state and the pure refill/consume math.
//! - [`limiter`] — the named-bucket registry with disk persistence.
//! - [`presets`] — fixed per-application limit profiles.
//! - [`error`] — unified error types.

pub mod bucket;
pub mod error;
pub mod limiter;
pub mod presets;

// Re-export the most commonly used types at the crate root.
pub use bucket::{Period, TokenBucket};
pub use error::{LimiterError, Result};
pub use limiter::{BucketStatus, RateLimiter, WaitOutcome};
pub use presets::AppProfile;
