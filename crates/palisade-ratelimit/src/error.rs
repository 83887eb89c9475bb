//! Rate limiter error types.

use std::path::PathBuf;

/// Unified error type for the Palisade rate limiter.
#[derive(Debug, thiserror::Error)]
pub enum LimiterError {
    /// The state file could not be read or replaced. Never swallowed on
    /// `configure_limit` or a successful consume — those are the paths where
    /// losing a write silently would corrupt admission decisions after a
    /// restart.
    #[error("persistence failure on {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    /// The state file exists but does not parse. Surfaced, not masked: a
    /// corrupt state file needs operator attention, not a quiet reset.
    #[error("state file {path} is corrupt: {reason}")]
    CorruptState { path: PathBuf, reason: String },

    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error from the filesystem.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the rate limiter crate.
pub type Result<T> = std::result::Result<T, LimiterError>;
