//! Alert error types.

use std::path::PathBuf;

/// Unified error type for the Palisade alert notifier.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    /// A transport (email, SMS, metrics) failed to deliver. Caught at the
    /// channel boundary inside the notifier — one channel's failure never
    /// aborts its siblings.
    #[error("{channel} transport failed: {reason}")]
    Transport { channel: String, reason: String },

    /// The alert log file could not be written.
    #[error("persistence failure on {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error from the filesystem.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the alerts crate.
pub type Result<T> = std::result::Result<T, AlertError>;
