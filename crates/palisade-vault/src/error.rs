//! Vault error types.
//!
//! Every public API in this crate surfaces failures through [`VaultError`].
//! Absence of a credential is deliberately *not* an error — `get` returns
//! `Option` — so the variants here cover only genuine failures: crypto,
//! keychain, and persistence.

use std::path::PathBuf;

/// Unified error type for the Palisade credential vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    // -- Crypto errors ------------------------------------------------------
    /// Encryption failed (e.g. invalid key length, ring internal error).
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    /// Decryption failed. Wrong master password, corrupted blob, or truncated
    /// file. Fatal for the vault instance — there is no automatic re-key.
    #[error("decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    /// Key derivation failed (e.g. salt file unreadable).
    #[error("key derivation failed: {reason}")]
    KeyDerivationFailed { reason: String },

    // -- Keychain errors ----------------------------------------------------
    /// No master password has been stored in the keychain yet.
    #[error("master password not found in keychain")]
    MasterPasswordNotFound,

    /// Writing the master password to the keychain failed.
    #[error("failed to store master password: {reason}")]
    MasterPasswordStoreFailed { reason: String },

    /// The keychain backend is unavailable or unsupported on this platform.
    #[error("keychain unavailable: {reason}")]
    KeychainUnavailable { reason: String },

    // -- Persistence errors -------------------------------------------------
    /// A disk write/read on a vault-owned file could not complete. Callers
    /// must treat a failed write as a corruption risk; the vault only ever
    /// replaces its blob via temp-file + atomic rename.
    #[error("persistence failure on {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    // -- Underlying errors --------------------------------------------------
    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error from the filesystem.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;
