//! Encrypted credential vault for Palisade.
//!
//! This crate is the credential half of the shared foundation used by the
//! personal-automation jobs: durable, confidentiality-protected storage of
//! secrets with rotation-deadline tracking and an append-only audit trail.
//! All sensitive data is sealed at rest with AES-256-GCM; the key is derived
//! from a master password kept in the OS keychain (or an encrypted file
//! fallback).
//!
//! # Modules
//!
//! - [`crypto`] — AES-256-GCM sealing, PBKDF2 key derivation.
//! - [`keychain`] — OS keychain integration for the master password.
//! - [`store`] — the vault: store/get/list/rotation/migration.
//! - [`audit`] — day-partitioned NDJSON audit trail.
//! - [`migrate`] — `KEY=value` flat-file parsing helpers.
//! - [`perms`] — owner-only permission enforcement.
//! - [`error`] — unified error types.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use palisade_vault::keychain;
//! use palisade_vault::store::Vault;
//!
//! # fn example() -> palisade_vault::error::Result<()> {
//! let data_dir = std::path::Path::new("data/vault");
//! let kc = keychain::platform_keychain(data_dir);
//! let mut vault = Vault::open(data_dir, kc.as_ref())?;
//!
//! vault.store("ynab", "api_key", "abc123", 90, Default::default())?;
//!
//! for due in vault.check_rotation_needed() {
//!     eprintln!("{}/{} is {} days overdue", due.service, due.key, due.days_overdue);
//! }
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod crypto;
pub mod error;
pub mod keychain;
pub mod migrate;
pub mod perms;
pub mod store;

// Re-export the most commonly used types at the crate root.
pub use audit::{AuditEvent, AuditLog, AuditRecord};
pub use error::{Result, VaultError};
pub use keychain::{FileKeychain, KeychainProvider, platform_keychain};
pub use store::{CredentialEntry, CredentialSummary, DEFAULT_ROTATION_DAYS, RotationDue, Vault};
