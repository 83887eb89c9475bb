//! OS keychain integration for master-password storage.
//!
//! The vault key is derived from a per-installation master password, and that
//! password must never sit on disk in plaintext. This module provides a
//! [`KeychainProvider`] trait over platform secret stores:
//!
//! - **macOS**: Keychain Services via `security-framework`
//! - **Fallback**: a file encrypted with a device-derived key
//!
//! The [`FileKeychain`] fallback derives its wrapping key from
//! machine-specific data (hostname, username) plus an application salt. That
//! is weaker than a real OS keychain — anyone with access to the same machine
//! account can reconstruct the wrapping key — but it keeps the master
//! password out of plaintext files. Losing the keychain entry makes the vault
//! unrecoverable; that is the accepted failure mode, not a bug.

use std::path::{Path, PathBuf};

use crate::crypto;
use crate::error::{Result, VaultError};
use crate::perms;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Abstraction over platform-specific secure storage for the master password.
pub trait KeychainProvider: Send + Sync {
    /// Retrieve the master password.
    ///
    /// Returns [`VaultError::MasterPasswordNotFound`] if none has been stored.
    fn get_master_password(&self) -> Result<String>;

    /// Store (or overwrite) the master password.
    fn set_master_password(&self, password: &str) -> Result<()>;

    /// Check whether a master password has been stored.
    fn has_master_password(&self) -> Result<bool>;

    /// Delete the stored master password (e.g. during vault reset).
    fn delete_master_password(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// File-based fallback
// ---------------------------------------------------------------------------

/// Application salt mixed into the device-derived wrapping key. Changing this
/// invalidates every previously stored master password. Must be exactly
/// [`crypto::SALT_LEN`] (32) bytes.
const APP_SALT: &[u8; crypto::SALT_LEN] = b"palisade-vault-keychain-v1\x00\x00\x00\x00\x00\x00";

/// File-based keychain storing the master password encrypted with a
/// device-derived key.
///
/// File layout: one sealed blob as produced by [`crypto::seal`]
/// (`[12-byte nonce][ciphertext + tag]`), mode 0600.
pub struct FileKeychain {
    password_file: PathBuf,
}

impl FileKeychain {
    /// Create a file-based keychain that stores the password at
    /// `password_file`. The file itself is created on
    /// [`set_master_password`](KeychainProvider::set_master_password).
    pub fn new(password_file: impl Into<PathBuf>) -> Self {
        Self {
            password_file: password_file.into(),
        }
    }

    /// Default password file location: `<data_dir>/master.key`.
    pub fn default_path(data_dir: &Path) -> PathBuf {
        data_dir.join("master.key")
    }

    /// Derive the wrapping key from machine-specific data.
    ///
    /// Combines the hostname, username, and the application salt into a
    /// deterministic 256-bit key unique per machine/user pair.
    fn device_derived_key(&self) -> [u8; crypto::KEY_LEN] {
        let hostname = Self::hostname();
        let username = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown-user".into());

        let mut material = Vec::with_capacity(hostname.len() + username.len() + APP_SALT.len());
        material.extend_from_slice(hostname.as_bytes());
        material.extend_from_slice(username.as_bytes());
        material.extend_from_slice(APP_SALT);

        crypto::derive_key(&material, APP_SALT)
    }

    /// Best-effort hostname lookup without a libc dependency.
    fn hostname() -> String {
        #[cfg(unix)]
        {
            std::fs::read_to_string("/etc/hostname")
                .map(|s| s.trim().to_string())
                .or_else(|_| std::env::var("HOSTNAME"))
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown-host".into())
        }

        #[cfg(not(unix))]
        {
            std::env::var("COMPUTERNAME")
                .or_else(|_| std::env::var("HOSTNAME"))
                .unwrap_or_else(|_| "unknown-host".into())
        }
    }
}

impl KeychainProvider for FileKeychain {
    fn get_master_password(&self) -> Result<String> {
        if !self.password_file.exists() {
            return Err(VaultError::MasterPasswordNotFound);
        }

        let blob = std::fs::read(&self.password_file)?;
        let plaintext = crypto::open(&blob, &self.device_derived_key())?;

        let password = String::from_utf8(plaintext).map_err(|_| VaultError::DecryptionFailed {
            reason: "master password file decrypted to non-UTF-8 data".into(),
        })?;

        tracing::debug!("retrieved master password from file keychain");
        Ok(password)
    }

    fn set_master_password(&self, password: &str) -> Result<()> {
        let blob = crypto::seal(password.as_bytes(), &self.device_derived_key())?;

        if let Some(parent) = self.password_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.password_file, &blob)?;
        perms::restrict_file(&self.password_file)?;

        tracing::info!(path = %self.password_file.display(), "stored master password in file keychain");
        Ok(())
    }

    fn has_master_password(&self) -> Result<bool> {
        Ok(self.password_file.exists())
    }

    fn delete_master_password(&self) -> Result<()> {
        if self.password_file.exists() {
            std::fs::remove_file(&self.password_file)?;
            tracing::info!(path = %self.password_file.display(), "deleted master password from file keychain");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// macOS Keychain Services
// ---------------------------------------------------------------------------

/// The Security framework error code for "item not found"
/// (`errSecItemNotFound = -25300`).
#[cfg(target_os = "macos")]
const MACOS_ERR_SEC_ITEM_NOT_FOUND: i32 = -25300;

/// macOS Keychain Services backend via the `security-framework` crate.
///
/// Stores the master password in the user's login keychain as a generic
/// password item, protected by the login password and (on Apple Silicon) the
/// Secure Enclave.
#[cfg(target_os = "macos")]
pub struct MacOsKeychain {
    service_name: String,
    account_name: String,
}

#[cfg(target_os = "macos")]
impl MacOsKeychain {
    const DEFAULT_SERVICE: &'static str = "com.palisade.vault";
    const DEFAULT_ACCOUNT: &'static str = "master-password";

    /// Create a provider with the default service and account names.
    pub fn new() -> Self {
        Self {
            service_name: Self::DEFAULT_SERVICE.to_string(),
            account_name: Self::DEFAULT_ACCOUNT.to_string(),
        }
    }

    /// Create a provider with custom service and account names. Useful for
    /// tests or parallel vault installations that must not share an entry.
    pub fn with_names(service: &str, account: &str) -> Self {
        Self {
            service_name: service.to_string(),
            account_name: account.to_string(),
        }
    }
}

#[cfg(target_os = "macos")]
impl Default for MacOsKeychain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "macos")]
impl KeychainProvider for MacOsKeychain {
    fn get_master_password(&self) -> Result<String> {
        use security_framework::passwords::get_generic_password;

        match get_generic_password(&self.service_name, &self.account_name) {
            Ok(data) => {
                let password =
                    String::from_utf8(data.to_vec()).map_err(|_| VaultError::DecryptionFailed {
                        reason: "keychain item contains non-UTF-8 data".into(),
                    })?;
                tracing::debug!(
                    service = %self.service_name,
                    "retrieved master password from macOS keychain"
                );
                Ok(password)
            }
            Err(e) if e.code() == MACOS_ERR_SEC_ITEM_NOT_FOUND => {
                Err(VaultError::MasterPasswordNotFound)
            }
            Err(e) => Err(VaultError::KeychainUnavailable {
                reason: format!("macOS keychain read failed: {e}"),
            }),
        }
    }

    fn set_master_password(&self, password: &str) -> Result<()> {
        use security_framework::passwords::set_generic_password;

        set_generic_password(&self.service_name, &self.account_name, password.as_bytes())
            .map_err(|e| VaultError::MasterPasswordStoreFailed {
                reason: format!("macOS keychain write failed: {e}"),
            })?;

        tracing::info!(
            service = %self.service_name,
            "stored master password in macOS keychain"
        );
        Ok(())
    }

    fn has_master_password(&self) -> Result<bool> {
        use security_framework::passwords::get_generic_password;

        match get_generic_password(&self.service_name, &self.account_name) {
            Ok(_) => Ok(true),
            Err(e) if e.code() == MACOS_ERR_SEC_ITEM_NOT_FOUND => Ok(false),
            Err(e) => Err(VaultError::KeychainUnavailable {
                reason: format!("macOS keychain check failed: {e}"),
            }),
        }
    }

    fn delete_master_password(&self) -> Result<()> {
        use security_framework::passwords::delete_generic_password;

        match delete_generic_password(&self.service_name, &self.account_name) {
            Ok(()) => {
                tracing::info!(
                    service = %self.service_name,
                    "deleted master password from macOS keychain"
                );
                Ok(())
            }
            // Deleting a missing entry is a no-op.
            Err(e) if e.code() == MACOS_ERR_SEC_ITEM_NOT_FOUND => Ok(()),
            Err(e) => Err(VaultError::KeychainUnavailable {
                reason: format!("macOS keychain delete failed: {e}"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Return the best available keychain provider for the current platform.
///
/// - **macOS**: [`MacOsKeychain`] (Keychain Services)
/// - **Other platforms**: [`FileKeychain`] rooted at `data_dir`
pub fn platform_keychain(data_dir: &Path) -> Box<dyn KeychainProvider> {
    let _ = &data_dir; // unused on macOS; keeps the signature uniform

    #[cfg(target_os = "macos")]
    {
        tracing::info!("using macOS Keychain Services for master password storage");
        Box::new(MacOsKeychain::new())
    }
    #[cfg(not(target_os = "macos"))]
    {
        let path = FileKeychain::default_path(data_dir);
        tracing::info!(path = %path.display(), "using file-based keychain for master password storage");
        Box::new(FileKeychain::new(path))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
