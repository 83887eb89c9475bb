//! Encrypted credential store with rotation-deadline tracking.
//!
//! The [`Vault`] owns a data directory laid out as:
//!
//! ```text
//! <data_dir>/
//!   vault.bin    — the whole credential map, sealed with AES-256-GCM (0600)
//!   vault.salt   — random per-installation key-derivation salt (0600)
//!   audit/       — day-partitioned NDJSON audit trail (0700)
//! ```
//!
//! The plaintext inside `vault.bin` is a single JSON document shaped
//! `{ service: { key: { value, created_at, rotate_by, metadata } } }`.
//! Every write rewrites the whole blob through a temp file and an atomic
//! rename, so a crash mid-write never leaves a partial vault on disk.
//!
//! Rotation deadlines are advisory: a stale credential is still returned by
//! [`Vault::get`], with a warning, and surfaced by
//! [`Vault::check_rotation_needed`]. Nothing is ever blocked on staleness.
//!
//! The vault assumes a single writer per data directory. The automation jobs
//! that share it are single-instance cron batches; concurrent processes
//! writing the same vault race with last-writer-wins semantics.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditEvent, AuditLog};
use crate::crypto;
use crate::error::{Result, VaultError};
use crate::keychain::KeychainProvider;
use crate::migrate;
use crate::perms;

/// Rotation period applied when the caller does not specify one.
pub const DEFAULT_ROTATION_DAYS: u32 = 30;

/// Length of the generated master password, pre-encoding.
const MASTER_PASSWORD_BYTES: usize = 32;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One secret stored in the vault, addressed by `(service, key)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialEntry {
    /// The secret itself. Only ever on disk inside the sealed blob.
    pub value: String,
    /// When this entry was created or last overwritten.
    pub created_at: DateTime<Utc>,
    /// Advisory deadline after which the entry is considered stale.
    pub rotate_by: DateTime<Utc>,
    /// Free-form, unencrypted-in-spirit annotations (stored inside the blob,
    /// but never treated as secret).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Listing row for a stored entry. Never contains the secret value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSummary {
    pub service: String,
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub rotate_by: DateTime<Utc>,
    pub needs_rotation: bool,
    pub metadata: BTreeMap<String, String>,
}

/// An entry whose rotation deadline has passed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationDue {
    pub service: String,
    pub key: String,
    pub rotate_by: DateTime<Utc>,
    pub days_overdue: i64,
}

/// The decrypted credential map: service → key → entry.
type CredentialMap = BTreeMap<String, BTreeMap<String, CredentialEntry>>;

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// Encrypted-at-rest credential store.
///
/// # Example
///
/// ```rust,no_run
/// use palisade_vault::store::Vault;
///
/// # fn example() -> palisade_vault::error::Result<()> {
/// let mut vault = Vault::open_with_password("data/vault", "master password")?;
///
/// vault.store("ynab", "api_key", "abc123", 90, Default::default())?;
///
/// if let Some(secret) = vault.get("ynab", "api_key") {
///     println!("key = {secret}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct Vault {
    data_dir: PathBuf,
    key: [u8; crypto::KEY_LEN],
    entries: CredentialMap,
    audit: AuditLog,
}

impl Vault {
    /// Open (or initialize) the vault at `data_dir`, resolving the master
    /// password through the given keychain.
    ///
    /// On first use — no password in the keychain yet — a random password is
    /// generated and stored there, and the vault starts empty. Losing the
    /// keychain entry afterwards makes the vault unrecoverable by design.
    pub fn open(data_dir: impl Into<PathBuf>, keychain: &dyn KeychainProvider) -> Result<Self> {
        let password = match keychain.get_master_password() {
            Ok(p) => p,
            Err(VaultError::MasterPasswordNotFound) => {
                use base64::Engine;
                let raw = crypto::random_bytes(MASTER_PASSWORD_BYTES)?;
                let generated = base64::engine::general_purpose::STANDARD.encode(raw);
                keychain.set_master_password(&generated)?;
                tracing::info!("generated and stored a new master password");
                generated
            }
            Err(e) => return Err(e),
        };

        Self::open_with_password(data_dir, &password)
    }

    /// Open (or initialize) the vault at `data_dir` with an explicit master
    /// password, bypassing the keychain. Used by tests and recovery tooling.
    pub fn open_with_password(data_dir: impl Into<PathBuf>, password: &str) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        perms::restrict_dir(&data_dir)?;

        let salt = Self::load_or_create_salt(&data_dir)?;
        let key = crypto::derive_key(password.as_bytes(), &salt);

        let vault_path = data_dir.join("vault.bin");
        let entries = if vault_path.exists() {
            let blob = std::fs::read(&vault_path).map_err(|e| VaultError::Persistence {
                path: vault_path.clone(),
                reason: e.to_string(),
            })?;
            let plaintext = crypto::open(&blob, &key)?;
            serde_json::from_slice(&plaintext)?
        } else {
            CredentialMap::new()
        };

        let audit = AuditLog::open(data_dir.join("audit"))?;

        tracing::info!(
            path = %data_dir.display(),
            services = entries.len(),
            "vault ready"
        );

        Ok(Self {
            data_dir,
            key,
            entries,
            audit,
        })
    }

    /// The directory this vault owns.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    // -- Core operations ----------------------------------------------------

    /// Upsert the secret at `(service, key)`.
    ///
    /// Sets `created_at = now` and `rotate_by = now + rotate_after_days`,
    /// rewrites the sealed blob, and records `CREDENTIAL_STORED` (new entry)
    /// or `CREDENTIAL_UPDATED` (overwrite) in the audit trail.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Persistence`] if the blob cannot be rewritten;
    /// in that case the on-disk vault is unchanged (temp-file + rename).
    pub fn store(
        &mut self,
        service: &str,
        key: &str,
        value: &str,
        rotate_after_days: u32,
        metadata: BTreeMap<String, String>,
    ) -> Result<()> {
        let event = self.upsert(service, key, value, rotate_after_days, metadata)?;
        self.audit.append(event, service, key, None);

        tracing::info!(service = service, key = key, event = %event, "stored credential");
        Ok(())
    }

    /// Retrieve the decrypted value at `(service, key)`.
    ///
    /// Absence is not an error — returns `None`. A value past its rotation
    /// deadline is still returned, with a warning; rotation is advisory.
    pub fn get(&self, service: &str, key: &str) -> Option<String> {
        let entry = self.entries.get(service)?.get(key)?;

        if Utc::now() > entry.rotate_by {
            tracing::warn!(
                service = service,
                key = key,
                rotate_by = %entry.rotate_by,
                "credential is past its rotation deadline"
            );
        }

        self.audit
            .append(AuditEvent::CredentialAccessed, service, key, None);

        Some(entry.value.clone())
    }

    /// Remove the entry at `(service, key)`.
    ///
    /// Returns `false` (without touching disk) when the entry does not exist.
    pub fn delete(&mut self, service: &str, key: &str) -> Result<bool> {
        let removed = match self.entries.get_mut(service) {
            Some(keys) => keys.remove(key).is_some(),
            None => false,
        };
        if !removed {
            return Ok(false);
        }

        // Drop emptied service namespaces so listings stay clean.
        if self.entries.get(service).is_some_and(BTreeMap::is_empty) {
            self.entries.remove(service);
        }

        self.persist()?;
        self.audit
            .append(AuditEvent::CredentialDeleted, service, key, None);

        tracing::info!(service = service, key = key, "deleted credential");
        Ok(true)
    }

    /// List every stored entry. Secret values are never included.
    pub fn list(&self) -> Vec<CredentialSummary> {
        let now = Utc::now();
        let mut summaries = Vec::new();

        for (service, keys) in &self.entries {
            for (key, entry) in keys {
                summaries.push(CredentialSummary {
                    service: service.clone(),
                    key: key.clone(),
                    created_at: entry.created_at,
                    rotate_by: entry.rotate_by,
                    needs_rotation: now > entry.rotate_by,
                    metadata: entry.metadata.clone(),
                });
            }
        }

        tracing::debug!(count = summaries.len(), "listed credentials");
        summaries
    }

    /// All entries past their rotation deadline, with how many whole days
    /// overdue each is.
    pub fn check_rotation_needed(&self) -> Vec<RotationDue> {
        let now = Utc::now();
        let mut due = Vec::new();

        for (service, keys) in &self.entries {
            for (key, entry) in keys {
                if now > entry.rotate_by {
                    due.push(RotationDue {
                        service: service.clone(),
                        key: key.clone(),
                        rotate_by: entry.rotate_by,
                        days_overdue: (now - entry.rotate_by).num_days(),
                    });
                }
            }
        }

        due
    }

    /// Import a `KEY=value` flat credentials file into the given service
    /// namespace, then rename the source to `<path>.backup`.
    ///
    /// Rotation periods are inferred from each key's name (see
    /// [`crate::migrate`]). Best-effort: unparseable lines and individual
    /// store failures are logged and skipped. Returns the number of entries
    /// imported.
    pub fn migrate_from_flat_file(&mut self, path: &Path, service: &str) -> Result<usize> {
        let contents = std::fs::read_to_string(path).map_err(|e| VaultError::Persistence {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let source = path.display().to_string();
        let mut migrated = 0usize;

        for (lineno, line) in contents.lines().enumerate() {
            let Some((key, value)) = migrate::parse_flat_line(line) else {
                continue;
            };
            let rotate_days = migrate::infer_rotation_days(&key);

            match self.upsert(service, &key, &value, rotate_days, BTreeMap::new()) {
                Ok(_) => {
                    self.audit
                        .append(AuditEvent::CredentialMigrated, service, &key, Some(&source));
                    migrated += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        service = service,
                        key = %key,
                        line = lineno + 1,
                        error = %e,
                        "skipping flat-file entry that failed to store"
                    );
                }
            }
        }

        // Retire the source file so the plaintext copy is no longer live.
        let backup = PathBuf::from(format!("{}.backup", path.display()));
        if let Err(e) = std::fs::rename(path, &backup) {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "migrated credentials but could not rename source to .backup"
            );
        }

        tracing::info!(
            service = service,
            migrated = migrated,
            source = %source,
            "flat-file migration complete"
        );
        Ok(migrated)
    }

    /// Re-check and silently repair owner-only permissions on every path the
    /// vault owns. Returns `path → was_secure` (state found before repair).
    pub fn validate_permissions(&self) -> Result<BTreeMap<PathBuf, bool>> {
        let mut paths = vec![
            self.data_dir.clone(),
            self.vault_path(),
            self.salt_path(),
            self.data_dir.join("master.key"),
            self.audit.dir().to_path_buf(),
        ];

        if let Ok(dir) = std::fs::read_dir(self.audit.dir()) {
            for entry in dir.flatten() {
                paths.push(entry.path());
            }
        }

        perms::validate_tree(&paths)
    }

    // -- Internal helpers ---------------------------------------------------

    fn vault_path(&self) -> PathBuf {
        self.data_dir.join("vault.bin")
    }

    fn salt_path(&self) -> PathBuf {
        self.data_dir.join("vault.salt")
    }

    /// Insert or overwrite an entry and rewrite the blob. Returns which audit
    /// event the mutation corresponds to.
    fn upsert(
        &mut self,
        service: &str,
        key: &str,
        value: &str,
        rotate_after_days: u32,
        metadata: BTreeMap<String, String>,
    ) -> Result<AuditEvent> {
        let now = Utc::now();
        let entry = CredentialEntry {
            value: value.to_string(),
            created_at: now,
            rotate_by: now + chrono::Duration::days(i64::from(rotate_after_days)),
            metadata,
        };

        let existed = self
            .entries
            .entry(service.to_string())
            .or_default()
            .insert(key.to_string(), entry)
            .is_some();

        self.persist()?;

        Ok(if existed {
            AuditEvent::CredentialUpdated
        } else {
            AuditEvent::CredentialStored
        })
    }

    /// Seal the credential map and replace `vault.bin` atomically.
    fn persist(&self) -> Result<()> {
        let plaintext = serde_json::to_vec(&self.entries)?;
        let blob = crypto::seal(&plaintext, &self.key)?;

        let path = self.vault_path();
        let tmp = self.data_dir.join("vault.bin.tmp");

        std::fs::write(&tmp, &blob).map_err(|e| VaultError::Persistence {
            path: tmp.clone(),
            reason: e.to_string(),
        })?;
        perms::restrict_file(&tmp)?;
        std::fs::rename(&tmp, &path).map_err(|e| VaultError::Persistence {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        tracing::trace!(path = %path.display(), bytes = blob.len(), "vault blob rewritten");
        Ok(())
    }

    /// Load the per-installation salt, generating and persisting one on
    /// first use.
    fn load_or_create_salt(data_dir: &Path) -> Result<[u8; crypto::SALT_LEN]> {
        let path = data_dir.join("vault.salt");

        if path.exists() {
            let data = std::fs::read(&path).map_err(|e| VaultError::Persistence {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            if data.len() != crypto::SALT_LEN {
                return Err(VaultError::KeyDerivationFailed {
                    reason: format!(
                        "salt file is {} bytes, expected {}",
                        data.len(),
                        crypto::SALT_LEN
                    ),
                });
            }
            let mut salt = [0u8; crypto::SALT_LEN];
            salt.copy_from_slice(&data);
            return Ok(salt);
        }

        let salt = crypto::generate_salt()?;
        std::fs::write(&path, salt).map_err(|e| VaultError::Persistence {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        perms::restrict_file(&path)?;

        tracing::info!(path = %path.display(), "generated installation salt");
        Ok(salt)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vault(dir: &Path) -> Vault {
        Vault::open_with_password(dir.join("vault"), "test master password").unwrap()
    }

    #[test]
    fn store_and_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut vault = test_vault(dir.path());

        vault
            .store("gmail", "oauth_token", "ya29.secret", 30, BTreeMap::new())
            .unwrap();

        assert_eq!(vault.get("gmail", "oauth_token").as_deref(), Some("ya29.secret"));
    }

    #[test]
    fn get_absent_is_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let vault = test_vault(dir.path());
        assert_eq!(vault.get("nope", "nothing"), None);
    }

    #[test]
    fn roundtrip_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let mut vault = test_vault(dir.path());
            vault
                .store("ynab", "api_key", "abc123", 90, BTreeMap::new())
                .unwrap();
        }

        let reopened = test_vault(dir.path());
        assert_eq!(reopened.get("ynab", "api_key").as_deref(), Some("abc123"));
    }

    #[test]
    fn wrong_password_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut vault = test_vault(dir.path());
            vault
                .store("svc", "key", "value", 30, BTreeMap::new())
                .unwrap();
        }

        let result = Vault::open_with_password(dir.path().join("vault"), "wrong password");
        assert!(matches!(result, Err(VaultError::DecryptionFailed { .. })));
    }

    #[test]
    fn rotation_deadline_is_created_plus_days() {
        let dir = tempfile::tempdir().unwrap();
        let mut vault = test_vault(dir.path());

        vault
            .store("ynab", "api_key", "abc123", 90, BTreeMap::new())
            .unwrap();

        let list = vault.list();
        assert_eq!(list.len(), 1);
        let row = &list[0];
        assert_eq!(row.service, "ynab");
        assert_eq!(row.key, "api_key");
        assert!(!row.needs_rotation);

        let expected = row.created_at + chrono::Duration::days(90);
        let drift = (row.rotate_by - expected).num_seconds().abs();
        assert!(drift <= 1, "rotate_by drifted {drift}s from created_at + 90d");
    }

    #[test]
    fn zero_day_rotation_is_immediately_due() {
        let dir = tempfile::tempdir().unwrap();
        let mut vault = test_vault(dir.path());

        vault
            .store("todoist", "token", "t0k", 0, BTreeMap::new())
            .unwrap();
        // rotate_by == created_at, so by the time we check, now > rotate_by.
        std::thread::sleep(std::time::Duration::from_millis(5));

        let due = vault.check_rotation_needed();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].service, "todoist");
        assert_eq!(due[0].days_overdue, 0);

        let list = vault.list();
        assert!(list[0].needs_rotation);
    }

    #[test]
    fn overwrite_replaces_value_and_resets_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let mut vault = test_vault(dir.path());

        vault
            .store("svc", "key", "old", 0, BTreeMap::new())
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(vault.check_rotation_needed().len(), 1);

        vault
            .store("svc", "key", "new", 30, BTreeMap::new())
            .unwrap();
        assert_eq!(vault.get("svc", "key").as_deref(), Some("new"));
        assert!(vault.check_rotation_needed().is_empty());
    }

    #[test]
    fn list_never_exposes_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut vault = test_vault(dir.path());

        vault
            .store("gmail", "oauth_token", "super-secret", 30, BTreeMap::new())
            .unwrap();

        let json = serde_json::to_string(&vault.list()).unwrap();
        assert!(!json.contains("super-secret"));
    }

    #[test]
    fn metadata_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut vault = test_vault(dir.path());

        let mut meta = BTreeMap::new();
        meta.insert("owner".to_string(), "budget-sync".to_string());
        vault.store("ynab", "api_key", "abc", 90, meta).unwrap();

        let list = vault.list();
        assert_eq!(list[0].metadata.get("owner").map(String::as_str), Some("budget-sync"));
    }

    #[test]
    fn delete_removes_entry_and_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let mut vault = test_vault(dir.path());

        vault
            .store("svc", "key", "value", 30, BTreeMap::new())
            .unwrap();
        assert!(vault.delete("svc", "key").unwrap());
        assert_eq!(vault.get("svc", "key"), None);
        assert!(vault.list().is_empty());

        // Deleting again is a quiet false.
        assert!(!vault.delete("svc", "key").unwrap());
    }

    #[test]
    fn migrate_flat_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut vault = test_vault(dir.path());

        let flat = dir.path().join("creds.env");
        std::fs::write(
            &flat,
            "# legacy credentials\n\
             GMAIL_OAUTH_TOKEN=ya29.token\n\
             YNAB_API_KEY=\"quoted-key\"\n\
             \n\
             not an assignment\n\
             SMTP_PASSWORD=hunter2\n",
        )
        .unwrap();

        let migrated = vault.migrate_from_flat_file(&flat, "legacy").unwrap();
        assert_eq!(migrated, 3);

        assert_eq!(vault.get("legacy", "GMAIL_OAUTH_TOKEN").as_deref(), Some("ya29.token"));
        assert_eq!(vault.get("legacy", "YNAB_API_KEY").as_deref(), Some("quoted-key"));
        assert_eq!(vault.get("legacy", "SMTP_PASSWORD").as_deref(), Some("hunter2"));

        // Source retired to .backup.
        assert!(!flat.exists());
        assert!(dir.path().join("creds.env.backup").exists());

        // Inferred rotation periods: token 30d, api key 90d, default 180d.
        let by_key: BTreeMap<String, CredentialSummary> = vault
            .list()
            .into_iter()
            .map(|s| (s.key.clone(), s))
            .collect();
        let days = |k: &str| {
            let s = &by_key[k];
            (s.rotate_by - s.created_at).num_days()
        };
        assert_eq!(days("GMAIL_OAUTH_TOKEN"), 30);
        assert_eq!(days("YNAB_API_KEY"), 90);
        assert_eq!(days("SMTP_PASSWORD"), 180);
    }

    #[cfg(unix)]
    #[test]
    fn vault_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let mut vault = test_vault(dir.path());
        vault
            .store("svc", "key", "value", 30, BTreeMap::new())
            .unwrap();

        let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&vault.vault_path()), 0o600);
        assert_eq!(mode(&vault.salt_path()), 0o600);
        assert_eq!(mode(vault.data_dir()), 0o700);
    }

    #[cfg(unix)]
    #[test]
    fn validate_permissions_repairs_and_reports() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let mut vault = test_vault(dir.path());
        vault
            .store("svc", "key", "value", 30, BTreeMap::new())
            .unwrap();

        // Widen the blob behind the vault's back.
        std::fs::set_permissions(
            vault.vault_path(),
            std::fs::Permissions::from_mode(0o644),
        )
        .unwrap();

        let report = vault.validate_permissions().unwrap();
        assert_eq!(report.get(&vault.vault_path()), Some(&false));
        assert_eq!(
            std::fs::metadata(vault.vault_path()).unwrap().permissions().mode() & 0o777,
            0o600
        );

        // Everything else was already tight.
        assert_eq!(report.get(&vault.salt_path()), Some(&true));
    }
}
