//! Append-only NDJSON audit trail.
//!
//! Every vault access appends one JSON object per line to a day-partitioned
//! file (`audit-YYYY-MM-DD.ndjson`, mode 0600) under the vault's audit
//! directory. Records are never rewritten. Audit appends are best-effort:
//! a failed append warns and the triggering vault operation still succeeds.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::perms;

/// The kind of vault access being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEvent {
    /// A new `(service, key)` entry was created.
    CredentialStored,
    /// An existing entry's value was overwritten.
    CredentialUpdated,
    /// An entry's value was read.
    CredentialAccessed,
    /// An entry was removed.
    CredentialDeleted,
    /// An entry was imported from a flat credentials file.
    CredentialMigrated,
}

impl std::fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CredentialStored => "CREDENTIAL_STORED",
            Self::CredentialUpdated => "CREDENTIAL_UPDATED",
            Self::CredentialAccessed => "CREDENTIAL_ACCESSED",
            Self::CredentialDeleted => "CREDENTIAL_DELETED",
            Self::CredentialMigrated => "CREDENTIAL_MIGRATED",
        };
        f.write_str(s)
    }
}

/// One line of the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// When the access happened.
    pub timestamp: DateTime<Utc>,
    /// What kind of access it was.
    pub event: AuditEvent,
    /// The service namespace involved.
    pub service: String,
    /// The key within the service namespace.
    pub key: String,
    /// Free-form context (e.g. the migration source file).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Handle on the vault's audit directory.
pub struct AuditLog {
    dir: PathBuf,
}

impl AuditLog {
    /// Open (creating if needed) the audit directory at `dir`, mode 0700.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        perms::restrict_dir(&dir)?;
        Ok(Self { dir })
    }

    /// The audit directory path.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the audit file for the given day.
    pub fn file_for(&self, date: chrono::NaiveDate) -> PathBuf {
        self.dir.join(format!("audit-{}.ndjson", date.format("%Y-%m-%d")))
    }

    /// Append one record to today's audit file.
    ///
    /// Best-effort: failures are logged at warn level and swallowed so that
    /// the vault operation that triggered the record still completes.
    pub fn append(&self, event: AuditEvent, service: &str, key: &str, detail: Option<&str>) {
        let record = AuditRecord {
            timestamp: Utc::now(),
            event,
            service: service.to_string(),
            key: key.to_string(),
            detail: detail.map(String::from),
        };

        if let Err(e) = self.append_record(&record) {
            tracing::warn!(
                event = %event,
                service = service,
                key = key,
                error = %e,
                "failed to append audit record"
            );
        }
    }

    fn append_record(&self, record: &AuditRecord) -> Result<()> {
        let path = self.file_for(record.timestamp.date_naive());
        let created = !path.exists();

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        file.write_all(&line)?;

        if created {
            perms::restrict_file(&path)?;
        }

        tracing::trace!(
            event = %record.event,
            service = %record.service,
            key = %record.key,
            "audit record appended"
        );
        Ok(())
    }
}
