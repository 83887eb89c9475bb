//! Owner-only file permission enforcement.
//!
//! Every file the vault creates must end up mode 0600 and every directory
//! mode 0700 — no group or other bits. [`validate_tree`] re-checks a set of
//! paths and silently repairs anything found wider, reporting what it found.
//!
//! On non-Unix platforms these functions are no-ops that report everything
//! as secure; there is no mode-bit contract to enforce there.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File mode required for vault-owned regular files.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Directory mode required for vault-owned directories.
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// Restrict a regular file to owner read/write only (0600).
pub fn restrict_file(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(FILE_MODE))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Restrict a directory to owner access only (0700).
pub fn restrict_dir(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(DIR_MODE))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Check whether `path` has any group/other permission bits set.
///
/// Returns `true` when the entry is already owner-only.
#[cfg(unix)]
fn is_owner_only(path: &Path) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(path)?.permissions().mode();
    Ok(mode & 0o077 == 0)
}

/// Re-check every given path and silently repair any entry found with wider
/// than owner-only permissions.
///
/// Returns `path → was_secure`, where `was_secure` reflects the state *before*
/// repair. Missing paths are skipped.
pub fn validate_tree(paths: &[PathBuf]) -> Result<BTreeMap<PathBuf, bool>> {
    let mut report = BTreeMap::new();

    for path in paths {
        if !path.exists() {
            continue;
        }

        #[cfg(unix)]
        {
            let was_secure = is_owner_only(path)?;
            if !was_secure {
                tracing::warn!(path = %path.display(), "repairing overly permissive mode");
                if path.is_dir() {
                    restrict_dir(path)?;
                } else {
                    restrict_file(path)?;
                }
            }
            report.insert(path.clone(), was_secure);
        }

        #[cfg(not(unix))]
        {
            report.insert(path.clone(), true);
        }
    }

    Ok(report)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn validate_repairs_wide_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("secrets.bin");
        std::fs::write(&file, b"x").unwrap();
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o644)).unwrap();

        let report = validate_tree(&[file.clone()]).unwrap();
        assert_eq!(report.get(&file), Some(&false));

        let mode = std::fs::metadata(&file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        // Second sweep sees the repaired state.
        let report = validate_tree(&[file.clone()]).unwrap();
        assert_eq!(report.get(&file), Some(&true));
    }

    #[test]
    fn validate_repairs_wide_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("audit");
        std::fs::create_dir(&sub).unwrap();
        std::fs::set_permissions(&sub, std::fs::Permissions::from_mode(0o755)).unwrap();

        let report = validate_tree(&[sub.clone()]).unwrap();
        assert_eq!(report.get(&sub), Some(&false));

        let mode = std::fs::metadata(&sub).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn missing_paths_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let ghost = dir.path().join("nope");
        let report = validate_tree(&[ghost.clone()]).unwrap();
        assert!(!report.contains_key(&ghost));
    }
}
