//! Flat-file credential parsing for vault migration.
//!
//! The automation jobs historically kept secrets in `KEY=value` files
//! (`.env`-style). These pure helpers parse that format and infer a rotation
//! period from each key's name; [`crate::store::Vault::migrate_from_flat_file`]
//! drives them and retires the source file.

/// Rotation period (days) for keys that look like short-lived tokens.
pub const TOKEN_ROTATION_DAYS: u32 = 30;

/// Rotation period (days) for keys that look like API keys.
pub const API_KEY_ROTATION_DAYS: u32 = 90;

/// Rotation period (days) for everything else.
pub const DEFAULT_FLAT_ROTATION_DAYS: u32 = 180;

/// Parse one line of a `KEY=value` credentials file.
///
/// Returns `None` for blank lines, `#` comments, and lines without an `=`.
/// Surrounding single or double quotes on the value are stripped. Keys are
/// trimmed; empty keys are rejected.
pub fn parse_flat_line(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let value = strip_quotes(value.trim());
    Some((key.to_string(), value.to_string()))
}

/// Strip one matching pair of surrounding quotes, if present.
fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Infer a rotation period from a key's name.
///
/// Tokens and OAuth material rotate fastest, API keys next, and anything
/// unrecognized gets the long default.
pub fn infer_rotation_days(key: &str) -> u32 {
    let lower = key.to_ascii_lowercase();
    if lower.contains("token") || lower.contains("oauth") {
        TOKEN_ROTATION_DAYS
    } else if lower.contains("api") || lower.contains("key") {
        API_KEY_ROTATION_DAYS
    } else {
        DEFAULT_FLAT_ROTATION_DAYS
    }
}
