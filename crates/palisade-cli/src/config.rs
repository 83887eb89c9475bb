//! CLI configuration: `palisade.toml` in the data directory.
//!
//! Only the alert channels need configuration; the vault and limiter derive
//! their paths from the data directory. The SMTP password is *not* stored
//! here — `password_key` names a `service/key` entry in the vault, so the
//! config file never holds a secret.
//!
//! ```toml
//! [alerts.email]
//! host = "smtp.fastmail.com"
//! port = 465
//! username = "bot@example.com"
//! password_key = "palisade/smtp_password"
//! from = "bot@example.com"
//! to = "me@example.com"
//!
//! [alerts.sms]
//! webhook_url = "https://sms-relay.example.com/send"
//! to = "+15550100"
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Name of the config file inside the data directory.
const CONFIG_FILE: &str = "palisade.toml";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub alerts: AlertsConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertsConfig {
    pub email: Option<EmailConfig>,
    pub sms: Option<SmsConfig>,
}

#[derive(Debug, Deserialize)]
pub struct EmailConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    /// `service/key` of the SMTP password in the vault.
    pub password_key: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Deserialize)]
pub struct SmsConfig {
    pub webhook_url: String,
    pub to: String,
}

fn default_smtp_port() -> u16 {
    palisade_alerts::smtp::DEFAULT_SMTP_PORT
}

impl Config {
    /// Load `palisade.toml` from the data directory. A missing file is the
    /// default (empty) configuration, not an error.
    pub fn load(data_dir: &Path) -> anyhow::Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }
}

/// Resolve the data directory: `--data-dir` flag, then `PALISADE_DATA_DIR`,
/// then `~/.palisade`.
pub fn resolve_data_dir(flag: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir);
    }
    if let Ok(dir) = std::env::var("PALISADE_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .context("cannot resolve a data directory: no --data-dir, $PALISADE_DATA_DIR, or $HOME")?;
    Ok(PathBuf::from(home).join(".palisade"))
}
