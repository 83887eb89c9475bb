//! CLI entry point for Palisade.
//!
//! This binary provides the `palisade` command with subcommands over the
//! three library crates: `creds` (vault), `limits` (rate limiter), and
//! `alerts` (notifier).
//!
//! Exit codes are deliberate, one per failure class:
//! 0 success, 1 generic failure (including a denied rate-limit test),
//! 2 not found, 3 permission/keychain failure, 4 decryption failure.

mod cli;
mod config;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;

use palisade_alerts::notifier::AlertNotifier;
use palisade_alerts::{AlertError, AlertEvent, SmtpMailer, WebhookSms};
use palisade_ratelimit::{AppProfile, LimiterError, RateLimiter, WaitOutcome};
use palisade_vault::{Vault, VaultError, platform_keychain};

use crate::cli::{AlertsAction, Cli, Commands, CredsAction, LimitsAction};
use crate::config::Config;

const EXIT_OK: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_NOT_FOUND: i32 = 2;
const EXIT_PERMISSION: i32 = 3;
const EXIT_CRYPTO: i32 = 4;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(exit_code_for(&e));
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<i32> {
    let data_dir = config::resolve_data_dir(cli.data_dir)?;

    match cli.command {
        Commands::Creds { action } => run_creds(&data_dir, action),
        Commands::Limits { action } => run_limits(&data_dir, action),
        Commands::Alerts { action } => run_alerts(&data_dir, action),
    }
}

// ---------------------------------------------------------------------------
// Subcommands: creds
// ---------------------------------------------------------------------------

fn open_vault(data_dir: &Path) -> Result<Vault> {
    let vault_dir = data_dir.join("vault");
    let keychain = platform_keychain(&vault_dir);
    let vault = Vault::open(&vault_dir, keychain.as_ref())
        .with_context(|| format!("failed to open vault at {}", vault_dir.display()))?;
    Ok(vault)
}

fn run_creds(data_dir: &Path, action: CredsAction) -> Result<i32> {
    match action {
        CredsAction::Store {
            service,
            key,
            value,
            rotate_days,
            meta,
        } => {
            let metadata = parse_meta_pairs(&meta)?;
            let mut vault = open_vault(data_dir)?;
            vault.store(&service, &key, &value, rotate_days, metadata)?;
            println!("stored {service}/{key} (rotate in {rotate_days} days)");
            Ok(EXIT_OK)
        }

        CredsAction::Get { service, key } => {
            let vault = open_vault(data_dir)?;
            match vault.get(&service, &key) {
                Some(value) => {
                    println!("{value}");
                    Ok(EXIT_OK)
                }
                None => {
                    eprintln!("credential not found: {service}/{key}");
                    Ok(EXIT_NOT_FOUND)
                }
            }
        }

        CredsAction::List => {
            let vault = open_vault(data_dir)?;
            let rows = vault.list();
            if rows.is_empty() {
                println!("vault is empty");
                return Ok(EXIT_OK);
            }
            for row in &rows {
                let marker = if row.needs_rotation { "  [ROTATION DUE]" } else { "" };
                println!(
                    "{}/{}  created {}  rotate by {}{marker}",
                    row.service,
                    row.key,
                    row.created_at.format("%Y-%m-%d"),
                    row.rotate_by.format("%Y-%m-%d"),
                );
            }
            println!("{} credential(s)", rows.len());
            Ok(EXIT_OK)
        }

        CredsAction::CheckRotation => {
            let vault = open_vault(data_dir)?;
            let due = vault.check_rotation_needed();
            if due.is_empty() {
                println!("all credentials are within their rotation deadlines");
            } else {
                for entry in &due {
                    println!(
                        "{}/{}  {} day(s) overdue (deadline was {})",
                        entry.service,
                        entry.key,
                        entry.days_overdue,
                        entry.rotate_by.format("%Y-%m-%d"),
                    );
                }
                println!("{} credential(s) need rotation", due.len());
            }
            Ok(EXIT_OK)
        }

        CredsAction::Migrate { file, service } => {
            let mut vault = open_vault(data_dir)?;
            let migrated = vault.migrate_from_flat_file(&file, &service)?;
            println!(
                "migrated {migrated} credential(s) from {} into service '{service}'",
                file.display()
            );
            Ok(EXIT_OK)
        }

        CredsAction::Validate => {
            let vault = open_vault(data_dir)?;
            let report = vault.validate_permissions()?;
            let repaired: Vec<&PathBuf> = report
                .iter()
                .filter_map(|(path, secure)| (!secure).then_some(path))
                .collect();
            for path in &repaired {
                println!("repaired {}", path.display());
            }
            println!(
                "checked {} path(s), repaired {}",
                report.len(),
                repaired.len()
            );
            Ok(EXIT_OK)
        }
    }
}

/// Parse repeated `k=v` metadata flags.
fn parse_meta_pairs(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut metadata = BTreeMap::new();
    for pair in pairs {
        let Some((k, v)) = pair.split_once('=') else {
            bail!("invalid --meta '{pair}': expected KEY=VALUE");
        };
        metadata.insert(k.to_string(), v.to_string());
    }
    Ok(metadata)
}

// ---------------------------------------------------------------------------
// Subcommands: limits
// ---------------------------------------------------------------------------

fn open_limiter(data_dir: &Path) -> Result<RateLimiter> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;
    let path = data_dir.join("ratelimit.json");
    let limiter = RateLimiter::open(&path)
        .with_context(|| format!("failed to open rate limiter state at {}", path.display()))?;
    Ok(limiter)
}

fn run_limits(data_dir: &Path, action: LimitsAction) -> Result<i32> {
    let limiter = open_limiter(data_dir)?;

    match action {
        LimitsAction::Configure {
            key,
            capacity,
            rate,
            period,
            app,
        } => {
            if let Some(app) = app {
                let Some(profile) = AppProfile::for_app(&app) else {
                    eprintln!("unknown application profile '{app}'");
                    return Ok(EXIT_NOT_FOUND);
                };
                profile.apply(&limiter)?;
                println!(
                    "applied profile '{app}' ({} limit(s))",
                    profile.presets().len()
                );
                return Ok(EXIT_OK);
            }

            // clap guarantees `key` is present when `app` is absent.
            let key = key.unwrap_or_default();
            let (Some(capacity), Some(rate)) = (capacity, rate) else {
                bail!("--capacity and --rate are required with --key");
            };
            limiter.configure_limit(&key, capacity, rate, period)?;
            println!("configured '{key}': {capacity} burst, {rate}/{period} refill");
            Ok(EXIT_OK)
        }

        LimitsAction::Test {
            key,
            tokens,
            wait_secs,
        } => match wait_secs {
            Some(secs) => {
                match limiter.wait_and_consume(&key, tokens, Some(Duration::from_secs(secs)))? {
                    WaitOutcome::Acquired => {
                        println!("acquired {tokens} token(s) from '{key}'");
                        Ok(EXIT_OK)
                    }
                    WaitOutcome::TimedOut => {
                        eprintln!("timed out after {secs}s waiting for '{key}'");
                        Ok(EXIT_FAILURE)
                    }
                }
            }
            None => {
                if limiter.check_and_consume(&key, tokens)? {
                    println!("allowed: consumed {tokens} token(s) from '{key}'");
                    Ok(EXIT_OK)
                } else {
                    let remaining = limiter.get_remaining(&key).unwrap_or(0.0);
                    eprintln!("denied: '{key}' has {remaining:.2} token(s) available");
                    Ok(EXIT_FAILURE)
                }
            }
        },

        LimitsAction::Status => {
            let status = limiter.status();
            if status.is_empty() {
                println!("no limits configured");
                return Ok(EXIT_OK);
            }
            for bucket in &status {
                println!(
                    "{}: {:.1}/{} tokens ({:.0}% used, {:.4}/s refill)",
                    bucket.key,
                    bucket.remaining,
                    bucket.capacity,
                    bucket.utilization_pct,
                    bucket.refill_rate,
                );
            }
            Ok(EXIT_OK)
        }

        LimitsAction::Reset { key } => {
            if limiter.reset(&key)? {
                println!("reset '{key}' to full capacity");
                Ok(EXIT_OK)
            } else {
                eprintln!("no limit configured for '{key}'");
                Ok(EXIT_NOT_FOUND)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Subcommands: alerts
// ---------------------------------------------------------------------------

fn run_alerts(data_dir: &Path, action: AlertsAction) -> Result<i32> {
    match action {
        AlertsAction::Test => {
            let config = Config::load(data_dir)?;
            let notifier = build_notifier(data_dir, &config)?;

            let outcomes = notifier.test_notifications();
            if outcomes.is_empty() {
                println!("no channels configured");
                return Ok(EXIT_OK);
            }

            let mut any_failed = false;
            for (channel, delivered) in &outcomes {
                println!("{channel}: {}", if *delivered { "ok" } else { "FAILED" });
                any_failed |= !delivered;
            }
            Ok(if any_failed { EXIT_FAILURE } else { EXIT_OK })
        }

        AlertsAction::Summary { hours } => {
            let events = read_alert_log(&data_dir.join("alerts"), hours)?;
            if events.is_empty() {
                println!("no alerts in the last {hours}h");
                return Ok(EXIT_OK);
            }

            let mut by_severity: BTreeMap<String, usize> = BTreeMap::new();
            let mut by_app: BTreeMap<String, usize> = BTreeMap::new();
            for event in &events {
                *by_severity
                    .entry(event.severity.as_str().to_string())
                    .or_default() += 1;
                *by_app.entry(event.app.clone()).or_default() += 1;
            }

            println!("{} alert(s) in the last {hours}h", events.len());
            for (severity, count) in &by_severity {
                println!("  {severity}: {count}");
            }
            println!("by app:");
            for (app, count) in &by_app {
                println!("  {app}: {count}");
            }
            Ok(EXIT_OK)
        }
    }
}

/// Wire up the notifier from config, pulling the SMTP password out of the
/// vault (the config file never holds a secret).
fn build_notifier(data_dir: &Path, config: &Config) -> Result<AlertNotifier> {
    let mut notifier = AlertNotifier::new(data_dir.join("alerts"))?;

    if let Some(email) = &config.alerts.email {
        let password = vault_secret(data_dir, &email.password_key)?;
        let mailer = SmtpMailer::new(
            &email.host,
            email.port,
            &email.username,
            password,
            &email.from,
        );
        notifier = notifier.with_email(Box::new(mailer), &email.to);
    }

    if let Some(sms) = &config.alerts.sms {
        notifier = notifier.with_sms(Box::new(WebhookSms::new(&sms.webhook_url)?), &sms.to);
    }

    Ok(notifier)
}

/// Fetch a `service/key` secret from the vault.
fn vault_secret(data_dir: &Path, reference: &str) -> Result<String> {
    let Some((service, key)) = reference.split_once('/') else {
        bail!("invalid vault reference '{reference}': expected service/key");
    };
    let vault = open_vault(data_dir)?;
    vault
        .get(service, key)
        .ok_or_else(|| anyhow::Error::new(NotFound(format!("vault entry {reference}"))))
}

/// Read day-partitioned alert log files and keep events inside the window.
fn read_alert_log(log_dir: &Path, hours: i64) -> Result<Vec<AlertEvent>> {
    let cutoff = chrono::Utc::now() - chrono::Duration::hours(hours);
    let mut events = Vec::new();

    let Ok(dir) = std::fs::read_dir(log_dir) else {
        return Ok(events);
    };
    for entry in dir.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with("alerts-") || !name.ends_with(".ndjson") {
            continue;
        }
        let contents = std::fs::read_to_string(entry.path())
            .with_context(|| format!("failed to read {}", entry.path().display()))?;
        for line in contents.lines() {
            match serde_json::from_str::<AlertEvent>(line) {
                Ok(event) if event.timestamp >= cutoff => events.push(event),
                Ok(_) => {}
                Err(e) => tracing::warn!(
                    file = %entry.path().display(),
                    error = %e,
                    "skipping unparseable alert log line"
                ),
            }
        }
    }

    events.sort_by_key(|e| e.timestamp);
    Ok(events)
}

// ---------------------------------------------------------------------------
// Exit codes
// ---------------------------------------------------------------------------

/// Marker error for "the thing you named does not exist".
#[derive(Debug)]
struct NotFound(String);

impl std::fmt::Display for NotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "not found: {}", self.0)
    }
}

impl std::error::Error for NotFound {}

/// Map an error chain onto the documented exit codes.
fn exit_code_for(e: &anyhow::Error) -> i32 {
    if e.downcast_ref::<NotFound>().is_some() {
        return EXIT_NOT_FOUND;
    }

    if let Some(vault) = e.downcast_ref::<VaultError>() {
        return match vault {
            VaultError::DecryptionFailed { .. }
            | VaultError::EncryptionFailed { .. }
            | VaultError::KeyDerivationFailed { .. } => EXIT_CRYPTO,
            VaultError::MasterPasswordNotFound
            | VaultError::MasterPasswordStoreFailed { .. }
            | VaultError::KeychainUnavailable { .. }
            | VaultError::Persistence { .. } => EXIT_PERMISSION,
            _ => EXIT_FAILURE,
        };
    }

    if let Some(limiter) = e.downcast_ref::<LimiterError>() {
        return match limiter {
            LimiterError::Persistence { .. } => EXIT_PERMISSION,
            _ => EXIT_FAILURE,
        };
    }

    if e.downcast_ref::<AlertError>().is_some() {
        return EXIT_FAILURE;
    }

    EXIT_FAILURE
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_pairs_parse() {
        let parsed = parse_meta_pairs(&["owner=me".into(), "env=prod".into()]).unwrap();
        assert_eq!(parsed.get("owner").map(String::as_str), Some("me"));
        assert_eq!(parsed.len(), 2);

        assert!(parse_meta_pairs(&["malformed".into()]).is_err());
    }

    #[test]
    fn exit_codes_by_failure_class() {
        let crypto: anyhow::Error = VaultError::DecryptionFailed {
            reason: "bad key".into(),
        }
        .into();
        assert_eq!(exit_code_for(&crypto), EXIT_CRYPTO);

        let keychain: anyhow::Error = VaultError::MasterPasswordNotFound.into();
        assert_eq!(exit_code_for(&keychain), EXIT_PERMISSION);

        let missing = anyhow::Error::new(NotFound("vault entry x/y".into()));
        assert_eq!(exit_code_for(&missing), EXIT_NOT_FOUND);

        let generic = anyhow::anyhow!("something else");
        assert_eq!(exit_code_for(&generic), EXIT_FAILURE);
    }

    #[test]
    fn alert_log_reader_filters_by_window() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("alerts");
        std::fs::create_dir_all(&log_dir).unwrap();

        let now = chrono::Utc::now();
        let fresh = serde_json::json!({
            "timestamp": now.to_rfc3339(),
            "severity": "HIGH",
            "event_type": "sync_error",
            "message": "m",
            "app": "budget-sync",
        });
        let stale = serde_json::json!({
            "timestamp": (now - chrono::Duration::hours(48)).to_rfc3339(),
            "severity": "LOW",
            "event_type": "old",
            "message": "m",
            "app": "budget-sync",
        });
        std::fs::write(
            log_dir.join("alerts-2026-01-01.ndjson"),
            format!("{fresh}\n{stale}\nnot json\n"),
        )
        .unwrap();

        let events = read_alert_log(&log_dir, 24).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "sync_error");
    }

    #[test]
    fn missing_log_dir_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let events = read_alert_log(&dir.path().join("nope"), 24).unwrap();
        assert!(events.is_empty());
    }
}
