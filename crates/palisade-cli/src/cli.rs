//! CLI argument definitions for Palisade.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use palisade_ratelimit::Period;

/// Palisade — shared security foundation for personal-automation jobs.
#[derive(Parser)]
#[command(
    name = "palisade",
    version,
    about = "Palisade — credential vault, rate limiter, and alert utilities",
    long_about = "Developer utilities over the Palisade security foundation: an encrypted \
                  credential vault with rotation tracking, a persistent token-bucket rate \
                  limiter, and a severity-routed alert notifier."
)]
pub struct Cli {
    /// Data directory (default: $PALISADE_DATA_DIR, else ~/.palisade).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage vault credentials.
    Creds {
        #[command(subcommand)]
        action: CredsAction,
    },

    /// Manage rate limits.
    Limits {
        #[command(subcommand)]
        action: LimitsAction,
    },

    /// Exercise and inspect the alert notifier.
    Alerts {
        #[command(subcommand)]
        action: AlertsAction,
    },
}

/// Actions for managing vault credentials.
#[derive(Subcommand)]
pub enum CredsAction {
    /// Store (or overwrite) a credential.
    Store {
        /// Service namespace (e.g. "gmail", "ynab").
        #[arg(long)]
        service: String,
        /// Key within the service (e.g. "oauth_token").
        #[arg(long)]
        key: String,
        /// The secret value.
        #[arg(long)]
        value: String,
        /// Days until the credential should be rotated.
        #[arg(long, default_value_t = palisade_vault::DEFAULT_ROTATION_DAYS)]
        rotate_days: u32,
        /// Free-form annotations as k=v pairs (repeatable).
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
    },

    /// Print a credential's decrypted value.
    Get {
        #[arg(long)]
        service: String,
        #[arg(long)]
        key: String,
    },

    /// List stored credentials (values are never shown).
    List,

    /// Show credentials past their rotation deadline.
    CheckRotation,

    /// Import a KEY=value flat file into a service namespace, then retire it.
    Migrate {
        /// Path to the flat credentials file.
        #[arg(long)]
        file: PathBuf,
        /// Service namespace to import into.
        #[arg(long)]
        service: String,
    },

    /// Re-check and repair owner-only permissions on vault files.
    Validate,
}

/// Actions for managing rate limits.
#[derive(Subcommand)]
pub enum LimitsAction {
    /// Configure a single limit, or apply a whole application profile.
    Configure {
        /// Bucket key (e.g. "email_send"). Mutually exclusive with --app.
        #[arg(long, conflicts_with = "app", required_unless_present = "app")]
        key: Option<String>,
        /// Maximum tokens (burst size).
        #[arg(long, requires = "key")]
        capacity: Option<f64>,
        /// Tokens refilled per period.
        #[arg(long, requires = "key")]
        rate: Option<f64>,
        /// Refill period: second, minute, hour, or day.
        #[arg(long, default_value = "second", value_parser = parse_period)]
        period: Period,
        /// Apply the fixed preset profile for this application instead.
        #[arg(long)]
        app: Option<String>,
    },

    /// Try to consume tokens from a bucket.
    Test {
        #[arg(long)]
        key: String,
        /// Tokens to consume.
        #[arg(long, default_value_t = 1.0)]
        tokens: f64,
        /// Block up to this many seconds for tokens to accumulate.
        #[arg(long)]
        wait_secs: Option<u64>,
    },

    /// Show utilization for every configured bucket.
    Status,

    /// Reset a bucket to full capacity.
    Reset {
        #[arg(long)]
        key: String,
    },
}

/// Actions for the alert notifier.
#[derive(Subcommand)]
pub enum AlertsAction {
    /// Send a synthetic test alert through every configured channel.
    Test,

    /// Summarize recent alerts from the on-disk log.
    Summary {
        /// Lookback window in hours.
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
}

fn parse_period(s: &str) -> Result<Period, String> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_creds_store() {
        let cli = Cli::parse_from([
            "palisade", "creds", "store", "--service", "ynab", "--key", "api_key", "--value",
            "abc123", "--rotate-days", "90", "--meta", "owner=budget-sync",
        ]);
        match cli.command {
            Commands::Creds {
                action:
                    CredsAction::Store {
                        service,
                        key,
                        rotate_days,
                        meta,
                        ..
                    },
            } => {
                assert_eq!(service, "ynab");
                assert_eq!(key, "api_key");
                assert_eq!(rotate_days, 90);
                assert_eq!(meta, vec!["owner=budget-sync"]);
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn configure_requires_key_or_app() {
        assert!(Cli::try_parse_from(["palisade", "limits", "configure"]).is_err());
        assert!(
            Cli::try_parse_from(["palisade", "limits", "configure", "--app", "email-digest"])
                .is_ok()
        );
        assert!(Cli::try_parse_from([
            "palisade",
            "limits",
            "configure",
            "--key",
            "x",
            "--capacity",
            "10",
            "--rate",
            "1",
            "--period",
            "minute",
        ])
        .is_ok());
    }
}
