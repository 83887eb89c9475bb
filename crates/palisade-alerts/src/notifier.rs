//! Severity-routed alert fan-out.
//!
//! [`AlertNotifier`] turns a structured event into zero or more outbound
//! notifications. The severity → channel policy is fixed
//! ([`Severity::channels`]); each channel has its own dispatch budget and its
//! own failure domain — a dead SMTP server never blocks an SMS. Every event
//! is recorded in the in-process history and the day-partitioned NDJSON log
//! regardless of what the channels did.
//!
//! There is no retry queue. An alert dropped by a budget or a failing
//! transport is permanently missed unless the caller raises it again.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Duration, Utc};

use crate::budget::ChannelBudget;
use crate::error::Result;
use crate::event::{AlertEvent, Channel, Severity};
use crate::transport::{EmailTransport, LogMetricsSink, MetricsSink, SmsTransport};

/// Outcome of one channel's dispatch attempt.
enum Dispatch {
    /// The channel has no transport configured.
    Unconfigured,
    /// The channel's budget was exhausted; the alert was dropped there.
    Throttled,
    /// The transport accepted the notification.
    Sent,
    /// The transport failed; the error was logged and swallowed.
    Failed,
}

/// Aggregated view of recent alerts, from the in-process history.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AlertSummary {
    pub total: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_event_type: BTreeMap<String, usize>,
    pub by_app: BTreeMap<String, usize>,
}

struct EmailChannel {
    transport: Box<dyn EmailTransport>,
    to: String,
}

struct SmsChannel {
    transport: Box<dyn SmsTransport>,
    to: String,
}

struct Budgets {
    email: ChannelBudget,
    sms: ChannelBudget,
}

/// Severity-routed, budget-throttled alert dispatcher.
///
/// # Example
///
/// ```rust,no_run
/// use palisade_alerts::notifier::AlertNotifier;
/// use palisade_alerts::event::Severity;
/// use palisade_alerts::smtp::SmtpMailer;
///
/// # fn example() -> palisade_alerts::error::Result<()> {
/// let mailer = SmtpMailer::new("smtp.example.com", 465, "bot", "pw", "bot@example.com");
/// let notifier = AlertNotifier::new("data/alerts")?
///     .with_email(Box::new(mailer), "me@example.com");
///
/// notifier.send_alert(
///     Severity::High,
///     "sync_error",
///     "YNAB pull failed twice",
///     "budget-sync",
///     serde_json::Map::new(),
/// );
/// # Ok(())
/// # }
/// ```
pub struct AlertNotifier {
    email: Option<EmailChannel>,
    sms: Option<SmsChannel>,
    metrics: Box<dyn MetricsSink>,
    budgets: Mutex<Budgets>,
    history: Mutex<Vec<AlertEvent>>,
    log_dir: PathBuf,
}

impl AlertNotifier {
    /// Create a notifier writing its alert log under `log_dir` (created
    /// owner-only if missing). Starts with no email or SMS channel and the
    /// default [`LogMetricsSink`].
    pub fn new(log_dir: impl Into<PathBuf>) -> Result<Self> {
        let log_dir = log_dir.into();
        std::fs::create_dir_all(&log_dir)?;
        restrict_dir(&log_dir)?;

        Ok(Self {
            email: None,
            sms: None,
            metrics: Box::new(LogMetricsSink),
            budgets: Mutex::new(Budgets {
                email: ChannelBudget::email(),
                sms: ChannelBudget::sms(),
            }),
            history: Mutex::new(Vec::new()),
            log_dir,
        })
    }

    /// Enable the email channel.
    pub fn with_email(mut self, transport: Box<dyn EmailTransport>, to: impl Into<String>) -> Self {
        self.email = Some(EmailChannel {
            transport,
            to: to.into(),
        });
        self
    }

    /// Enable the SMS channel.
    pub fn with_sms(mut self, transport: Box<dyn SmsTransport>, to: impl Into<String>) -> Self {
        self.sms = Some(SmsChannel {
            transport,
            to: to.into(),
        });
        self
    }

    /// Replace the metrics sink (defaults to [`LogMetricsSink`]).
    pub fn with_metrics(mut self, sink: Box<dyn MetricsSink>) -> Self {
        self.metrics = sink;
        self
    }

    /// Dispatch an alert to every channel its severity routes to.
    ///
    /// Always records the event in history and the on-disk log, whatever the
    /// channels did. Returns `true` iff at least one channel delivered.
    pub fn send_alert(
        &self,
        severity: Severity,
        event_type: impl Into<String>,
        message: impl Into<String>,
        app: impl Into<String>,
        details: serde_json::Map<String, serde_json::Value>,
    ) -> bool {
        let event = AlertEvent::new(severity, event_type, message, app, details);
        let outcomes = self.dispatch(&event);
        self.record(&event);

        outcomes.iter().any(|(_, delivered)| *delivered)
    }

    /// Aggregate the in-process history over the last `hours` hours.
    pub fn get_alert_summary(&self, hours: i64) -> AlertSummary {
        let cutoff = Utc::now() - Duration::hours(hours);
        let history = self.lock_history();

        let mut summary = AlertSummary {
            total: 0,
            by_severity: BTreeMap::new(),
            by_event_type: BTreeMap::new(),
            by_app: BTreeMap::new(),
        };

        for event in history.iter().filter(|e| e.timestamp >= cutoff) {
            summary.total += 1;
            *summary
                .by_severity
                .entry(event.severity.as_str().to_string())
                .or_default() += 1;
            *summary
                .by_event_type
                .entry(event.event_type.clone())
                .or_default() += 1;
            *summary.by_app.entry(event.app.clone()).or_default() += 1;
        }

        summary
    }

    /// Send one synthetic [`Severity::Test`] alert through every configured
    /// channel and report per-channel success. Budgets are charged exactly as
    /// in production — the point is to exercise the real dispatch path.
    pub fn test_notifications(&self) -> Vec<(Channel, bool)> {
        let event = AlertEvent::new(
            Severity::Test,
            "notification_test",
            "Palisade notification smoke test",
            "palisade",
            serde_json::Map::new(),
        );
        let outcomes = self.dispatch(&event);
        self.record(&event);
        outcomes
    }

    // -- Internal helpers ---------------------------------------------------

    /// Run the policy fan-out. Returns the attempted channels and whether
    /// each delivered; unconfigured and throttled channels are absent.
    fn dispatch(&self, event: &AlertEvent) -> Vec<(Channel, bool)> {
        let mut outcomes = Vec::new();

        for channel in event.severity.channels() {
            match self.dispatch_channel(*channel, event) {
                Dispatch::Sent => outcomes.push((*channel, true)),
                Dispatch::Failed => outcomes.push((*channel, false)),
                Dispatch::Unconfigured | Dispatch::Throttled => {}
            }
        }

        outcomes
    }

    fn dispatch_channel(&self, channel: Channel, event: &AlertEvent) -> Dispatch {
        match channel {
            Channel::Email => {
                let Some(email) = &self.email else {
                    return Dispatch::Unconfigured;
                };
                if !self.lock_budgets().email.try_charge(Utc::now()) {
                    tracing::warn!(
                        event_type = %event.event_type,
                        "email budget exhausted, dropping alert on this channel"
                    );
                    return Dispatch::Throttled;
                }
                match email
                    .transport
                    .send(&email.to, &event.email_subject(), &event.email_body())
                {
                    Ok(()) => Dispatch::Sent,
                    Err(e) => {
                        tracing::error!(error = %e, "email channel failed");
                        Dispatch::Failed
                    }
                }
            }
            Channel::Sms => {
                let Some(sms) = &self.sms else {
                    return Dispatch::Unconfigured;
                };
                if !self.lock_budgets().sms.try_charge(Utc::now()) {
                    tracing::warn!(
                        event_type = %event.event_type,
                        "SMS budget exhausted, dropping alert on this channel"
                    );
                    return Dispatch::Throttled;
                }
                match sms.transport.send(&sms.to, &event.sms_text()) {
                    Ok(()) => Dispatch::Sent,
                    Err(e) => {
                        tracing::error!(error = %e, "SMS channel failed");
                        Dispatch::Failed
                    }
                }
            }
            Channel::Metrics => match self.metrics.record(event) {
                Ok(()) => Dispatch::Sent,
                Err(e) => {
                    tracing::error!(error = %e, "metrics channel failed");
                    Dispatch::Failed
                }
            },
        }
    }

    /// Append the event to history and the on-disk log. Log failures warn
    /// and are swallowed — recording must never mask the alert itself.
    fn record(&self, event: &AlertEvent) {
        self.lock_history().push(event.clone());

        if let Err(e) = self.append_log(event) {
            tracing::warn!(error = %e, "failed to append alert log");
        }
    }

    fn append_log(&self, event: &AlertEvent) -> Result<()> {
        let path = self.log_dir.join(format!(
            "alerts-{}.ndjson",
            event.timestamp.format("%Y-%m-%d")
        ));
        let created = !path.exists();

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        file.write_all(&line)?;

        if created {
            restrict_file(&path)?;
        }
        Ok(())
    }

    fn lock_budgets(&self) -> std::sync::MutexGuard<'_, Budgets> {
        self.budgets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, Vec<AlertEvent>> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Restrict a log file to owner read/write (0600).
fn restrict_file(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Restrict the log directory to owner access (0700).
fn restrict_dir(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
