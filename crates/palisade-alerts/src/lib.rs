//! Severity-routed alert fan-out for Palisade.
//!
//! Turns a structured event into zero or more outbound notifications —
//! email, SMS, and a metrics/log sink — according to a fixed severity
//! policy, with per-channel dispatch budgets and an append-only alert log.
//! Channels are independent and best-effort: one transport's failure never
//! blocks another, and there is no retry queue.
//!
//! # Modules
//!
//! - [`event`] — alert events, severities, and the channel policy table.
//! - [`notifier`] — the dispatcher: fan-out, budgets, history, log.
//! - [`budget`] — fixed-window per-channel counters.
//! - [`transport`] — collaborator traits and the default metrics sink.
//! - [`smtp`] — minimal SMTP-over-TLS email transport.
//! - [`sms`] — webhook-based SMS transport.
//! - [`error`] — unified error types.

pub mod budget;
pub mod error;
pub mod event;
pub mod notifier;
pub mod sms;
pub mod smtp;
pub mod transport;

// Re-export the most commonly used types at the crate root.
pub use error::{AlertError, Result};
pub use event::{AlertEvent, Channel, Severity};
pub use notifier::{AlertNotifier, AlertSummary};
pub use sms::WebhookSms;
pub use smtp::SmtpMailer;
pub use transport::{EmailTransport, LogMetricsSink, MetricsSink, SmsTransport};
