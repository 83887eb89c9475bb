//! Collaborator interfaces for outbound channels.
//!
//! The notifier consumes transports, it does not implement delivery itself.
//! Each trait is the narrowest capability the core needs; production
//! implementations live in [`crate::smtp`] and [`crate::sms`], and tests
//! substitute recording fakes.

use crate::error::Result;
use crate::event::AlertEvent;

/// Sends one email. Implementations must be cheap to call repeatedly; the
/// notifier opens no long-lived connections.
pub trait EmailTransport: Send + Sync {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Sends one SMS message.
pub trait SmsTransport: Send + Sync {
    fn send(&self, to: &str, text: &str) -> Result<()>;
}

/// Records one alert event in a metrics/log backend.
pub trait MetricsSink: Send + Sync {
    fn record(&self, event: &AlertEvent) -> Result<()>;
}

/// Default metrics sink: emits one structured `tracing` event per alert
/// under the `palisade::metrics` target, for collection by whatever
/// subscriber the host process installs.
pub struct LogMetricsSink;

impl MetricsSink for LogMetricsSink {
    fn record(&self, event: &AlertEvent) -> Result<()> {
        tracing::info!(
            target: "palisade::metrics",
            severity = %event.severity,
            event_type = %event.event_type,
            app = %event.app,
            message = %event.message,
            "alert"
        );
        Ok(())
    }
}
