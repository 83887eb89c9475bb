//! Alert events and the severity → channel policy.
//!
//! An [`AlertEvent`] is created once, dispatched immediately, and never
//! mutated. Which channels it reaches is a fixed function of its severity —
//! the policy table lives in [`Severity::channels`] and nowhere else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How urgent an alert is. Determines the channel fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Page-worthy: email + SMS + metrics.
    Critical,
    /// Needs attention soon: email + metrics.
    High,
    /// Worth a dashboard line: metrics only.
    Medium,
    /// Recorded but not dispatched anywhere.
    Low,
    /// Synthetic severity used by the notification smoke test; routed to
    /// every channel so the test exercises the production dispatch path.
    Test,
}

impl Severity {
    /// The fixed set of channels this severity fans out to.
    pub fn channels(&self) -> &'static [Channel] {
        match self {
            Self::Critical | Self::Test => &[Channel::Email, Channel::Sms, Channel::Metrics],
            Self::High => &[Channel::Email, Channel::Metrics],
            Self::Medium => &[Channel::Metrics],
            Self::Low => &[],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Test => "TEST",
        }
    }

    /// Parse the wire/CLI spelling.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CRITICAL" => Some(Self::Critical),
            "HIGH" => Some(Self::High),
            "MEDIUM" => Some(Self::Medium),
            "LOW" => Some(Self::Low),
            "TEST" => Some(Self::Test),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    Metrics,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Metrics => "metrics",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One alert, as recorded in history and the on-disk log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    /// Machine-readable category (e.g. `auth_failure`, `sync_error`).
    pub event_type: String,
    /// Human-readable description.
    pub message: String,
    /// The automation job that raised the alert.
    pub app: String,
    /// Structured context for debugging.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl AlertEvent {
    /// Create an event stamped with the current time.
    pub fn new(
        severity: Severity,
        event_type: impl Into<String>,
        message: impl Into<String>,
        app: impl Into<String>,
        details: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            event_type: event_type.into(),
            message: message.into(),
            app: app.into(),
            details,
        }
    }

    /// Subject line used for the email channel.
    pub fn email_subject(&self) -> String {
        format!("[{}] {}: {}", self.severity, self.app, self.event_type)
    }

    /// Body used for the email channel: the message plus pretty-printed
    /// details when present.
    pub fn email_body(&self) -> String {
        if self.details.is_empty() {
            self.message.clone()
        } else {
            let details = serde_json::to_string_pretty(&self.details)
                .unwrap_or_else(|_| "<unserializable details>".into());
            format!("{}\n\nDetails:\n{}", self.message, details)
        }
    }

    /// Short single-line rendering used for the SMS channel.
    pub fn sms_text(&self) -> String {
        format!("[{}] {}: {}", self.severity, self.app, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_policy_table() {
        assert_eq!(
            Severity::Critical.channels(),
            &[Channel::Email, Channel::Sms, Channel::Metrics]
        );
        assert_eq!(Severity::High.channels(), &[Channel::Email, Channel::Metrics]);
        assert_eq!(Severity::Medium.channels(), &[Channel::Metrics]);
        assert!(Severity::Low.channels().is_empty());
        assert_eq!(Severity::Test.channels(), Severity::Critical.channels());
    }

    #[test]
    fn severity_wire_format() {
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"CRITICAL\"");
        assert_eq!(Severity::parse("high"), Some(Severity::High));
        assert_eq!(Severity::parse("nope"), None);
    }

    #[test]
    fn event_serializes_without_empty_details() {
        let event = AlertEvent::new(
            Severity::Medium,
            "sync_error",
            "YNAB pull failed",
            "budget-sync",
            serde_json::Map::new(),
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("details"));
        assert!(json.contains("\"MEDIUM\""));
    }

    #[test]
    fn email_rendering_includes_details() {
        let mut details = serde_json::Map::new();
        details.insert("status".into(), serde_json::json!(503));

        let event = AlertEvent::new(
            Severity::High,
            "api_down",
            "YNAB API unreachable",
            "budget-sync",
            details,
        );

        assert_eq!(event.email_subject(), "[HIGH] budget-sync: api_down");
        assert!(event.email_body().contains("503"));
        assert_eq!(event.sms_text(), "[HIGH] budget-sync: YNAB API unreachable");
    }
}
