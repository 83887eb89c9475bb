//! Webhook-based SMS transport.
//!
//! Posts one JSON document per message to a programmable-messaging webhook
//! (Twilio-style relay, self-hosted gateway, whatever the deployment wires
//! in). The notifier neither knows nor cares which provider answers — a 2xx
//! means delivered-enough.

use std::time::Duration;

use crate::error::{AlertError, Result};
use crate::transport::SmsTransport;

/// Request timeout for the webhook call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// SMS transport that POSTs `{ "to": ..., "message": ... }` to a webhook URL.
pub struct WebhookSms {
    url: String,
    http: reqwest::blocking::Client,
}

impl WebhookSms {
    /// Create a transport targeting the given webhook URL.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(concat!("palisade/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AlertError::Transport {
                channel: "sms".into(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            url: url.into(),
            http,
        })
    }
}

impl SmsTransport for WebhookSms {
    fn send(&self, to: &str, text: &str) -> Result<()> {
        tracing::debug!(to = to, "sending alert SMS via webhook");

        let response = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({
                "to": to,
                "message": text,
            }))
            .send()
            .map_err(|e| AlertError::Transport {
                channel: "sms".into(),
                reason: format!("webhook request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AlertError::Transport {
                channel: "sms".into(),
                reason: format!("webhook returned {status}"),
            });
        }

        tracing::info!(to = to, "alert SMS accepted by webhook");
        Ok(())
    }
}
