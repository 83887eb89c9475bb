//! Integration tests for the palisade-alerts crate.
//!
//! These exercise the notifier through its public surface with fake
//! transports: the full severity matrix, channel independence under
//! failure, budget throttling, and the on-disk alert log.

use std::path::Path;
use std::sync::{Arc, Mutex};

use palisade_alerts::notifier::AlertNotifier;
use palisade_alerts::{AlertError, AlertEvent, Channel, EmailTransport, Severity, SmsTransport};

#[derive(Default)]
struct FakeEmail {
    sent: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl EmailTransport for FakeEmail {
    fn send(&self, _to: &str, subject: &str, _body: &str) -> palisade_alerts::Result<()> {
        if self.fail {
            return Err(AlertError::Transport {
                channel: "email".into(),
                reason: "forced failure".into(),
            });
        }
        self.sent.lock().unwrap().push(subject.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct FakeSms {
    sent: Arc<Mutex<Vec<String>>>,
}

impl SmsTransport for FakeSms {
    fn send(&self, _to: &str, text: &str) -> palisade_alerts::Result<()> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

fn full_notifier(dir: &Path) -> (AlertNotifier, Arc<Mutex<Vec<String>>>, Arc<Mutex<Vec<String>>>) {
    let emails = Arc::new(Mutex::new(Vec::new()));
    let texts = Arc::new(Mutex::new(Vec::new()));
    let n = AlertNotifier::new(dir.join("alerts"))
        .unwrap()
        .with_email(
            Box::new(FakeEmail {
                sent: emails.clone(),
                fail: false,
            }),
            "me@example.com",
        )
        .with_sms(Box::new(FakeSms { sent: texts.clone() }), "+15550100");
    (n, emails, texts)
}

#[test]
fn severity_matrix_routes_as_documented() {
    let dir = tempfile::tempdir().unwrap();
    let (n, emails, texts) = full_notifier(dir.path());

    // LOW: recorded, dispatched nowhere, reported undelivered.
    assert!(!n.send_alert(Severity::Low, "t", "m", "a", serde_json::Map::new()));
    assert_eq!(emails.lock().unwrap().len(), 0);
    assert_eq!(texts.lock().unwrap().len(), 0);

    // MEDIUM: metrics only — delivered, but neither email nor SMS moved.
    assert!(n.send_alert(Severity::Medium, "t", "m", "a", serde_json::Map::new()));
    assert_eq!(emails.lock().unwrap().len(), 0);

    // HIGH: email + metrics.
    assert!(n.send_alert(Severity::High, "t", "m", "a", serde_json::Map::new()));
    assert_eq!(emails.lock().unwrap().len(), 1);
    assert_eq!(texts.lock().unwrap().len(), 0);

    // CRITICAL: email + SMS + metrics.
    assert!(n.send_alert(Severity::Critical, "t", "m", "a", serde_json::Map::new()));
    assert_eq!(emails.lock().unwrap().len(), 2);
    assert_eq!(texts.lock().unwrap().len(), 1);

    // Everything, delivered or not, is in the history.
    assert_eq!(n.get_alert_summary(1).total, 4);
}

#[test]
fn email_failure_leaves_sms_and_metrics_alive() {
    let dir = tempfile::tempdir().unwrap();
    let texts = Arc::new(Mutex::new(Vec::new()));
    let n = AlertNotifier::new(dir.path().join("alerts"))
        .unwrap()
        .with_email(
            Box::new(FakeEmail {
                sent: Arc::default(),
                fail: true,
            }),
            "me@example.com",
        )
        .with_sms(Box::new(FakeSms { sent: texts.clone() }), "+15550100");

    assert!(n.send_alert(
        Severity::Critical,
        "auth_failure",
        "SMTP credentials expired",
        "email-digest",
        serde_json::Map::new(),
    ));
    assert_eq!(texts.lock().unwrap().len(), 1);
}

#[test]
fn unconfigured_notifier_still_records_and_reports_metrics_delivery() {
    let dir = tempfile::tempdir().unwrap();
    let n = AlertNotifier::new(dir.path().join("alerts")).unwrap();

    // CRITICAL with no email/SMS configured: only metrics attempts, and the
    // default tracing sink always succeeds.
    assert!(n.send_alert(
        Severity::Critical,
        "t",
        "m",
        "a",
        serde_json::Map::new()
    ));

    let outcomes = n.test_notifications();
    assert_eq!(outcomes, vec![(Channel::Metrics, true)]);
}

#[test]
fn email_budget_drops_the_eleventh_email_in_an_hour() {
    let dir = tempfile::tempdir().unwrap();
    let (n, emails, _) = full_notifier(dir.path());

    for i in 0..12 {
        n.send_alert(
            Severity::High,
            "flood",
            format!("alert {i}"),
            "tests",
            serde_json::Map::new(),
        );
    }

    // 10 per hour; the rest were dropped on the email channel.
    assert_eq!(emails.lock().unwrap().len(), 10);
    // The dropped ones still counted toward history.
    assert_eq!(n.get_alert_summary(1).total, 12);
}

#[test]
fn alert_log_lines_parse_back_into_events() {
    let dir = tempfile::tempdir().unwrap();
    let (n, _, _) = full_notifier(dir.path());

    let mut details = serde_json::Map::new();
    details.insert("attempt".into(), serde_json::json!(3));
    n.send_alert(Severity::High, "retry_exhausted", "gave up", "toggl-sync", details);

    let log = dir.path().join("alerts").join(format!(
        "alerts-{}.ndjson",
        chrono::Utc::now().format("%Y-%m-%d")
    ));
    let contents = std::fs::read_to_string(&log).unwrap();
    let events: Vec<AlertEvent> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].app, "toggl-sync");
    assert_eq!(events[0].details["attempt"], serde_json::json!(3));
}
