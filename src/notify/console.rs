//! Ops-console transport: structured form POST consumed by the on-call
//! ticketing endpoint.

use async_trait::async_trait;
use chrono::Utc;

use super::AlertSink;
use crate::fleet::AlertNotification;

const SOURCE_TAG: &str = "sitewatch - prod";
const TIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

pub struct ConsoleSink {
    endpoint: String,
    http: reqwest::Client,
}

impl ConsoleSink {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            http: reqwest::Client::new(),
        }
    }
}

fn state_tag(note: &AlertNotification) -> &'static str {
    if note.resolved {
        "GOOD"
    } else {
        "BAD"
    }
}

fn subject(note: &AlertNotification) -> String {
    format!(
        "[{}] {} (web {})\n",
        state_tag(note),
        note.subject,
        note.probe_url
    )
}

fn details(note: &AlertNotification) -> String {
    let ringing = if note.resolved { "no more" } else { "is" };
    let mut out = format!("An alert **{}** ringing. \n\n", ringing);
    out.push_str(&format!(
        "Failure time: {}\n",
        note.since.format(TIME_FMT)
    ));
    if note.resolved {
        out.push_str(&format!(
            "Resolved time: {}\n",
            Utc::now().format(TIME_FMT)
        ));
    } else {
        out.push_str(&format!(
            "Next check time: {}\n",
            note.next_due.format(TIME_FMT)
        ));
    }
    out.push_str(&format!("Class(es): {}\n", note.severity));
    out.push_str(&format!("Error was: {}", note.detail));
    out
}

#[async_trait]
impl AlertSink for ConsoleSink {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn send(&self, note: &AlertNotification) -> anyhow::Result<()> {
        let params = [
            ("type", state_tag(note).to_string()),
            ("subject", subject(note)),
            ("details", details(note)),
            ("classes", note.severity.to_string()),
            ("hostname", note.probe_url.clone()),
            ("srv", SOURCE_TAG.to_string()),
            ("uniqueid", note.alert_id.clone()),
            ("datetime", Utc::now().to_rfc3339()),
        ];

        self.http
            .post(&self.endpoint)
            .form(&params)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::{ConditionKind, Severity};

    fn note(resolved: bool) -> AlertNotification {
        AlertNotification {
            alert_id: "a1".into(),
            probe_key: "shop".into(),
            probe_name: "shop".into(),
            probe_url: "https://shop.example.com/".into(),
            kind: ConditionKind::ServerError,
            severity: Severity::Critical,
            subject: "server error".into(),
            detail: "response code: 500".into(),
            since: Utc::now(),
            next_due: Utc::now(),
            resolved,
        }
    }

    #[test]
    fn subject_carries_state_and_url() {
        assert!(subject(&note(false)).starts_with("[BAD] server error (web https://"));
        assert!(subject(&note(true)).starts_with("[GOOD] server error (web https://"));
    }

    #[test]
    fn details_mention_resolution_only_when_resolved() {
        let active = details(&note(false));
        assert!(active.contains("Next check time:"));
        assert!(!active.contains("Resolved time:"));

        let resolved = details(&note(true));
        assert!(resolved.contains("Resolved time:"));
        assert!(resolved.contains("no more"));
    }
}
