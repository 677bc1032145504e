//! Slack incoming-webhook transport.

use async_trait::async_trait;

use super::AlertSink;
use crate::fleet::AlertNotification;

pub struct SlackSink {
    webhook_url: String,
    http: reqwest::Client,
}

impl SlackSink {
    pub fn new(webhook_url: &str) -> Self {
        Self {
            webhook_url: webhook_url.to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn post(&self, text: &str, resolved: bool) -> anyhow::Result<()> {
        let mark = if resolved {
            ":heavy_check_mark:"
        } else {
            ":exclamation:"
        };
        let payload = serde_json::json!({ "text": format!("{} {}", mark, text) });

        self.http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl AlertSink for SlackSink {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn send(&self, note: &AlertNotification) -> anyhow::Result<()> {
        self.post(&note.headline(), note.resolved).await
    }

    async fn announce(&self, text: &str, ok: bool) -> anyhow::Result<()> {
        self.post(text, ok).await
    }
}
