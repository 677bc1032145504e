//! InfluxDB line-protocol metric sink.

use async_trait::async_trait;

use super::MetricSink;

pub struct InfluxSink {
    url: String,
    http: reqwest::Client,
}

impl InfluxSink {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MetricSink for InfluxSink {
    async fn record(&self, host: &str, measurement: &str, value: f64) -> anyhow::Result<()> {
        let line = format!("{},host={} value={}", measurement, host, value);
        self.http
            .post(&self.url)
            .header("Content-Type", "text/plain")
            .body(line)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
