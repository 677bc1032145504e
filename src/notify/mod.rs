//! Notification transports behind small trait seams, plus the gateway that
//! fans one alert out to every configured sink.

mod console;
mod metrics;
mod slack;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

pub use console::ConsoleSink;
pub use metrics::InfluxSink;
pub use slack::SlackSink;

use crate::config::AppConfig;
use crate::fleet::AlertNotification;

/// A transport that can deliver alert notifications.
///
/// `announce` carries plain configuration-change messages; transports that
/// only understand structured alerts keep the default no-op.
#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, note: &AlertNotification) -> anyhow::Result<()>;

    async fn announce(&self, _text: &str, _ok: bool) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Fire-and-forget time-series sink.
#[async_trait]
pub trait MetricSink: Send + Sync {
    async fn record(&self, host: &str, measurement: &str, value: f64) -> anyhow::Result<()>;
}

/// Fans alerts out to all transports and owns the metric sink.
pub struct NotifierGateway {
    sinks: Vec<Arc<dyn AlertSink>>,
    metrics: Arc<dyn MetricSink>,
}

impl NotifierGateway {
    pub fn new(sinks: Vec<Arc<dyn AlertSink>>, metrics: Arc<dyn MetricSink>) -> Self {
        Self { sinks, metrics }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        let sinks: Vec<Arc<dyn AlertSink>> = vec![
            Arc::new(SlackSink::new(&cfg.slack_webhook_url)),
            Arc::new(ConsoleSink::new(&cfg.console_url)),
        ];
        Self::new(sinks, Arc::new(InfluxSink::new(&cfg.influxdb_url)))
    }

    /// Deliver one alert to every transport concurrently.
    ///
    /// Returns true only when every transport succeeded; a partial failure
    /// leaves the alert state un-notified so the next tick retries.
    pub async fn dispatch(&self, note: &AlertNotification) -> bool {
        let attempts = self.sinks.iter().map(|sink| {
            let sink = sink.clone();
            async move { (sink.name(), sink.send(note).await) }
        });

        let mut all_ok = true;
        for (name, result) in join_all(attempts).await {
            if let Err(e) = result {
                warn!(sink = name, probe = %note.probe_name, "notification failed: {:#}", e);
                all_ok = false;
            }
        }
        all_ok
    }

    /// Best-effort announcement of a configuration change.
    pub async fn announce(&self, text: &str, ok: bool) {
        let attempts = self.sinks.iter().map(|sink| {
            let sink = sink.clone();
            async move { (sink.name(), sink.announce(text, ok).await) }
        });

        for (name, result) in join_all(attempts).await {
            if let Err(e) = result {
                warn!(sink = name, "announcement failed: {:#}", e);
            }
        }
    }

    /// Emit a response-time sample without blocking the check; failures are
    /// logged and never affect the check outcome.
    pub fn record_response_time(&self, probe_name: &str, value: Duration) {
        let metrics = self.metrics.clone();
        let probe_name = probe_name.to_string();
        tokio::spawn(async move {
            if let Err(e) = metrics
                .record(&probe_name, "response_time", value.as_secs_f64())
                .await
            {
                debug!(probe = %probe_name, "metric emission failed: {:#}", e);
            }
        });
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Records every call; optionally fails all sends.
    pub struct RecordingSink {
        pub fail: bool,
        pub sent: AtomicUsize,
        pub announced: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        pub fn new(fail: bool) -> Self {
            Self {
                fail,
                sent: AtomicUsize::new(0),
                announced: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn send(&self, _note: &AlertNotification) -> anyhow::Result<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("sink down");
            }
            Ok(())
        }

        async fn announce(&self, text: &str, _ok: bool) -> anyhow::Result<()> {
            self.announced.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    pub struct NullMetrics;

    #[async_trait]
    impl MetricSink for NullMetrics {
        async fn record(&self, _: &str, _: &str, _: f64) -> anyhow::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use chrono::Utc;

    use super::testing::{NullMetrics, RecordingSink};
    use super::*;
    use crate::fleet::{ConditionKind, Severity};

    fn note() -> AlertNotification {
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
            resolved: false,
        }
    }

    #[tokio::test]
    async fn dispatch_true_when_all_sinks_succeed() {
        let a = Arc::new(RecordingSink::new(false));
        let b = Arc::new(RecordingSink::new(false));
        let gateway =
            NotifierGateway::new(
            vec![a.clone() as Arc<dyn AlertSink>, b.clone() as Arc<dyn AlertSink>],
            Arc::new(NullMetrics),
        );

        assert!(gateway.dispatch(&note()).await);
        assert_eq!(a.sent.load(Ordering::SeqCst), 1);
        assert_eq!(b.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispatch_false_on_partial_failure() {
        let ok = Arc::new(RecordingSink::new(false));
        let bad = Arc::new(RecordingSink::new(true));
        let gateway =
            NotifierGateway::new(
            vec![ok.clone() as Arc<dyn AlertSink>, bad.clone() as Arc<dyn AlertSink>],
            Arc::new(NullMetrics),
        );

        assert!(!gateway.dispatch(&note()).await);
        // Both sinks were still attempted.
        assert_eq!(ok.sent.load(Ordering::SeqCst), 1);
        assert_eq!(bad.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn announce_reaches_sinks() {
        let sink = Arc::new(RecordingSink::new(false));
        let gateway = NotifierGateway::new(vec![sink.clone() as Arc<dyn AlertSink>], Arc::new(NullMetrics));

        gateway.announce("probe shop updated", true).await;
        assert_eq!(
            sink.announced.lock().unwrap().as_slice(),
            ["probe shop updated"]
        );
    }
}
