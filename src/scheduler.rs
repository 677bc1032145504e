//! Scheduler: the control loop that dispatches due probe checks.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info};

use crate::checker;
use crate::fleet::{FleetRegistry, Probe};
use crate::notify::NotifierGateway;

/// Run the tick loop forever.
///
/// Each tick snapshots the due probes and spawns one task per check, spaced
/// by an even share of the stagger budget so a large fleet does not fire a
/// thundering herd. The loop never waits for checks to finish.
pub async fn run(
    registry: Arc<FleetRegistry>,
    gateway: Arc<NotifierGateway>,
    tick_interval: Duration,
    stagger_budget: Duration,
) {
    info!(tick_secs = tick_interval.as_secs(), "scheduler started");

    loop {
        let due = registry.scan_due(Utc::now()).await;
        if !due.is_empty() {
            debug!(count = due.len(), "dispatching due probe checks");
            let pause = stagger_pause(stagger_budget, due.len());
            for probe in due {
                let registry = registry.clone();
                let gateway = gateway.clone();
                tokio::spawn(async move {
                    run_check(registry, gateway, probe).await;
                });
                tokio::time::sleep(pause).await;
            }
        }
        tokio::time::sleep(tick_interval).await;
    }
}

/// Even share of the stagger budget for a batch of the given size.
fn stagger_pause(budget: Duration, batch: usize) -> Duration {
    budget / batch.max(1) as u32
}

/// One complete check cycle for one probe: advance next-due first (a hanging
/// check must not postpone future scheduling), fetch, feed the alert state
/// machine, notify, purge confirmed resolutions, record the duration.
async fn run_check(registry: Arc<FleetRegistry>, gateway: Arc<NotifierGateway>, probe: Probe) {
    registry.advance_next_due(&probe.key, Utc::now()).await;

    let result = checker::execute(&probe, &gateway).await;
    info!(
        probe = %probe.name,
        code = ?result.http_code,
        elapsed_ms = result.elapsed.as_millis() as u64,
        failing = result.failures.len(),
        "probe check completed"
    );

    let pending = registry.apply_result(&probe.key, &result).await;

    let attempts = pending.into_iter().map(|note| {
        let gateway = gateway.clone();
        async move {
            let ok = gateway.dispatch(&note).await;
            (note, ok)
        }
    });
    for (note, ok) in join_all(attempts).await {
        if ok {
            registry
                .mark_notified(&note.probe_key, note.kind, &note.alert_id)
                .await;
        }
    }

    // Resolved states leave the map only after their notification attempt.
    registry.purge_resolved(&probe.key).await;
    // The duration history tracks the fetch itself, not notification time.
    registry.record_duration(&probe.key, result.elapsed).await;
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::config::ProbeDefinition;
    use crate::fleet::AlertNotification;
    use crate::notify::testing::NullMetrics;
    use crate::notify::AlertSink;

    #[test]
    fn stagger_divides_budget_evenly() {
        assert_eq!(
            stagger_pause(Duration::from_millis(100), 4),
            Duration::from_millis(25)
        );
        assert_eq!(
            stagger_pause(Duration::from_millis(100), 0),
            Duration::from_millis(100)
        );
    }

    struct SlowSink;

    #[async_trait]
    impl AlertSink for SlowSink {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn send(&self, _note: &AlertNotification) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn duration_history_excludes_notification_time() {
        let registry = Arc::new(FleetRegistry::new());
        registry
            .upsert(
                "down",
                &ProbeDefinition {
                    name: "down".to_string(),
                    // Discard port: the connection is refused immediately.
                    url: "http://127.0.0.1:9/".to_string(),
                    search: "OK".to_string(),
                    timeout: Duration::from_secs(1),
                    warn_time: Duration::from_secs(2),
                    delay: Duration::from_secs(60),
                    index: true,
                    retention_warning: None,
                    retention_critical: None,
                },
            )
            .await
            .unwrap();
        let gateway = Arc::new(NotifierGateway::new(
            vec![Arc::new(SlowSink) as Arc<dyn AlertSink>],
            Arc::new(NullMetrics),
        ));

        let probe = registry.scan_due(Utc::now()).await.remove(0);
        run_check(registry.clone(), gateway, probe).await;

        let later = Utc::now() + chrono::Duration::seconds(120);
        let probe = registry.scan_due(later).await.remove(0);
        assert_eq!(probe.recent_durations.len(), 1);
        // The fetch errors out within its 1s timeout; the sink's 2s delivery
        // must not show up in the recorded duration.
        assert!(probe.recent_durations[0] < Duration::from_secs(2));
    }
}
