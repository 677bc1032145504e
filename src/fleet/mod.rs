//! Fleet registry: the single owner of all probe records, guarded for
//! concurrent access by the scheduler and the directory watcher.

pub mod alerts;
pub mod probe;

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::warn;

pub use alerts::{AlertNotification, AlertState, ConditionKind, Severity};
pub use probe::Probe;

use crate::checker::CheckResult;
use crate::config::{self, ProbeDefinition};

/// Result of an upsert, used by the watcher to decide what to announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Thread-safe mapping from probe key to probe record.
///
/// All mutation goes through this type; the lock is held for the duration of
/// the mutation only, never across network I/O.
pub struct FleetRegistry {
    probes: RwLock<HashMap<String, Probe>>,
}

impl FleetRegistry {
    pub fn new() -> Self {
        Self {
            probes: RwLock::new(HashMap::new()),
        }
    }

    /// Bulk initial population from a directory of TOML files, replacing any
    /// existing content. An unreadable directory is fatal; a single bad or
    /// conflicting file is logged and skipped so the rest of the fleet loads.
    pub async fn load(&self, dir: &Path) -> anyhow::Result<usize> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("cannot read probe directory {}", dir.display()))?;

        let mut loaded: HashMap<String, Probe> = HashMap::new();
        let mut paths: Vec<_> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        for path in paths {
            let (key, def) = match config::load_definition(&path) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(file = %path.display(), "skipping probe definition: {:#}", e);
                    continue;
                }
            };
            if let Some(other) = find_conflict(&loaded, &key, &def) {
                warn!(
                    file = %path.display(),
                    conflicts_with = %other,
                    "skipping probe definition: duplicate name or url"
                );
                continue;
            }
            loaded.insert(key.clone(), Probe::from_definition(key, &def));
        }

        let count = loaded.len();
        *self.probes.write().await = loaded;
        Ok(count)
    }

    /// Insert a new probe or update an existing one in place.
    ///
    /// Rejects definitions whose name or URL collides with a different
    /// existing probe. Returns whether anything actually changed, so callers
    /// can decide whether a "configuration updated" announcement is due.
    pub async fn upsert(&self, key: &str, def: &ProbeDefinition) -> anyhow::Result<UpsertOutcome> {
        let mut probes = self.probes.write().await;

        if let Some(other) = find_conflict(&probes, key, def) {
            bail!(
                "probe {:?} rejected: name or url collides with existing probe {:?}",
                def.name,
                other
            );
        }

        match probes.get_mut(key) {
            Some(probe) => {
                if probe.apply_definition(def) {
                    Ok(UpsertOutcome::Updated)
                } else {
                    Ok(UpsertOutcome::Unchanged)
                }
            }
            None => {
                probes.insert(key.to_string(), Probe::from_definition(key, def));
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    /// Remove a probe, returning its display name when it existed.
    pub async fn remove(&self, key: &str) -> Option<String> {
        self.probes.write().await.remove(key).map(|p| p.name)
    }

    pub async fn keys(&self) -> Vec<String> {
        self.probes.read().await.keys().cloned().collect()
    }

    pub async fn names(&self) -> Vec<String> {
        let probes = self.probes.read().await;
        let mut names: Vec<_> = probes.values().map(|p| p.name.clone()).collect();
        names.sort();
        names
    }

    /// Snapshot every probe whose next-due timestamp has passed, ordered by
    /// key. Does not mutate next-due; that happens when the check dispatches.
    pub async fn scan_due(&self, now: DateTime<Utc>) -> Vec<Probe> {
        let probes = self.probes.read().await;
        let mut due: Vec<_> = probes
            .values()
            .filter(|p| p.next_due <= now)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.key.cmp(&b.key));
        due
    }

    /// Push the probe's next-due timestamp one delay into the future. Called
    /// before the check's network I/O so a hanging check cannot postpone
    /// future scheduling.
    pub async fn advance_next_due(&self, key: &str, now: DateTime<Utc>) {
        let mut probes = self.probes.write().await;
        if let Some(probe) = probes.get_mut(key) {
            let delay = chrono::Duration::from_std(probe.delay)
                .unwrap_or_else(|_| chrono::Duration::seconds(60));
            probe.next_due = now + delay;
        }
    }

    /// Feed one check's outcomes into the probe's alert states and sweep for
    /// notification-eligible states.
    ///
    /// Returns value snapshots for every eligible state; dispatching them is
    /// the caller's job, outside this lock.
    pub async fn apply_result(&self, key: &str, result: &CheckResult) -> Vec<AlertNotification> {
        let mut probes = self.probes.write().await;
        let Some(probe) = probes.get_mut(key) else {
            // Probe was removed while its check was in flight.
            return Vec::new();
        };

        if let Some(code) = result.http_code {
            probe.last_http_code = Some(code);
        }
        probe.last_latency = Some(result.elapsed);

        for failure in &result.failures {
            probe.declare(
                failure.kind,
                failure.severity,
                &failure.message,
                &failure.subject,
            );
        }
        for kind in &result.resolved {
            probe.declare_resolved(*kind);
        }

        let mut pending: Vec<_> = probe
            .alerts
            .values()
            .filter(|state| state.can_notify())
            .map(|state| AlertNotification {
                alert_id: state.id().to_string(),
                probe_key: probe.key.clone(),
                probe_name: probe.name.clone(),
                probe_url: probe.url.clone(),
                kind: state.kind,
                severity: state.severity,
                subject: state.subject.clone(),
                detail: state.message.clone(),
                since: state.since,
                next_due: probe.next_due,
                resolved: state.is_resolved(),
            })
            .collect();
        pending.sort_by_key(|n| n.kind.as_str());
        pending
    }

    /// Mark one alert state as notified. A no-op when the state is gone or
    /// has been recreated for a new episode.
    pub async fn mark_notified(&self, key: &str, kind: ConditionKind, alert_id: &str) {
        let mut probes = self.probes.write().await;
        if let Some(state) = probes.get_mut(key).and_then(|p| p.alerts.get_mut(&kind)) {
            if state.id() == alert_id {
                state.set_notified();
            }
        }
    }

    /// Drop every alert state whose resolution has been confirmed. Runs
    /// strictly after the sweep's notification attempt.
    pub async fn purge_resolved(&self, key: &str) {
        let mut probes = self.probes.write().await;
        if let Some(probe) = probes.get_mut(key) {
            probe.alerts.retain(|_, state| !state.is_resolved());
        }
    }

    pub async fn record_duration(&self, key: &str, duration: Duration) {
        let mut probes = self.probes.write().await;
        if let Some(probe) = probes.get_mut(key) {
            probe.record_duration(duration);
        }
    }

    /// Human-readable dump of every probe's current status, for operator
    /// introspection via SIGUSR1.
    pub async fn status_report(&self) -> String {
        let probes = self.probes.read().await;
        let mut sorted: Vec<_> = probes.values().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));

        let mut out = String::from("monitored probes:\n");
        for probe in sorted {
            let _ = writeln!(out, "{}", "-".repeat(60));
            let _ = writeln!(out, "{} url: {}", probe.name, probe.url);
            let _ = writeln!(
                out,
                "last http code: {}",
                probe
                    .last_http_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "-".into())
            );
            let _ = writeln!(
                out,
                "last latency: {}",
                probe
                    .last_latency
                    .map(|d| format!("{:?}", d))
                    .unwrap_or_else(|| "-".into())
            );
            let _ = writeln!(out, "next due: {}", probe.next_due.format("%Y-%m-%d %H:%M:%S"));
            let _ = writeln!(out, "recent check durations: {:?}", probe.recent_durations);
            if !probe.alerts.is_empty() {
                let _ = writeln!(out, "active conditions:");
                for state in probe.alerts.values() {
                    let _ = writeln!(
                        out,
                        "  {} - {}: failing={} resolving={} notified={}",
                        state.kind,
                        state.severity,
                        state.failing_count,
                        state.resolving_count,
                        state.notified
                    );
                }
            }
        }
        out
    }
}

fn find_conflict(probes: &HashMap<String, Probe>, key: &str, def: &ProbeDefinition) -> Option<String> {
    probes
        .values()
        .find(|p| p.key != key && (p.name == def.name || p.url == def.url))
        .map(|p| p.key.clone())
}
