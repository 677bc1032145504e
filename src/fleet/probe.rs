//! Probe records: configured check policy plus mutable runtime state.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::alerts::{AlertState, ConditionKind, Severity};
use crate::config::ProbeDefinition;

/// Most recent check durations kept per probe.
const DURATION_HISTORY: usize = 5;

/// One monitored endpoint with its check policy and runtime state.
///
/// The `key` is the probe's stable identity (the definition file's stem),
/// deliberately decoupled from the file path so storage layout changes do not
/// corrupt identity.
#[derive(Debug, Clone)]
pub struct Probe {
    pub key: String,
    pub name: String,
    pub url: String,
    pub search: String,
    pub timeout: Duration,
    pub warn_time: Duration,
    pub delay: Duration,
    pub index_expected: bool,
    pub warning_threshold: u32,
    pub critical_threshold: u32,

    pub next_due: DateTime<Utc>,
    pub last_http_code: Option<u16>,
    pub last_latency: Option<Duration>,
    pub recent_durations: VecDeque<Duration>,
    pub alerts: HashMap<ConditionKind, AlertState>,
}

impl Probe {
    pub fn from_definition(key: impl Into<String>, def: &ProbeDefinition) -> Self {
        Self {
            key: key.into(),
            name: def.name.clone(),
            url: def.url.clone(),
            search: def.search.clone(),
            timeout: def.timeout,
            warn_time: def.warn_time,
            delay: def.delay,
            index_expected: def.index,
            warning_threshold: def.warning_threshold(),
            critical_threshold: def.critical_threshold(),
            next_due: Utc::now(),
            last_http_code: None,
            last_latency: None,
            recent_durations: VecDeque::with_capacity(DURATION_HISTORY),
            alerts: HashMap::new(),
        }
    }

    /// Overwrite configured fields from a fresh definition, only when at
    /// least one of them differs. Runtime state (next-due, alert map,
    /// duration history) is always preserved.
    pub fn apply_definition(&mut self, def: &ProbeDefinition) -> bool {
        let changed = self.name != def.name
            || self.url != def.url
            || self.search != def.search
            || self.timeout != def.timeout
            || self.warn_time != def.warn_time
            || self.delay != def.delay
            || self.index_expected != def.index
            || self.warning_threshold != def.warning_threshold()
            || self.critical_threshold != def.critical_threshold();

        if changed {
            self.name = def.name.clone();
            self.url = def.url.clone();
            self.search = def.search.clone();
            self.timeout = def.timeout;
            self.warn_time = def.warn_time;
            self.delay = def.delay;
            self.index_expected = def.index;
            self.warning_threshold = def.warning_threshold();
            self.critical_threshold = def.critical_threshold();
        }

        changed
    }

    pub fn threshold_for(&self, severity: Severity) -> u32 {
        match severity {
            Severity::Warning => self.warning_threshold,
            Severity::Critical => self.critical_threshold,
        }
    }

    /// Record a failing evaluation of one condition kind: create the alert
    /// state on first failure, otherwise bump its counter.
    pub fn declare(
        &mut self,
        kind: ConditionKind,
        severity: Severity,
        message: &str,
        subject: &str,
    ) {
        match self.alerts.get_mut(&kind) {
            Some(state) => state.record_failure(),
            None => {
                let threshold = self.threshold_for(severity);
                self.alerts
                    .insert(kind, AlertState::new(kind, severity, message, subject, threshold));
            }
        }
    }

    /// Record a passing evaluation of one condition kind. A no-op when the
    /// condition is already healthy.
    pub fn declare_resolved(&mut self, kind: ConditionKind) {
        if let Some(state) = self.alerts.get_mut(&kind) {
            state.record_success();
        }
    }

    pub fn record_duration(&mut self, duration: Duration) {
        if self.recent_durations.len() == DURATION_HISTORY {
            self.recent_durations.pop_front();
        }
        self.recent_durations.push_back(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(name: &str, url: &str) -> ProbeDefinition {
        ProbeDefinition {
            name: name.to_string(),
            url: url.to_string(),
            search: "OK".to_string(),
            timeout: Duration::from_secs(5),
            warn_time: Duration::from_secs(2),
            delay: Duration::from_secs(60),
            index: true,
            retention_warning: None,
            retention_critical: None,
        }
    }

    #[test]
    fn apply_unchanged_definition_returns_false() {
        let def = definition("shop", "https://shop.example.com/");
        let mut probe = Probe::from_definition("shop", &def);
        assert!(!probe.apply_definition(&def));
    }

    #[test]
    fn apply_changed_definition_overwrites_config_only() {
        let def = definition("shop", "https://shop.example.com/");
        let mut probe = Probe::from_definition("shop", &def);
        probe.last_http_code = Some(200);
        probe.declare(
            ConditionKind::Slow,
            Severity::Warning,
            "slow",
            "response duration too high",
        );

        let mut updated = def.clone();
        updated.delay = Duration::from_secs(120);
        assert!(probe.apply_definition(&updated));

        assert_eq!(probe.delay, Duration::from_secs(120));
        // Runtime state survives a config update.
        assert_eq!(probe.last_http_code, Some(200));
        assert!(probe.alerts.contains_key(&ConditionKind::Slow));
    }

    #[test]
    fn declare_creates_then_increments() {
        let def = definition("shop", "https://shop.example.com/");
        let mut probe = Probe::from_definition("shop", &def);

        probe.declare(
            ConditionKind::ServerError,
            Severity::Critical,
            "response code: 500",
            "server error",
        );
        assert_eq!(probe.alerts[&ConditionKind::ServerError].failing_count, 1);
        assert_eq!(
            probe.alerts[&ConditionKind::ServerError].confirmation_threshold,
            1
        );

        probe.declare(
            ConditionKind::ServerError,
            Severity::Critical,
            "response code: 502",
            "server error",
        );
        assert_eq!(probe.alerts[&ConditionKind::ServerError].failing_count, 2);
    }

    #[test]
    fn declare_resolved_without_state_is_noop() {
        let def = definition("shop", "https://shop.example.com/");
        let mut probe = Probe::from_definition("shop", &def);
        probe.declare_resolved(ConditionKind::ContentMissing);
        assert!(probe.alerts.is_empty());
    }

    #[test]
    fn duration_ring_keeps_five_entries() {
        let def = definition("shop", "https://shop.example.com/");
        let mut probe = Probe::from_definition("shop", &def);
        for i in 1..=7 {
            probe.record_duration(Duration::from_millis(i * 100));
        }
        assert_eq!(probe.recent_durations.len(), 5);
        assert_eq!(
            probe.recent_durations.front().copied(),
            Some(Duration::from_millis(300))
        );
        assert_eq!(
            probe.recent_durations.back().copied(),
            Some(Duration::from_millis(700))
        );
    }
}
