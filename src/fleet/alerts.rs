//! Per-condition alert lifecycle: consecutive failure/success counting and
//! notification eligibility.

use std::fmt;

use chrono::{DateTime, Utc};

/// One health dimension evaluated on every check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionKind {
    /// Transport failure or non-200 status code.
    ServerError,
    /// Response slower than the probe's warn threshold.
    Slow,
    /// Required substring absent from the response body.
    ContentMissing,
    /// Page forbids search-engine indexing but the probe expects it.
    IndexingDisallowed,
    /// Page is indexable but the probe does not expect it to be.
    IndexingUnexpected,
}

impl ConditionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionKind::ServerError => "server error",
            ConditionKind::Slow => "latency",
            ConditionKind::ContentMissing => "content missing",
            ConditionKind::IndexingDisallowed => "indexing disallowed",
            ConditionKind::IndexingUnexpected => "indexing unexpected",
        }
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracked lifecycle of one currently-or-recently-failing condition.
///
/// Created on the first failing evaluation of a condition kind, removed once
/// enough consecutive passing evaluations confirm the resolution. Its absence
/// from the probe's map means the condition is healthy.
#[derive(Debug, Clone)]
pub struct AlertState {
    id: String,
    pub kind: ConditionKind,
    pub severity: Severity,
    pub message: String,
    pub subject: String,
    pub since: DateTime<Utc>,
    pub failing_count: u32,
    pub resolving_count: u32,
    /// Consecutive evaluations required to confirm either direction,
    /// copied from the probe at creation time.
    pub confirmation_threshold: u32,
    pub notified: bool,
}

impl AlertState {
    pub fn new(
        kind: ConditionKind,
        severity: Severity,
        message: impl Into<String>,
        subject: impl Into<String>,
        confirmation_threshold: u32,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            severity,
            message: message.into(),
            subject: subject.into(),
            since: Utc::now(),
            failing_count: 1,
            resolving_count: 0,
            confirmation_threshold: confirmation_threshold.max(1),
            notified: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// A fresh failure cancels any resolution in progress.
    pub fn record_failure(&mut self) {
        self.failing_count += 1;
        self.resolving_count = 0;
    }

    pub fn record_success(&mut self) {
        self.resolving_count += 1;
    }

    pub fn is_resolved(&self) -> bool {
        self.resolving_count >= self.confirmation_threshold
    }

    /// Flap-suppression rule: critical conditions are eligible as soon as they
    /// exist, warnings only once enough consecutive failures confirmed them.
    /// A state that already notified stays quiet until it resolves; partial
    /// transport failure leaves `notified` unset so the next sweep retries.
    pub fn can_notify(&self) -> bool {
        let confirmed = self.severity == Severity::Critical
            || self.failing_count >= self.confirmation_threshold;
        confirmed && (!self.notified || self.is_resolved())
    }

    pub fn set_notified(&mut self) {
        self.notified = true;
    }
}

/// Value snapshot handed to notification transports. Carries everything the
/// sinks need so no shared mutable state crosses the notifier boundary.
#[derive(Debug, Clone)]
pub struct AlertNotification {
    pub alert_id: String,
    pub probe_key: String,
    pub probe_name: String,
    pub probe_url: String,
    pub kind: ConditionKind,
    pub severity: Severity,
    pub subject: String,
    pub detail: String,
    pub since: DateTime<Utc>,
    pub next_due: DateTime<Utc>,
    pub resolved: bool,
}

impl AlertNotification {
    /// One-line summary used by the chat transport.
    pub fn headline(&self) -> String {
        if self.resolved {
            let minutes = (Utc::now() - self.since).num_seconds() as f64 / 60.0;
            format!(
                "[GOOD] {} : {} (web {}) error duration : {:.2}m",
                self.probe_name, self.subject, self.probe_url, minutes
            )
        } else {
            format!(
                "[BAD] {} : {} (web {})",
                self.probe_name, self.subject, self.probe_url
            )
        }
    }
}
