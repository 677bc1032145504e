//! Check executor: one HTTP fetch per scheduled probe, turned into a set of
//! independent condition outcomes.

use std::time::{Duration, Instant};

use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::fleet::{ConditionKind, Probe, Severity};
use crate::notify::NotifierGateway;

static NOINDEX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<meta[ ]+name=["']robots["'][ ]+content=["'][^"']*noindex[^"']*["']"#).unwrap()
});
static CLOSE_HEAD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"</head>").unwrap());

/// One failing condition derived from a check.
#[derive(Debug, Clone)]
pub struct ConditionFailure {
    pub kind: ConditionKind,
    pub severity: Severity,
    pub message: String,
    pub subject: String,
}

impl ConditionFailure {
    fn new(kind: ConditionKind, severity: Severity, message: String, subject: &str) -> Self {
        Self {
            kind,
            severity,
            message,
            subject: subject.to_string(),
        }
    }
}

/// Ephemeral outcome of one check, consumed by the alert state machine.
///
/// Conditions in neither list were not evaluated this check (transport
/// failure leaves nothing to inspect) and their counters must not advance.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub http_code: Option<u16>,
    pub elapsed: Duration,
    pub failures: Vec<ConditionFailure>,
    pub resolved: Vec<ConditionKind>,
}

/// What a single bounded pass over the response body found.
#[derive(Debug, Default, Clone, Copy)]
pub struct BodyScan {
    pub found_search: bool,
    pub found_noindex: bool,
    pub found_close_head: bool,
}

impl BodyScan {
    fn feed_line(&mut self, line: &str, search: &str) {
        if !self.found_search && line.contains(search) {
            self.found_search = true;
        }
        if !self.found_close_head && CLOSE_HEAD_RE.is_match(line) {
            self.found_close_head = true;
        }
        if !self.found_noindex && NOINDEX_RE.is_match(line) {
            self.found_noindex = true;
        }
    }

    /// The scan can stop once the substring has been found and either
    /// structural marker has been seen.
    fn done(&self) -> bool {
        self.found_search && (self.found_noindex || self.found_close_head)
    }
}

/// Perform exactly one GET against the probe's target and derive condition
/// outcomes. Never fails: every problem becomes a condition in the result.
pub async fn execute(probe: &Probe, gateway: &NotifierGateway) -> CheckResult {
    let start = Instant::now();

    let response = match build_client(probe.timeout) {
        Ok(client) => client.get(&probe.url).send().await,
        Err(e) => Err(e),
    };

    let response = match response {
        Ok(res) => res,
        Err(e) => {
            let elapsed = start.elapsed();
            // No meaningful latency sample exists; record the warn threshold
            // as a placeholder so the series stays continuous.
            gateway.record_response_time(&probe.name, probe.warn_time);
            debug!(probe = %probe.name, "transport failure: {}", e);
            return CheckResult {
                http_code: None,
                elapsed,
                failures: vec![ConditionFailure::new(
                    ConditionKind::ServerError,
                    Severity::Critical,
                    format!("request failed: {}", e),
                    "server error",
                )],
                resolved: Vec::new(),
            };
        }
    };

    let elapsed = start.elapsed();
    let status = response.status().as_u16();
    let scan = scan_body(response, &probe.search).await;

    gateway.record_response_time(&probe.name, elapsed);

    let (failures, resolved) = evaluate(probe, status, elapsed, &scan);
    CheckResult {
        http_code: Some(status),
        elapsed,
        failures,
        resolved,
    }
}

/// Fresh client per check: pooling is disabled so one probe's sockets never
/// outlive its check or leak into another's.
fn build_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(0)
        .build()
}

/// Stream the body line by line, stopping early once the scan is done. A body
/// read error ends the scan with whatever was seen so far.
async fn scan_body(response: reqwest::Response, search: &str) -> BodyScan {
    let mut scan = BodyScan::default();
    let mut pending = String::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        pending.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(pos) = pending.find('\n') {
            let rest = pending.split_off(pos + 1);
            let line = std::mem::replace(&mut pending, rest);
            scan.feed_line(line.trim_end_matches(['\n', '\r']), search);
            if scan.done() {
                return scan;
            }
        }
    }

    if !pending.is_empty() {
        scan.feed_line(&pending, search);
    }
    scan
}

/// Derive the four condition outcomes from one successful fetch. Every
/// dimension is evaluated independently; a non-200 status does not suppress
/// the latency or content checks.
pub fn evaluate(
    probe: &Probe,
    status: u16,
    elapsed: Duration,
    scan: &BodyScan,
) -> (Vec<ConditionFailure>, Vec<ConditionKind>) {
    let mut failures = Vec::new();
    let mut resolved = Vec::new();

    if status != 200 {
        failures.push(ConditionFailure::new(
            ConditionKind::ServerError,
            Severity::Critical,
            format!("response code: {}", status),
            "server error",
        ));
    } else {
        resolved.push(ConditionKind::ServerError);
    }

    if elapsed > probe.warn_time {
        failures.push(ConditionFailure::new(
            ConditionKind::Slow,
            Severity::Warning,
            format!(
                "response took {:?}, warn threshold is {:?}",
                elapsed, probe.warn_time
            ),
            "response duration too high",
        ));
    } else {
        resolved.push(ConditionKind::Slow);
    }

    if !scan.found_search {
        failures.push(ConditionFailure::new(
            ConditionKind::ContentMissing,
            Severity::Critical,
            format!("no occurrence of {:?}", probe.search),
            "no occurrence found",
        ));
    } else {
        resolved.push(ConditionKind::ContentMissing);
    }

    if scan.found_noindex && probe.index_expected {
        failures.push(ConditionFailure::new(
            ConditionKind::IndexingDisallowed,
            Severity::Warning,
            "search engine indexing not allowed".to_string(),
            "search engine indexing not allowed",
        ));
    } else {
        resolved.push(ConditionKind::IndexingDisallowed);
    }

    if !scan.found_noindex && !probe.index_expected {
        failures.push(ConditionFailure::new(
            ConditionKind::IndexingUnexpected,
            Severity::Warning,
            "search engine indexing not expected".to_string(),
            "search engine indexing not expected",
        ));
    } else {
        resolved.push(ConditionKind::IndexingUnexpected);
    }

    (failures, resolved)
}
