//! Environment-driven daemon configuration and probe definition loading.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::Deserialize;

/// Daemon-wide configuration, resolved once at startup.
///
/// Notification endpoints are required: the daemon refuses to start without
/// them rather than silently dropping alerts later.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub slack_webhook_url: String,
    pub console_url: String,
    pub influxdb_url: String,
    pub tick_interval: Duration,
    pub stagger_budget: Duration,
    pub rescan_interval: Duration,
}

impl AppConfig {
    /// Resolve configuration from the environment.
    ///
    /// Debug mode shrinks the scheduler tick, stagger and rescan intervals
    /// for faster iteration; it does not change any behavior.
    pub fn from_env(debug: bool) -> anyhow::Result<Self> {
        let (tick, stagger, rescan) = if debug {
            (
                Duration::from_secs(1),
                Duration::from_millis(10),
                Duration::from_secs(5),
            )
        } else {
            (
                Duration::from_secs(60),
                Duration::from_millis(100),
                Duration::from_secs(60),
            )
        };

        Ok(Self {
            slack_webhook_url: require_env("SITEWATCH_SLACK_WEBHOOK_URL")?,
            console_url: require_env("SITEWATCH_CONSOLE_URL")?,
            influxdb_url: require_env("SITEWATCH_INFLUXDB_URL")?,
            tick_interval: env_duration("SITEWATCH_TICK_INTERVAL", tick)?,
            stagger_budget: env_duration("SITEWATCH_STAGGER_BUDGET", stagger)?,
            rescan_interval: env_duration("SITEWATCH_RESCAN_INTERVAL", rescan)?,
        })
    }
}

fn require_env(key: &str) -> anyhow::Result<String> {
    let value = std::env::var(key)
        .with_context(|| format!("missing required environment variable {}", key))?;
    if value.trim().is_empty() {
        bail!("environment variable {} is set but empty", key);
    }
    Ok(value)
}

fn env_duration(key: &str, default: Duration) -> anyhow::Result<Duration> {
    match std::env::var(key) {
        Ok(raw) => parse_duration(&raw).with_context(|| format!("invalid duration in {}", key)),
        Err(_) => Ok(default),
    }
}

/// One monitored endpoint as declared in a TOML file.
///
/// Durations are strings with unit suffixes ("500ms", "5s", "2m", "1m30s").
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProbeDefinition {
    pub name: String,
    pub url: String,
    pub search: String,
    #[serde(with = "duration_str")]
    pub timeout: Duration,
    #[serde(with = "duration_str")]
    pub warn_time: Duration,
    #[serde(with = "duration_str")]
    pub delay: Duration,
    #[serde(default)]
    pub index: bool,
    #[serde(default)]
    pub retention_warning: Option<i64>,
    #[serde(default)]
    pub retention_critical: Option<i64>,
}

impl ProbeDefinition {
    /// Consecutive evaluations required to confirm a warning-level condition.
    pub fn warning_threshold(&self) -> u32 {
        normalize_retention(self.retention_warning, 2)
    }

    /// Consecutive evaluations required to confirm a critical-level condition.
    pub fn critical_threshold(&self) -> u32 {
        normalize_retention(self.retention_critical, 1)
    }
}

fn normalize_retention(configured: Option<i64>, default: u32) -> u32 {
    match configured {
        Some(n) if n > 0 => n as u32,
        _ => default,
    }
}

/// Load one probe definition from a TOML file.
///
/// Returns the probe's stable key (the file stem) alongside the definition.
/// The key is what the fleet registry indexes by, so renaming a file changes
/// probe identity while editing its content does not.
pub fn load_definition(path: &Path) -> anyhow::Result<(String, ProbeDefinition)> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let def: ProbeDefinition =
        toml::from_str(&raw).with_context(|| format!("malformed probe file {}", path.display()))?;

    let key = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
        .with_context(|| format!("probe file has no usable name: {}", path.display()))?;

    if def.name.trim().is_empty() || def.url.trim().is_empty() {
        bail!("probe file {} needs a non-empty name and url", path.display());
    }

    Ok((key, def))
}

/// Parse a duration string made of `<number><unit>` segments, e.g. "5s",
/// "250ms", "2m" or "1m30s".
pub fn parse_duration(raw: &str) -> anyhow::Result<Duration> {
    let s = raw.trim();
    if s.is_empty() {
        bail!("empty duration");
    }

    let mut total = Duration::ZERO;
    let mut chars = s.chars().peekable();

    while chars.peek().is_some() {
        let mut digits = String::new();
        while let Some(c) = chars.peek() {
            if c.is_ascii_digit() {
                digits.push(*c);
                chars.next();
            } else {
                break;
            }
        }
        if digits.is_empty() {
            bail!("invalid duration {:?}: expected a number", raw);
        }
        let value: u64 = digits.parse()?;

        let mut unit = String::new();
        while let Some(c) = chars.peek() {
            if c.is_ascii_alphabetic() {
                unit.push(*c);
                chars.next();
            } else {
                break;
            }
        }

        total += match unit.as_str() {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 3600),
            "" => bail!("invalid duration {:?}: missing unit", raw),
            other => bail!("invalid duration {:?}: unknown unit {:?}", raw, other),
        };
    }

    Ok(total)
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
