//! One-shot migration of legacy web-check definitions into the current
//! probe TOML format.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Legacy check file: a command-style argument string plus default values.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LegacyCheck {
    name: String,
    delay: String,
    timeout: String,
    arguments: String,
    #[serde(default)]
    default: Vec<LegacyDefault>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LegacyDefault {
    name: String,
    value: i64,
}

#[derive(Debug, Serialize)]
struct MigratedProbe {
    name: String,
    url: String,
    search: String,
    timeout: String,
    warn_time: String,
    delay: String,
    index: bool,
}

impl LegacyCheck {
    /// The legacy argument string is `<url> '<search terms>'`.
    fn into_probe(self) -> MigratedProbe {
        let mut parts = self.arguments.split_whitespace();
        let url = parts.next().unwrap_or_default().to_string();
        let search = parts.collect::<Vec<_>>().join(" ");
        let search = search.trim_matches('\'').to_string();

        let warn_time = self
            .default
            .iter()
            .find(|d| d.name == "web_warn_time")
            .map(|d| format!("{}s", d.value))
            .unwrap_or_else(|| "2s".to_string());

        MigratedProbe {
            name: self.name.replace("web ", ""),
            url,
            search,
            timeout: self.timeout,
            warn_time,
            delay: self.delay,
            index: true,
        }
    }
}

/// Convert every `web_*.toml` legacy check in `src_dir` into a probe file in
/// `dest_dir`. Returns the number of files written.
pub fn run(src_dir: &Path, dest_dir: &Path) -> anyhow::Result<usize> {
    let entries = std::fs::read_dir(src_dir)
        .with_context(|| format!("cannot read legacy directory {}", src_dir.display()))?;
    std::fs::create_dir_all(dest_dir)
        .with_context(|| format!("cannot create {}", dest_dir.display()))?;

    let mut written = 0;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !path.is_file() || !file_name.starts_with("web_") || !file_name.ends_with(".toml") {
            continue;
        }

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let legacy: LegacyCheck = match toml::from_str(&raw) {
            Ok(legacy) => legacy,
            Err(e) => {
                warn!(file = %path.display(), "skipping legacy check: {}", e);
                continue;
            }
        };

        let probe = legacy.into_probe();
        let out = toml::to_string(&probe).context("cannot serialize migrated probe")?;
        std::fs::write(dest_dir.join(file_name), out)
            .with_context(|| format!("cannot write into {}", dest_dir.display()))?;
        written += 1;
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;

    #[test]
    fn migrates_legacy_check_to_probe_definition() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        std::fs::write(
            src.path().join("web_shop.toml"),
            r#"
            Name = "web shop homepage"
            Delay = "60s"
            Timeout = "5s"
            Arguments = "https://shop.example.com/ 'Add to cart'"

            [[Default]]
            Name = "web_warn_time"
            Value = 3
            "#,
        )
        .unwrap();
        // Non-web files are ignored.
        std::fs::write(src.path().join("disk_usage.toml"), "Name = \"disk\"").unwrap();

        let written = run(src.path(), dest.path()).unwrap();
        assert_eq!(written, 1);

        let (key, def) = config::load_definition(&dest.path().join("web_shop.toml")).unwrap();
        assert_eq!(key, "web_shop");
        assert_eq!(def.name, "shop homepage");
        assert_eq!(def.url, "https://shop.example.com/");
        assert_eq!(def.search, "Add to cart");
        assert_eq!(def.warn_time, std::time::Duration::from_secs(3));
        assert!(def.index);
    }

    #[test]
    fn missing_warn_time_gets_default() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        std::fs::write(
            src.path().join("web_api.toml"),
            r#"
            Name = "web api"
            Delay = "30s"
            Timeout = "3s"
            Arguments = "https://api.example.com/health 'ok'"
            "#,
        )
        .unwrap();

        run(src.path(), dest.path()).unwrap();
        let (_, def) = config::load_definition(&dest.path().join("web_api.toml")).unwrap();
        assert_eq!(def.warn_time, std::time::Duration::from_secs(2));
    }
}
